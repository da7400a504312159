//! Night repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide keyed access over `daily_sleep_quality_table`.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Every write is one SQL statement, so it commits atomically.
//! - Insert ignores the caller's `night_id`; SQLite assigns the key.
//! - Listings are ordered by `night_id` descending.

use crate::db::DbError;
use crate::model::sleep_night::{NightId, SleepNight, SleepNightValidationError};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const NIGHT_SELECT_SQL: &str = "SELECT
    night_id,
    start_time_milli,
    end_time_milli,
    quality_rating
FROM daily_sleep_quality_table";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for night persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Storage medium or engine failure. The operation was not applied.
    Db(DbError),
    /// Update targeted a key with no row.
    NotFound(NightId),
    /// Caller-provided value rejected before touching storage.
    Validation(SleepNightValidationError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "night not found: {id}"),
            Self::Validation(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SleepNightValidationError> for RepoError {
    fn from(value: SleepNightValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Keyed access to sleep nights.
pub trait NightRepository {
    /// Persists `night` under a fresh key and returns that key.
    fn insert(&self, night: &SleepNight) -> RepoResult<NightId>;
    /// Replaces the row keyed by `night.night_id`.
    fn update(&self, night: &SleepNight) -> RepoResult<()>;
    fn get(&self, key: NightId) -> RepoResult<Option<SleepNight>>;
    /// Deletes every row.
    fn clear(&self) -> RepoResult<()>;
    /// Returns the row with the highest key.
    fn get_tonight(&self) -> RepoResult<Option<SleepNight>>;
    /// Returns every row, newest key first.
    fn get_all_nights(&self) -> RepoResult<Vec<SleepNight>>;
}

impl<R: NightRepository + ?Sized> NightRepository for &R {
    fn insert(&self, night: &SleepNight) -> RepoResult<NightId> {
        (**self).insert(night)
    }

    fn update(&self, night: &SleepNight) -> RepoResult<()> {
        (**self).update(night)
    }

    fn get(&self, key: NightId) -> RepoResult<Option<SleepNight>> {
        (**self).get(key)
    }

    fn clear(&self) -> RepoResult<()> {
        (**self).clear()
    }

    fn get_tonight(&self) -> RepoResult<Option<SleepNight>> {
        (**self).get_tonight()
    }

    fn get_all_nights(&self) -> RepoResult<Vec<SleepNight>> {
        (**self).get_all_nights()
    }
}

/// SQLite-backed night repository over a borrowed connection.
///
/// The connection must have been opened through `crate::db`, so the table
/// exists.
pub struct SqliteNightRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNightRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NightRepository for SqliteNightRepository<'_> {
    fn insert(&self, night: &SleepNight) -> RepoResult<NightId> {
        self.conn.execute(
            "INSERT INTO daily_sleep_quality_table (
                start_time_milli,
                end_time_milli,
                quality_rating
            ) VALUES (?1, ?2, ?3);",
            params![
                night.start_time_milli,
                night.end_time_milli,
                night.sleep_quality,
            ],
        )?;

        let night_id = self.conn.last_insert_rowid();
        debug!("event=night_insert module=repo status=ok night_id={night_id}");
        Ok(night_id)
    }

    fn update(&self, night: &SleepNight) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE daily_sleep_quality_table
             SET
                start_time_milli = ?1,
                end_time_milli = ?2,
                quality_rating = ?3
             WHERE night_id = ?4;",
            params![
                night.start_time_milli,
                night.end_time_milli,
                night.sleep_quality,
                night.night_id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(night.night_id));
        }

        Ok(())
    }

    fn get(&self, key: NightId) -> RepoResult<Option<SleepNight>> {
        let night = self
            .conn
            .query_row(
                &format!("{NIGHT_SELECT_SQL} WHERE night_id = ?1;"),
                [key],
                parse_night_row,
            )
            .optional()?;
        Ok(night)
    }

    fn clear(&self) -> RepoResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM daily_sleep_quality_table;", [])?;
        debug!("event=night_clear module=repo status=ok removed={removed}");
        Ok(())
    }

    fn get_tonight(&self) -> RepoResult<Option<SleepNight>> {
        let night = self
            .conn
            .query_row(
                &format!("{NIGHT_SELECT_SQL} ORDER BY night_id DESC LIMIT 1;"),
                [],
                parse_night_row,
            )
            .optional()?;
        Ok(night)
    }

    fn get_all_nights(&self) -> RepoResult<Vec<SleepNight>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("{NIGHT_SELECT_SQL} ORDER BY night_id DESC;"))?;
        let nights = stmt
            .query_map([], parse_night_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nights)
    }
}

fn parse_night_row(row: &Row<'_>) -> rusqlite::Result<SleepNight> {
    Ok(SleepNight {
        night_id: row.get("night_id")?,
        start_time_milli: row.get("start_time_milli")?,
        end_time_milli: row.get("end_time_milli")?,
        sleep_quality: row.get("quality_rating")?,
    })
}
