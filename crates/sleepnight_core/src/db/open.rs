//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required for durable writes.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections run with `synchronous=FULL`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult, StoreConfig, StoreLocation};
use directories::ProjectDirs;
use log::{error, info};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Instant;

const APP_NAME: &str = "sleepnight";
const DB_FILE_NAME: &str = "sleepnight.sqlite3";

/// Opens a SQLite database file with default tuning.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_db_with(
        &StoreLocation::File(path.as_ref().to_path_buf()),
        &StoreConfig::default(),
    )
}

/// Opens a private in-memory SQLite database with default tuning.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_db_with(&StoreLocation::Memory, &StoreConfig::default())
}

/// Opens a connection at `location` and applies all pending migrations.
///
/// # Side effects
/// - Creates missing parent directories for file locations.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_with(location: &StoreLocation, config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = location.mode();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match connect(location) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
    };

    match bootstrap_connection(&mut conn, config) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Resolves the per-user database file path.
pub fn default_db_path() -> DbResult<PathBuf> {
    let dirs = ProjectDirs::from("", "", APP_NAME).ok_or(DbError::NoDataDir)?;
    Ok(dirs.data_dir().join(DB_FILE_NAME))
}

fn connect(location: &StoreLocation) -> DbResult<Connection> {
    match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Connection::open(path)?)
        }
        StoreLocation::Memory => Ok(Connection::open_in_memory()?),
    }
}

fn bootstrap_connection(conn: &mut Connection, config: &StoreConfig) -> DbResult<()> {
    conn.execute_batch("PRAGMA synchronous = FULL;")?;
    conn.busy_timeout(config.busy_timeout)?;
    apply_migrations(conn)?;
    Ok(())
}
