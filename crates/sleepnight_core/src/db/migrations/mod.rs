//! Schema migrations for the night table.
//!
//! # Responsibility
//! - Keep the ordered list of schema steps shipped with this build.
//! - Bring an older database up to date inside one transaction.
//!
//! # Invariants
//! - Step versions start at 1 and grow by one.
//! - `PRAGMA user_version` always equals the last applied step.
//! - A database stamped with a newer version than this build knows is
//!   refused, never downgraded.
//! - Version 1 creates `daily_sleep_quality_table` with an `AUTOINCREMENT`
//!   key so night ids are never handed out twice.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::{Connection, Transaction};

/// One schema step and the table it touches.
#[derive(Debug, Clone, Copy)]
struct SchemaStep {
    version: u32,
    table: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    table: "daily_sleep_quality_table",
    sql: include_str!("0001_init.sql"),
}];

/// Returns the newest schema version this build can open.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Upgrades `conn` to `latest_version()`.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the file is newer than this
///   build.
/// - `DbError::Sqlite` when a step fails; nothing is applied in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored = stored_version(conn)?;
    let latest = latest_version();

    match stored.cmp(&latest) {
        std::cmp::Ordering::Greater => Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        }),
        std::cmp::Ordering::Equal => {
            debug!("event=db_migrate module=db status=skip version={stored}");
            Ok(())
        }
        std::cmp::Ordering::Less => {
            let tx = conn.transaction()?;
            for step in SCHEMA_STEPS.iter().skip_while(|step| step.version <= stored) {
                run_step(&tx, step)?;
            }
            tx.commit()?;

            info!("event=db_migrate module=db status=ok from={stored} to={latest}");
            Ok(())
        }
    }
}

fn run_step(tx: &Transaction<'_>, step: &SchemaStep) -> DbResult<()> {
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)?;
    debug!(
        "event=db_migrate module=db status=applied version={} table={}",
        step.version, step.table
    );
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
