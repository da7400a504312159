//! Core persistence for tracked sleep nights.
//! This crate owns the night table, its live listing and the tracking flow.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use db::{default_db_path, DbError, DbResult, StoreConfig, StoreLocation};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::sleep_night::{
    quality_label, validate_quality, NightId, SleepNight, SleepNightValidationError,
    QUALITY_MAX, QUALITY_MIN, QUALITY_UNSET, UNSAVED_NIGHT_ID,
};
pub use repo::night_repo::{NightRepository, RepoError, RepoResult, SqliteNightRepository};
pub use service::tracker_service::{epoch_millis_now, TrackerService};
pub use store::{NightStore, NightsCallback, SubscriptionId};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
