//! Sleep tracking use-case service.
//!
//! # Responsibility
//! - Start, stop and rate nights on top of any `NightRepository`.
//!
//! # Invariants
//! - Only the newest night can be in progress; stopping never touches older
//!   rows.
//! - Ratings are validated before any write.

use crate::model::sleep_night::{validate_quality, NightId, SleepNight};
use crate::repo::night_repo::{NightRepository, RepoError, RepoResult};
use log::info;
use std::time::{SystemTime, UNIX_EPOCH};

/// Use-case service wrapper for the tracking flow.
pub struct TrackerService<R: NightRepository> {
    repo: R,
}

impl<R: NightRepository> TrackerService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Starts a new night at `now_ms` and returns it as persisted.
    ///
    /// # Contract
    /// - Inserts a night with `end == start` and quality unset.
    /// - Returns the newest row after the insert (tonight).
    pub fn start_tracking(&self, now_ms: i64) -> RepoResult<SleepNight> {
        let night_id = self.repo.insert(&SleepNight::starting_at(now_ms))?;
        info!("event=tracking_start module=service status=ok night_id={night_id}");
        self.repo.get(night_id)?.ok_or(RepoError::NotFound(night_id))
    }

    /// Stops tonight's tracking at `now_ms`.
    ///
    /// Returns `None` when the table is empty or tonight was already stopped.
    pub fn stop_tracking(&self, now_ms: i64) -> RepoResult<Option<SleepNight>> {
        let Some(mut tonight) = self.repo.get_tonight()? else {
            return Ok(None);
        };
        if !tonight.is_in_progress() {
            return Ok(None);
        }

        tonight.end_time_milli = now_ms;
        self.repo.update(&tonight)?;
        info!(
            "event=tracking_stop module=service status=ok night_id={} duration_ms={}",
            tonight.night_id,
            tonight.duration_millis()
        );
        Ok(Some(tonight))
    }

    /// Records `quality` for the night keyed by `night_id`.
    pub fn rate_night(&self, night_id: NightId, quality: i32) -> RepoResult<SleepNight> {
        let quality = validate_quality(quality)?;
        let mut night = self
            .repo
            .get(night_id)?
            .ok_or(RepoError::NotFound(night_id))?;

        night.sleep_quality = quality;
        self.repo.update(&night)?;
        Ok(night)
    }

    /// Returns the newest night, if any.
    pub fn tonight(&self) -> RepoResult<Option<SleepNight>> {
        self.repo.get_tonight()
    }

    /// Deletes every night.
    pub fn clear_all(&self) -> RepoResult<()> {
        self.repo.clear()?;
        info!("event=tracking_clear module=service status=ok");
        Ok(())
    }
}

/// Current wall-clock time in epoch milliseconds.
///
/// Clocks set before 1970 report `0`.
pub fn epoch_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
