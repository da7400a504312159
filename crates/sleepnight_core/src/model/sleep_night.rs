//! Sleep night domain model.
//!
//! # Responsibility
//! - Define the canonical row shape of `daily_sleep_quality_table`.
//! - Provide lifecycle helpers for the start/stop/rate tracking flow.
//!
//! # Invariants
//! - `night_id` is assigned by the store on insert and never reused.
//! - A night whose end equals its start is still being tracked.
//! - `sleep_quality` is either `QUALITY_UNSET` or inside `0..=5`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned primary key of a night.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type NightId = i64;

/// Key carried by nights that have not been inserted yet.
pub const UNSAVED_NIGHT_ID: NightId = 0;

/// Sentinel rating for nights that have not been scored.
pub const QUALITY_UNSET: i32 = -1;

/// Lowest valid rating.
pub const QUALITY_MIN: i32 = 0;

/// Highest valid rating.
pub const QUALITY_MAX: i32 = 5;

/// Validation errors for caller-provided night data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SleepNightValidationError {
    /// Rating outside `QUALITY_MIN..=QUALITY_MAX`.
    QualityOutOfRange(i32),
}

impl Display for SleepNightValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QualityOutOfRange(value) => write!(
                f,
                "sleep quality {value} is outside {QUALITY_MIN}..={QUALITY_MAX}"
            ),
        }
    }
}

impl Error for SleepNightValidationError {}

/// One tracked night.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepNight {
    /// Primary key. Ignored on insert; matched on update.
    pub night_id: NightId,
    /// Unix epoch milliseconds when tracking started.
    pub start_time_milli: i64,
    /// Unix epoch milliseconds when tracking stopped.
    /// Equal to `start_time_milli` while the night is in progress.
    pub end_time_milli: i64,
    /// `QUALITY_UNSET` until the night is rated.
    pub sleep_quality: i32,
}

impl SleepNight {
    /// Creates an unsaved night that starts (and, for now, ends) at `now_ms`.
    pub fn starting_at(now_ms: i64) -> Self {
        Self {
            night_id: UNSAVED_NIGHT_ID,
            start_time_milli: now_ms,
            end_time_milli: now_ms,
            sleep_quality: QUALITY_UNSET,
        }
    }

    /// Returns whether tracking has not been stopped yet.
    pub fn is_in_progress(&self) -> bool {
        self.end_time_milli == self.start_time_milli
    }

    /// Returns whether a rating has been recorded.
    pub fn is_rated(&self) -> bool {
        self.sleep_quality != QUALITY_UNSET
    }

    /// Tracked duration in milliseconds; zero while in progress.
    ///
    /// Saturates at `i64::MAX` for timestamps at the ends of the range.
    pub fn duration_millis(&self) -> i64 {
        self.end_time_milli
            .saturating_sub(self.start_time_milli)
            .max(0)
    }

    /// Human-readable label for the current rating.
    pub fn quality_label(&self) -> &'static str {
        quality_label(self.sleep_quality)
    }
}

/// Checks that `quality` is a rating a user can give.
///
/// `QUALITY_UNSET` is rejected here: it marks "not rated yet" and is never
/// chosen explicitly.
pub fn validate_quality(quality: i32) -> Result<i32, SleepNightValidationError> {
    if (QUALITY_MIN..=QUALITY_MAX).contains(&quality) {
        Ok(quality)
    } else {
        Err(SleepNightValidationError::QualityOutOfRange(quality))
    }
}

/// Maps a rating to its display label.
pub fn quality_label(quality: i32) -> &'static str {
    match quality {
        0 => "Very bad",
        1 => "Poor",
        2 => "So-so",
        3 => "OK",
        4 => "Pretty good",
        5 => "Excellent",
        _ => "--",
    }
}
