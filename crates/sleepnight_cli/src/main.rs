//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a night store and print a short summary.
//! - Verify `sleepnight_core` wiring independently from any UI.
//!
//! Usage: `sleepnight_cli [DB_PATH]`. Without a path the per-user default
//! database is used.

use sleepnight_core::{default_db_path, NightRepository, NightStore, SleepNight};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sleepnight_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => default_db_path()?,
    };

    let store = NightStore::open(&path)?;
    let nights = store.get_all_nights()?;

    println!("sleepnight_core version={}", sleepnight_core::core_version());
    println!("db_path={}", path.display());
    println!("nights={}", nights.len());
    match store.get_tonight()? {
        Some(night) => println!("tonight {}", summarize(&night)),
        None => println!("tonight none"),
    }

    store.close()?;
    Ok(())
}

fn summarize(night: &SleepNight) -> String {
    if night.is_in_progress() {
        return format!("id={} in_progress start_ms={}", night.night_id, night.start_time_milli);
    }
    format!(
        "id={} duration_min={} quality={}",
        night.night_id,
        night.duration_millis() / 60_000,
        night.quality_label()
    )
}
