//! Environment-driven settings.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::headers::Wavelength;
use crate::ona::DEFAULT_ATN_MIN;
use crate::sync::{DEFAULT_TOLERANCE_MINUTES, SyncOptions};

pub const DEFAULT_RESULTS_DIR: &str = "data/results";
pub const DEFAULT_LOG_FILE: &str = "logs/aeth_ona.log";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub results_dir: PathBuf,
    pub wavelength: Wavelength,
    pub atn_min: f64,
    pub sync_tolerance_minutes: i64,
    pub poll_interval: Duration,
    pub log_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            wavelength: Wavelength::Blue,
            atn_min: DEFAULT_ATN_MIN,
            sync_tolerance_minutes: DEFAULT_TOLERANCE_MINUTES,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow!("{e}"))
                .with_context(|| format!("invalid value {raw:?} for {key}"))
        })
        .transpose()
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let settings = Self {
            results_dir: lookup("AETH_RESULTS_DIR").map_or(defaults.results_dir, PathBuf::from),
            wavelength: parsed(&lookup, "AETH_DEFAULT_WAVELENGTH")?.unwrap_or(defaults.wavelength),
            atn_min: parsed(&lookup, "AETH_DEFAULT_ATN_MIN")?.unwrap_or(defaults.atn_min),
            sync_tolerance_minutes: parsed(&lookup, "AETH_SYNC_TOLERANCE_MINUTES")?
                .unwrap_or(defaults.sync_tolerance_minutes),
            poll_interval: parsed(&lookup, "AETH_POLL_INTERVAL_MS")?
                .map_or(defaults.poll_interval, Duration::from_millis),
            log_file: lookup("LOG_FILE_PATH").map_or(defaults.log_file, PathBuf::from),
        };
        SyncOptions::with_tolerance_minutes(settings.sync_tolerance_minutes)
            .context("invalid AETH_SYNC_TOLERANCE_MINUTES")?;
        Ok(settings)
    }
}
