//! Alignment of weather observations onto the aethalometer timeline.
//!
//! Every denoised row is kept. Weather values are attached from the nearest
//! weather sample within a tolerance window; rows with no sample close enough
//! get missing weather fields.

use chrono::{FixedOffset, TimeDelta};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::ona::DenoisedSeries;
use crate::timestamp::Timestamp;
use crate::weather::{WeatherQuantity, WeatherSeries};

pub const DEFAULT_TOLERANCE_MINUTES: i64 = 60;

/// Prefix given to weather columns whose name is already used by the
/// denoised table.
pub const COLLISION_PREFIX: &str = "weather_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub tolerance: TimeDelta,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            tolerance: TimeDelta::minutes(DEFAULT_TOLERANCE_MINUTES),
        }
    }
}

impl SyncOptions {
    /// # Errors
    ///
    /// [`Error::InvalidTolerance`] for negative or out-of-range values.
    pub fn with_tolerance_minutes(minutes: i64) -> Result<Self> {
        if minutes < 0 {
            return Err(Error::InvalidTolerance(minutes));
        }
        let tolerance = TimeDelta::try_minutes(minutes).ok_or(Error::InvalidTolerance(minutes))?;
        Ok(Self { tolerance })
    }
}

/// Weather column aligned to the denoised rows.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedColumn {
    pub name: String,
    pub quantity: WeatherQuantity,
    pub values: Vec<Option<f64>>,
}

/// Denoised series with weather fields, one row per denoised row.
#[derive(Debug, Clone)]
pub struct SynchronizedSeries {
    pub denoised: DenoisedSeries,
    pub weather: Vec<MergedColumn>,
}

impl SynchronizedSeries {
    pub fn len(&self) -> usize {
        self.denoised.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denoised.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&MergedColumn> {
        self.weather.iter().find(|c| c.name == name)
    }
}

/// Counts describing one synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub weather_rows: usize,
    pub weather_rows_in_range: usize,
    pub interpolated_cells: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
    pub converted_to_utc: bool,
    pub renamed_columns: Vec<String>,
    pub weather_start: String,
    pub weather_end: String,
    pub measurement_start: String,
    pub measurement_end: String,
}

/// Column names of the denoised table as exported.
pub fn denoised_column_names(denoised: &DenoisedSeries) -> Vec<String> {
    vec![
        "timestamp".to_string(),
        "rawBC".to_string(),
        "processedBC".to_string(),
        denoised.atn_column.clone(),
        "windowStart".to_string(),
        "windowEnd".to_string(),
    ]
}

/// Renames weather names that collide with `taken` (except `timestamp`) by
/// prefixing them with [`COLLISION_PREFIX`].
pub fn resolve_collisions(weather_names: &[String], taken: &[String]) -> Vec<String> {
    weather_names
        .iter()
        .map(|name| {
            if name != "timestamp" && taken.contains(name) {
                format!("{COLLISION_PREFIX}{name}")
            } else {
                name.clone()
            }
        })
        .collect()
}

/// Converts both time axes to UTC unless every instant already shares one
/// offset. Returns whether a conversion happened.
pub fn unify_timezones(a: &mut [Timestamp], b: &mut [Timestamp]) -> bool {
    let mut offsets = a.iter().chain(b.iter()).map(|t| *t.offset());
    let Some(first) = offsets.next() else {
        return false;
    };
    if offsets.all(|o| o == first) {
        return false;
    }

    let utc = FixedOffset::east_opt(0).unwrap_or(first);
    for t in a.iter_mut().chain(b.iter_mut()) {
        *t = t.with_timezone(&utc);
    }
    true
}

/// For each target instant, the index of the nearest source instant within
/// `tolerance`. Both slices must be sorted ascending. Equidistant candidates
/// resolve to the earlier sample.
pub fn nearest_within(targets: &[Timestamp], source: &[Timestamp], tolerance: TimeDelta) -> Vec<Option<usize>> {
    let mut out = Vec::with_capacity(targets.len());
    let mut p = 0;
    for &t in targets {
        while p + 1 < source.len() && source[p + 1] <= t {
            p += 1;
        }
        let mut best: Option<(usize, TimeDelta)> = None;
        for k in [p, p + 1] {
            let Some(&s) = source.get(k) else {
                continue;
            };
            let dist = (s - t).abs();
            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((k, dist));
            }
        }
        out.push(best.filter(|(_, d)| *d <= tolerance).map(|(k, _)| k));
    }
    out
}

fn range_label(ts: &[Timestamp]) -> (String, String) {
    match (ts.first(), ts.last()) {
        (Some(a), Some(b)) => (a.to_rfc3339(), b.to_rfc3339()),
        _ => (String::new(), String::new()),
    }
}

/// Merges `weather` onto the rows of `denoised`.
///
/// Weather rows outside the denoised time range are discarded, duplicate
/// quantity columns are collapsed, both axes are brought to a shared zone,
/// interior gaps are interpolated, and each denoised row takes the nearest
/// weather row within `options.tolerance`.
///
/// Weather names are the canonical quantity names, so a rename to
/// `weather_<name>` only happens when a caller builds a [`DenoisedSeries`]
/// whose ATN column carries one of those names. Series produced by the ONA
/// stage always keep an `*ATN*` channel name and never collide.
///
/// # Errors
///
/// - [`Error::MissingTimestamp`] if either series has no rows.
/// - [`Error::NoOverlap`] if no weather row falls inside the denoised range.
#[instrument(skip_all, fields(rows = denoised.len(), weather_rows = weather.len()))]
pub fn synchronize(
    denoised: &DenoisedSeries,
    weather: &WeatherSeries,
    options: &SyncOptions,
) -> Result<(SynchronizedSeries, SyncReport)> {
    let (Some(&start), Some(&end)) = (denoised.timestamps.first(), denoised.timestamps.last()) else {
        return Err(Error::MissingTimestamp("aethalometer"));
    };
    if weather.is_empty() {
        return Err(Error::MissingTimestamp("weather"));
    }

    let (weather_start, weather_end) = range_label(&weather.timestamps);
    let (measurement_start, measurement_end) = range_label(&denoised.timestamps);

    let restricted = weather.restrict(start, end);
    if restricted.is_empty() {
        return Err(Error::NoOverlap {
            weather: format!("{weather_start} to {weather_end}"),
            measurement: format!("{measurement_start} to {measurement_end}"),
        });
    }
    debug!(in_range = restricted.len(), "Weather restricted to measurement range");

    let mut restricted = restricted.collapse_duplicates();
    let mut base = denoised.clone();
    let converted_to_utc = unify_timezones(&mut base.timestamps, &mut restricted.timestamps);
    if converted_to_utc {
        debug!("Time zones differ, both series converted to UTC");
    }

    let interpolated_cells = restricted.interpolate();

    let weather_names: Vec<String> = restricted.columns.iter().map(|c| c.name.clone()).collect();
    let names = resolve_collisions(&weather_names, &denoised_column_names(&base));
    let renamed_columns: Vec<String> = names
        .iter()
        .zip(&weather_names)
        .filter(|(new, old)| new != old)
        .map(|(new, _)| new.clone())
        .collect();

    let matches = nearest_within(&base.timestamps, &restricted.timestamps, options.tolerance);
    let matched_rows = matches.iter().filter(|m| m.is_some()).count();

    let merged = restricted
        .columns
        .iter()
        .zip(names)
        .map(|(col, name)| MergedColumn {
            name,
            quantity: col.quantity,
            values: matches
                .iter()
                .map(|m| m.and_then(|k| col.values[k]))
                .collect(),
        })
        .collect();

    let report = SyncReport {
        weather_rows: weather.len(),
        weather_rows_in_range: restricted.len(),
        interpolated_cells,
        matched_rows,
        unmatched_rows: base.len() - matched_rows,
        converted_to_utc,
        renamed_columns,
        weather_start,
        weather_end,
        measurement_start,
        measurement_end,
    };
    info!(
        matched = report.matched_rows,
        unmatched = report.unmatched_rows,
        interpolated = report.interpolated_cells,
        "Weather synchronized"
    );

    Ok((
        SynchronizedSeries {
            denoised: base,
            weather: merged,
        },
        report,
    ))
}
