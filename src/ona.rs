//! Optimized Noise-reduction Averaging (ONA).
//!
//! BC values are averaged over adaptive windows: a window starting at row `i`
//! closes at the first row `j > i` where `ATN[j] - ATN[i] >= atn_min`, and
//! every row in `[i, j]` receives the mean BC of the window. Rows after the
//! last closed window are passed through unaveraged.
//!
//! The scan works on contiguous slices and never revisits a row, so a series
//! is processed in a single linear pass.

use std::ops::Range;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::headers::Wavelength;
use crate::measurement::Measurement;
use crate::timestamp::Timestamp;

pub const DEFAULT_ATN_MIN: f64 = 0.01;

/// Rows between two progress callbacks.
const PROGRESS_STRIDE: usize = 100_000;

/// Closed averaging window, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnaWindow {
    pub start: usize,
    pub end: usize,
}

impl OnaWindow {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Output of one ONA pass over a pair of slices.
#[derive(Debug, Clone, PartialEq)]
pub struct OnaOutput {
    pub processed: Vec<f64>,
    pub windows: Vec<OnaWindow>,
    /// Trailing rows left unaveraged, if any.
    pub tail: Option<Range<usize>>,
}

pub fn validate_atn_min(atn_min: f64) -> Result<f64> {
    if atn_min.is_finite() && atn_min > 0.0 {
        Ok(atn_min)
    } else {
        Err(Error::InvalidAtnMin(atn_min))
    }
}

/// Runs ONA over `atn` / `bc`, which must have equal length and be in time
/// order.
pub fn apply_ona(atn: &[f64], bc: &[f64], atn_min: f64) -> OnaOutput {
    apply_ona_with_progress(atn, bc, atn_min, |_, _| {})
}

/// Same as [`apply_ona`], calling `progress(done, total)` periodically.
pub fn apply_ona_with_progress<F>(atn: &[f64], bc: &[f64], atn_min: f64, mut progress: F) -> OnaOutput
where
    F: FnMut(usize, usize),
{
    debug_assert_eq!(atn.len(), bc.len());
    let n = atn.len().min(bc.len());
    let mut processed = Vec::with_capacity(n);
    let mut windows = Vec::new();
    let mut tail = None;
    let mut next_report = PROGRESS_STRIDE;

    let mut i = 0;
    while i < n {
        let start_atn = atn[i];
        let mut j = i + 1;
        while j < n && atn[j] - start_atn < atn_min {
            j += 1;
        }

        if j < n {
            let window = &bc[i..=j];
            let avg = window.iter().sum::<f64>() / window.len() as f64;
            processed.extend(std::iter::repeat_n(avg, window.len()));
            windows.push(OnaWindow { start: i, end: j });
            i = j + 1;
        } else {
            processed.extend_from_slice(&bc[i..n]);
            tail = Some(i..n);
            i = n;
        }

        if i >= next_report {
            progress(i, n);
            next_report = i + PROGRESS_STRIDE;
        }
    }
    progress(n, n);

    OnaOutput {
        processed,
        windows,
        tail,
    }
}

/// Denoised single-channel series, parallel to the validated measurement.
#[derive(Debug, Clone)]
pub struct DenoisedSeries {
    pub wavelength: Wavelength,
    pub atn_min: f64,
    /// Name of the ATN column as it appeared after header normalization.
    pub atn_column: String,
    pub timestamps: Vec<Timestamp>,
    pub raw_bc: Vec<f64>,
    pub processed_bc: Vec<f64>,
    pub atn: Vec<f64>,
    pub window_start: Vec<bool>,
    pub window_end: Vec<bool>,
    pub windows: Vec<OnaWindow>,
    pub tail: Option<Range<usize>>,
}

impl DenoisedSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn tail_len(&self) -> usize {
        self.tail.as_ref().map_or(0, |t| t.len())
    }
}

/// Applies ONA to a validated measurement.
#[tracing::instrument(skip(measurement, progress), fields(rows = measurement.len(), wavelength = %measurement.wavelength))]
pub fn denoise<F>(measurement: Measurement, atn_min: f64, progress: F) -> Result<DenoisedSeries>
where
    F: FnMut(usize, usize),
{
    let atn_min = validate_atn_min(atn_min)?;
    let OnaOutput {
        processed,
        windows,
        tail,
    } = apply_ona_with_progress(&measurement.atn, &measurement.bc, atn_min, progress);

    let n = measurement.len();
    let mut window_start = vec![false; n];
    let mut window_end = vec![false; n];
    for w in &windows {
        window_start[w.start] = true;
        window_end[w.end] = true;
    }

    info!(
        windows = windows.len(),
        tail_rows = tail.as_ref().map_or(0, |t| t.len()),
        "ONA applied"
    );
    debug!(atn_min, "ONA threshold");

    Ok(DenoisedSeries {
        wavelength: measurement.wavelength,
        atn_min,
        atn_column: measurement.atn_column,
        timestamps: measurement.timestamps,
        raw_bc: measurement.bc,
        processed_bc: processed,
        atn: measurement.atn,
        window_start,
        window_end,
        windows,
        tail,
    })
}
