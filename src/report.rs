//! Summary data handed to reporting and plotting consumers.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::measurement::DroppedRows;
use crate::ona::DenoisedSeries;
use crate::sync::{SyncReport, SynchronizedSeries};
use crate::timestamp::Timestamp;

/// Plot series are capped at this many points.
pub const MAX_PLOT_POINTS: usize = 10_000;

/// Correlations are only reported with at least this many finite pairs.
pub const MIN_CORRELATION_POINTS: usize = 5;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Pearson correlation coefficient. `None` when either side is constant.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (mx, my) = (mean(&x[..n]), mean(&y[..n]));
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    let denom = (sxx * syy).sqrt();
    (denom > 0.0).then(|| sxy / denom)
}

/// 1-based ranks; ties share their average rank.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut out = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            out[idx] = rank;
        }
        i = j + 1;
    }
    out
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&ranks(x), &ranks(y))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Correlation {
    pub pearson_r: Option<f64>,
    pub spearman_r: Option<f64>,
    pub data_points: usize,
    pub null_percentage: f64,
}

/// Correlates the rows where both sides are present and finite.
pub fn correlate(x: &[Option<f64>], y: &[Option<f64>]) -> Option<Correlation> {
    let total = x.len().min(y.len());
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((*a, *b)),
            _ => None,
        })
        .unzip();

    if xs.len() < MIN_CORRELATION_POINTS {
        return None;
    }
    Some(Correlation {
        pearson_r: pearson(&xs, &ys),
        spearman_r: spearman(&xs, &ys),
        data_points: xs.len(),
        null_percentage: (1.0 - xs.len() as f64 / total as f64) * 100.0,
    })
}

/// Reduces parallel columns to at most `max_points` rows.
///
/// Rows are grouped in consecutive bins of `len / max_points`. Each bin keeps
/// its first timestamp and, per column, its mean, replaced by the bin maximum
/// when the bin's range exceeds the standard deviation of all bin means.
pub fn downsample(
    timestamps: &[Timestamp],
    columns: &[&[f64]],
    max_points: usize,
) -> (Vec<Timestamp>, Vec<Vec<f64>>) {
    let n = timestamps.len();
    if n <= max_points || max_points == 0 {
        return (
            timestamps.to_vec(),
            columns.iter().map(|c| c.to_vec()).collect(),
        );
    }

    let bin = n / max_points;
    let times = timestamps.iter().step_by(bin).copied().collect();
    let reduced = columns
        .iter()
        .map(|col| {
            let bins: Vec<(f64, f64, f64)> = col
                .chunks(bin)
                .map(|chunk| {
                    let lo = chunk.iter().copied().fold(f64::INFINITY, f64::min);
                    let hi = chunk.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (mean(chunk), lo, hi)
                })
                .collect();
            let means: Vec<f64> = bins.iter().map(|b| b.0).collect();
            let spread = stddev(&means, mean(&means));
            bins.into_iter()
                .map(|(m, lo, hi)| if hi - lo > spread { hi } else { m })
                .collect()
        })
        .collect();
    (times, reduced)
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeSeriesPoint {
    pub timestamp: String,
    #[serde(rename = "rawBC")]
    pub raw_bc: Option<f64>,
    #[serde(rename = "processedBC")]
    pub processed_bc: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub wavelength: String,
    pub atn_min: f64,
    pub original_rows: usize,
    pub downsampled_rows: usize,
    pub start: Option<String>,
    pub end: Option<String>,
    pub windows: usize,
    pub mean_window_rows: f64,
    pub tail_rows: usize,
    pub dropped: DroppedRows,
    pub weather: Option<SyncReport>,
}

/// Everything a plotting front end needs for one job.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub time_series: Vec<TimeSeriesPoint>,
    pub comparison: Option<Correlation>,
    pub weather_correlations: BTreeMap<String, Correlation>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn as_options(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(finite).collect()
}

pub fn prepare_report(
    denoised: &DenoisedSeries,
    synchronized: Option<(&SynchronizedSeries, &SyncReport)>,
    dropped: DroppedRows,
) -> Report {
    let (times, cols) = downsample(
        &denoised.timestamps,
        &[denoised.raw_bc.as_slice(), denoised.processed_bc.as_slice()],
        MAX_PLOT_POINTS,
    );
    let time_series = times
        .iter()
        .zip(cols[0].iter().zip(&cols[1]))
        .map(|(t, (raw, processed))| TimeSeriesPoint {
            timestamp: t.to_rfc3339(),
            raw_bc: finite(*raw),
            processed_bc: finite(*processed),
        })
        .collect();

    let comparison = correlate(
        &as_options(&denoised.raw_bc),
        &as_options(&denoised.processed_bc),
    );

    let mut weather_correlations = BTreeMap::new();
    if let Some((synced, _)) = synchronized {
        let processed = as_options(&synced.denoised.processed_bc);
        for col in &synced.weather {
            if let Some(c) = correlate(&col.values, &processed) {
                weather_correlations.insert(col.name.clone(), c);
            }
        }
    }

    let window_sizes: Vec<f64> = denoised.windows.iter().map(|w| w.len() as f64).collect();
    let metadata = ReportMetadata {
        wavelength: denoised.wavelength.to_string(),
        atn_min: denoised.atn_min,
        original_rows: denoised.len(),
        downsampled_rows: times.len(),
        start: denoised.timestamps.first().map(|t| t.to_rfc3339()),
        end: denoised.timestamps.last().map(|t| t.to_rfc3339()),
        windows: denoised.windows.len(),
        mean_window_rows: mean(&window_sizes),
        tail_rows: denoised.tail_len(),
        dropped,
        weather: synchronized.map(|(_, r)| r.clone()),
    };

    Report {
        metadata,
        time_series,
        comparison,
        weather_correlations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_timestamp;
    use chrono::TimeDelta;

    #[test]
    fn test_mean_and_stddev() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&v);
        assert_eq!(m, 5.0);
        assert_eq!(stddev(&v, m), 2.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(stddev(&[], 0.0), 0.0);
    }

    #[test]
    fn test_pearson_perfect_and_constant() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        assert!(pearson(&x, &[1.0; 4]).is_none());
    }

    #[test]
    fn test_spearman_monotonic_with_ties() {
        let x = [1.0, 2.0, 2.0, 3.0, 10.0];
        let y = [1.0, 4.0, 4.0, 9.0, 100.0];
        assert!((spearman(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(ranks(&x), vec![1.0, 2.5, 2.5, 4.0, 5.0]);
    }

    #[test]
    fn test_correlate_requires_five_pairs() {
        let x = [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)];
        let y = [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)];
        assert!(correlate(&x, &y).is_none());

        let x = [Some(1.0), Some(2.0), None, Some(4.0), Some(5.0), Some(6.0)];
        let y = [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0), Some(7.0)];
        let c = correlate(&x, &y).unwrap();
        assert_eq!(c.data_points, 5);
        assert!((c.null_percentage - 100.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_downsample_passthrough_when_small() {
        let t0 = parse_timestamp("2024-01-01 00:00:00").unwrap();
        let ts: Vec<_> = (0..3).map(|i| t0 + TimeDelta::minutes(i)).collect();
        let (times, cols) = downsample(&ts, &[[1.0, 2.0, 3.0].as_slice()], 10);
        assert_eq!(times.len(), 3);
        assert_eq!(cols[0], vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_downsample_bins_and_keeps_spikes() {
        let t0 = parse_timestamp("2024-01-01 00:00:00").unwrap();
        let ts: Vec<_> = (0..8).map(|i| t0 + TimeDelta::minutes(i)).collect();
        let values = [1.0, 1.0, 1.0, 1.0, 1.0, 50.0, 1.0, 1.0];
        let (times, cols) = downsample(&ts, &[values.as_slice()], 4);

        assert_eq!(times.len(), 4);
        assert_eq!(times[1], ts[2]);
        assert_eq!(cols[0][0], 1.0);
        assert_eq!(cols[0][2], 50.0);
    }
}
