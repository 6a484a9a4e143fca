//! Gap filling for irregularly sampled series.
//!
//! Only interior gaps are filled; values before the first or after the last
//! known sample stay missing.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Linear,
    /// Natural cubic spline through all known samples. Falls back to linear
    /// when fewer than three samples are known or when the sample spacing is
    /// too uneven for a stable solve.
    Cubic,
}

/// Smallest ratio between the shortest and the longest gap between known
/// samples for which the spline is used.
pub const MIN_SPLINE_SPACING_RATIO: f64 = 1e-3;

fn spline_is_stable(xs: &[f64]) -> bool {
    let (lo, hi) = xs
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), h| (lo.min(h), hi.max(h)));
    lo > 0.0 && lo >= hi * MIN_SPLINE_SPACING_RATIO
}

/// Fills the interior `None` entries of `values` sampled at positions `x`.
///
/// `x` must be strictly increasing and as long as `values`. Returns the
/// number of entries filled.
pub fn fill_gaps(x: &[f64], values: &mut [Option<f64>], method: Interpolation) -> usize {
    let known: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();
    if known.len() < 2 || known.len() == values.len() {
        return 0;
    }

    let kx: Vec<f64> = known.iter().map(|&i| x[i]).collect();
    let ky: Vec<f64> = known.iter().filter_map(|&i| values[i]).collect();
    let spline = match method {
        Interpolation::Cubic if known.len() >= 3 && spline_is_stable(&kx) => {
            Some(natural_spline_moments(&kx, &ky))
        }
        _ => None,
    };

    let mut filled = 0;
    for (seg, pair) in known.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        for idx in a + 1..b {
            let v = match &spline {
                Some(m) => eval_spline(&kx, &ky, m, seg, x[idx]),
                None => lerp(kx[seg], ky[seg], kx[seg + 1], ky[seg + 1], x[idx]),
            };
            values[idx] = Some(v);
            filled += 1;
        }
    }
    filled
}

fn lerp(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    let span = x1 - x0;
    if span == 0.0 {
        return y0;
    }
    y0 + (y1 - y0) * (x - x0) / span
}

/// Second derivatives of the natural cubic spline through `(xs, ys)`,
/// solved with the Thomas algorithm.
fn natural_spline_moments(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut moments = vec![0.0; n];
    if n < 3 {
        return moments;
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m = n - 2;
    let mut diag = vec![0.0; m];
    let mut upper = vec![0.0; m];
    let mut rhs = vec![0.0; m];

    for k in 0..m {
        let i = k + 1;
        diag[k] = 2.0 * (h[i - 1] + h[i]);
        upper[k] = h[i];
        rhs[k] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
    }

    // forward sweep; the sub-diagonal entry of row k is h[k]
    for k in 1..m {
        let w = h[k] / diag[k - 1];
        diag[k] -= w * upper[k - 1];
        rhs[k] -= w * rhs[k - 1];
    }
    let mut solution = vec![0.0; m];
    solution[m - 1] = rhs[m - 1] / diag[m - 1];
    for k in (0..m - 1).rev() {
        solution[k] = (rhs[k] - upper[k] * solution[k + 1]) / diag[k];
    }

    moments[1..n - 1].copy_from_slice(&solution);
    moments
}

fn eval_spline(xs: &[f64], ys: &[f64], moments: &[f64], seg: usize, x: f64) -> f64 {
    let (x0, x1) = (xs[seg], xs[seg + 1]);
    let (y0, y1) = (ys[seg], ys[seg + 1]);
    let (m0, m1) = (moments[seg], moments[seg + 1]);
    let h = x1 - x0;
    if h == 0.0 {
        return y0;
    }
    let a = x1 - x;
    let b = x - x0;
    m0 * a.powi(3) / (6.0 * h)
        + m1 * b.powi(3) / (6.0 * h)
        + (y0 / h - m0 * h / 6.0) * a
        + (y1 / h - m1 * h / 6.0) * b
}
