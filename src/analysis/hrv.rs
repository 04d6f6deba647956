//! Beat dynamics: quick quality score, second-derivative waveform and
//! interval distributions.

use ndarray::{Array1, Array2, ArrayView1};
use ndarray_stats::histogram::{Bins, Edges, Grid, HistogramExt};
use noisy_float::types::{n64, N64};

use super::ppg::std_dev;
use super::ratio::peak_to_peak;
use crate::Estimate;

/// Peak-to-peak span relative to six standard deviations. A clean sinusoid
/// scores about 0.47; impulsive noise pushes it up.
pub fn quick_snr(x: ArrayView1<f64>) -> Estimate {
    if x.len() < 2 {
        return Estimate::Unavailable;
    }
    let std = std_dev(x);
    if std == 0.0 {
        return Estimate::Unavailable;
    }
    Estimate::from_finite(peak_to_peak(x) / (6.0 * std))
}

/// Central-difference gradient with one-sided differences at the ends.
pub fn gradient(x: ArrayView1<f64>) -> Array1<f64> {
    let n = x.len();
    match n {
        0 => Array1::zeros(0),
        1 => Array1::zeros(1),
        _ => Array1::from_iter((0..n).map(|i| match i {
            0 => x[1] - x[0],
            i if i == n - 1 => x[n - 1] - x[n - 2],
            i => (x[i + 1] - x[i - 1]) / 2.0,
        })),
    }
}

/// Second-derivative (acceleration) waveform of a PPG trace.
pub fn second_derivative(x: ArrayView1<f64>) -> Array1<f64> {
    gradient(gradient(x).view())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    /// `bins + 1` bin edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Inter-beat intervals (seconds) binned in milliseconds over their own range.
pub fn ibi_histogram(ibis: &[f64], bins: usize) -> Histogram {
    let ms: Vec<f64> = ibis.iter().filter(|v| v.is_finite()).map(|v| v * 1000.0).collect();
    if ms.is_empty() || bins == 0 {
        return Histogram::default();
    }

    let lo = ms.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // a degenerate range is widened to one unit around the value
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / bins as f64;

    let edges: Vec<f64> = (0..=bins).map(|i| lo + i as f64 * width).collect();

    // grid bins are half-open, so the top edge is nudged past the maximum
    let mut grid_edges: Vec<N64> = edges.iter().map(|&e| n64(e)).collect();
    grid_edges[bins] = n64(hi + width * 1e-9);
    let grid = Grid::from(vec![Bins::new(Edges::from(grid_edges))]);

    let observations = Array2::from_shape_fn((ms.len(), 1), |(i, _)| n64(ms[i]));
    let counts = observations.histogram(grid).counts().iter().copied().collect();
    Histogram { edges, counts }
}

/// Successive interval pairs `(IBIₙ, IBIₙ₊₁)` in milliseconds.
pub fn poincare(ibis: &[f64]) -> Vec<(f64, f64)> {
    ibis.windows(2).map(|w| (w[0] * 1000.0, w[1] * 1000.0)).collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn snr_needs_variation() {
        assert_eq!(quick_snr(array![1.0].view()), Estimate::Unavailable);
        assert_eq!(quick_snr(array![2.0, 2.0, 2.0].view()), Estimate::Unavailable);
        // ±1 square wave: ptp 2, std 1
        let snr = quick_snr(array![1.0, -1.0, 1.0, -1.0].view());
        assert_eq!(snr, Estimate::Value(2.0 / 6.0));
    }

    #[test]
    fn second_derivative_of_parabola_is_constant_inside() {
        let x = Array1::from_iter((0..20).map(|i| (i * i) as f64));
        let d2 = second_derivative(x.view());
        assert_eq!(d2.len(), 20);
        for v in d2.slice(ndarray::s![2..18]) {
            assert!((v - 2.0).abs() < 1e-12);
        }
        assert_eq!(gradient(array![4.0].view()).to_vec(), vec![0.0]);
    }

    #[test]
    fn histogram_counts_every_interval() {
        let ibis = [0.8, 0.82, 0.85, 0.9, 1.0, f64::NAN];
        let h = ibi_histogram(&ibis, 4);
        assert_eq!(h.counts.iter().sum::<usize>(), 5);
        assert_eq!(h.edges.len(), 5);
        assert!((h.edges[0] - 800.0).abs() < 1e-9 && (h.edges[4] - 1000.0).abs() < 1e-9);
        assert_eq!(h.counts, vec![2, 1, 1, 1]);

        let flat = ibi_histogram(&[0.75, 0.75], 30);
        assert_eq!(flat.counts.iter().sum::<usize>(), 2);
    }

    #[test]
    fn poincare_pairs_successive_intervals() {
        assert_eq!(poincare(&[0.8, 0.9, 1.0]), vec![(800.0, 900.0), (900.0, 1000.0)]);
        assert!(poincare(&[0.8]).is_empty());
    }
}
