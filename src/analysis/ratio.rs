use std::fmt::Debug;

use ndarray::{Array1, ArrayView1};
use ndarray_stats::QuantileExt;

use super::ppg::{beat_metrics, median, segment};
use crate::Estimate;

/// Maps the ratio-of-ratios R to an SpO2 percentage.
pub trait SpO2Curve: Debug + Send + Sync {
    fn spo2(&self, r: f64) -> f64;
}

/// `a·R² + b·R + c`, by default the common empirical calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticCurve {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for QuadraticCurve {
    fn default() -> Self {
        Self {
            a: -45.06,
            b: 30.354,
            c: 94.845,
        }
    }
}

impl SpO2Curve for QuadraticCurve {
    fn spo2(&self, r: f64) -> f64 {
        self.a * r * r + self.b * r + self.c
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioEstimate {
    pub spo2: Estimate,
    pub r: Estimate,
    /// Perfusion index of the second channel, in percent.
    pub pi: Estimate,
}

impl RatioEstimate {
    pub const UNAVAILABLE: RatioEstimate = RatioEstimate {
        spo2: Estimate::Unavailable,
        r: Estimate::Unavailable,
        pi: Estimate::Unavailable,
    };
}

fn usable(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// Ratio of ratios `(ac1/dc1)/(ac2/dc2)` with its SpO2 mapping and the
/// perfusion index `100·ac2/dc2`.
pub fn estimate(dc1: f64, dc2: f64, ac1: f64, ac2: f64, curve: &dyn SpO2Curve) -> RatioEstimate {
    if ![dc1, dc2, ac1, ac2].iter().all(|&v| usable(v)) {
        return RatioEstimate::UNAVAILABLE;
    }

    let r = Estimate::from_finite((ac1 / dc1) / (ac2 / dc2));
    RatioEstimate {
        spo2: r.map(|r| curve.spo2(r)),
        r,
        pi: Estimate::from_finite(100.0 * ac2 / dc2),
    }
}

pub(crate) fn peak_to_peak(x: ArrayView1<f64>) -> f64 {
    match (x.max_skipnan(), x.min_skipnan()) {
        (max, min) if max.is_finite() && min.is_finite() => max - min,
        _ => f64::NAN,
    }
}

/// Whole-window estimate: DC is the raw mean, AC half the peak-to-peak span of
/// the filtered signal.
pub fn window_estimate(
    raw1: ArrayView1<f64>,
    raw2: ArrayView1<f64>,
    ac1: ArrayView1<f64>,
    ac2: ArrayView1<f64>,
    curve: &dyn SpO2Curve,
) -> RatioEstimate {
    let dc1 = raw1.mean().unwrap_or(f64::NAN);
    let dc2 = raw2.mean().unwrap_or(f64::NAN);
    estimate(dc1, dc2, peak_to_peak(ac1) / 2.0, peak_to_peak(ac2) / 2.0, curve)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatRatioSeries {
    pub times: Vec<f64>,
    pub r: Vec<f64>,
    pub spo2: Vec<f64>,
}

impl BeatRatioSeries {
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

/// Beat-by-beat R and SpO2. Beats are cut from the second channel's peaks and
/// the same boundaries are applied to both channels.
#[allow(clippy::too_many_arguments)]
pub fn beat_ratio_series(
    raw1: ArrayView1<f64>,
    raw2: ArrayView1<f64>,
    ac1: ArrayView1<f64>,
    ac2: ArrayView1<f64>,
    peaks2: &[usize],
    fs: f64,
    guard: f64,
    dc_window_s: f64,
    curve: &dyn SpO2Curve,
) -> BeatRatioSeries {
    let beats = segment(peaks2, ac2.len(), guard);
    if beats.is_empty() {
        return BeatRatioSeries::default();
    }

    let first = beat_metrics(raw1, ac1, &beats, fs, dc_window_s);
    let second = beat_metrics(raw2, ac2, &beats, fs, dc_window_s);

    let mut series = BeatRatioSeries::default();
    let rows = first
        .mid_times
        .iter()
        .zip(first.ac_amps.iter().zip(&first.dc_baselines))
        .zip(second.ac_amps.iter().zip(&second.dc_baselines));
    for ((&t, (&ac1, &dc1)), (&ac2, &dc2)) in rows {
        if let Estimate::Value(r) = estimate(dc1, dc2, ac1, ac2, curve).r {
            series.times.push(t);
            series.r.push(r);
            series.spo2.push(curve.spo2(r));
        }
    }
    series
}

/// Optical absorbance `-ln(x / I0)` relative to the median intensity.
pub fn absorbance(x: ArrayView1<f64>) -> Array1<f64> {
    let med = median(x);
    let reference = if med > 0.0 {
        med
    } else {
        x.mean().unwrap_or(0.0).max(1.0)
    };
    x.mapv(|v| -(v / reference).max(1e-9).ln())
}
