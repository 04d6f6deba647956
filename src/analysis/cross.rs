use ndarray::{s, Array1, Array2, ArrayView1, Axis};

use super::ppg::{argmax, std_dev};
use crate::display::{decimate, decimate_factor};

#[derive(Debug, Clone, PartialEq)]
pub struct CrossCorrelation {
    /// Lag axis in seconds.
    pub lags: Array1<f64>,
    pub values: Array1<f64>,
    /// Lag of the strongest correlation; positive when the first channel leads.
    pub best_lag: f64,
}

/// Zero-mean, unit-variance copy of `x`.
pub fn standardize(x: ArrayView1<f64>) -> Array1<f64> {
    let mean = x.mean().unwrap_or(0.0);
    let std = std_dev(x) + 1e-12;
    x.mapv(|v| (v - mean) / std)
}

/// Normalized cross-correlation over lags in `±max_lag_s`, where
/// `corr(lag)` averages `x[i]·y[i + lag]` over the overlapping samples.
pub fn cross_correlation(x: ArrayView1<f64>, y: ArrayView1<f64>, fs: f64, max_lag_s: f64) -> Option<CrossCorrelation> {
    let n = x.len().min(y.len());
    if n == 0 || !(fs > 0.0) {
        return None;
    }

    let x0 = standardize(x.slice(s![..n]));
    let y0 = standardize(y.slice(s![..n]));
    let max_lag = ((max_lag_s * fs).max(0.0) as usize).min(n - 1) as isize;

    let lags: Vec<isize> = (-max_lag..=max_lag).collect();
    let values: Array1<f64> = lags
        .iter()
        .map(|&lag| {
            let shift = lag.unsigned_abs();
            let (a, b) = if lag >= 0 {
                (x0.slice(s![..n - shift]), y0.slice(s![shift..]))
            } else {
                (x0.slice(s![shift..]), y0.slice(s![..n - shift]))
            };
            a.dot(&b) / (n - shift) as f64
        })
        .collect();

    let best = argmax(values.view())?;
    Some(CrossCorrelation {
        lags: lags.iter().map(|&l| l as f64 / fs).collect(),
        best_lag: lags[best] as f64 / fs,
        values,
    })
}

/// Ensemble of beat-centred windows resampled to a common length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageBeat {
    /// Time relative to the apex, in seconds.
    pub t_rel: Array1<f64>,
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    pub beats: usize,
}

impl AverageBeat {
    pub fn is_empty(&self) -> bool {
        self.beats == 0
    }

    /// Scales mean and spread so that the largest mean excursion is 1.
    pub fn normalized(&self) -> AverageBeat {
        let peak = self.mean.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if !(peak > 0.0) {
            return self.clone();
        }
        AverageBeat {
            t_rel: self.t_rel.clone(),
            mean: &self.mean / peak,
            std: &self.std / peak,
            beats: self.beats,
        }
    }
}

/// Linear interpolation of `segment` onto `out_len` evenly spaced points
/// spanning the same extent.
fn resample(segment: ArrayView1<f64>, out_len: usize) -> Array1<f64> {
    let last = (segment.len() - 1) as f64;
    Array1::from_iter((0..out_len).map(|j| {
        let pos = if out_len > 1 {
            j as f64 * last / (out_len - 1) as f64
        } else {
            0.0
        };
        let i = (pos.floor() as usize).min(segment.len() - 1);
        let frac = pos - i as f64;
        if i + 1 < segment.len() {
            segment[i] + frac * (segment[i + 1] - segment[i])
        } else {
            segment[i]
        }
    }))
}

pub fn average_beat(signal: ArrayView1<f64>, peaks: &[usize], fs: f64, width_s: f64, out_len: usize) -> AverageBeat {
    if peaks.len() < 2 || out_len == 0 {
        return AverageBeat::default();
    }

    let half = (width_s * fs / 2.0).max(0.0) as usize;
    let n = signal.len();
    let rows: Vec<Array1<f64>> = peaks
        .iter()
        .filter_map(|&pk| {
            let start = pk.saturating_sub(half);
            let end = (pk + half).min(n);
            (end >= start + 10).then(|| resample(signal.slice(s![start..end]), out_len))
        })
        .collect();
    if rows.is_empty() {
        return AverageBeat::default();
    }

    let mut ensemble = Array2::<f64>::zeros((rows.len(), out_len));
    for (mut dst, src) in ensemble.axis_iter_mut(Axis(0)).zip(&rows) {
        dst.assign(src);
    }

    let (mean, std) = match ensemble.mean_axis(Axis(0)) {
        Some(mean) => {
            let std = ensemble.std_axis(Axis(0), 0.0);
            (mean, std)
        }
        None => return AverageBeat::default(),
    };

    AverageBeat {
        t_rel: Array1::linspace(-width_s / 2.0, width_s / 2.0, out_len),
        mean,
        std,
        beats: rows.len(),
    }
}

/// Z-scored channel pairs thinned to at most about `max_points` points.
pub fn paired_scatter(x: ArrayView1<f64>, y: ArrayView1<f64>, max_points: usize) -> (Array1<f64>, Array1<f64>) {
    let n = x.len().min(y.len());
    if n == 0 {
        return (Array1::zeros(0), Array1::zeros(0));
    }
    let factor = decimate_factor(n, 1, 1, max_points);
    let xs = standardize(x.slice(s![..n]));
    let ys = standardize(y.slice(s![..n]));
    (decimate(xs.view(), factor), decimate(ys.view(), factor))
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn recovers_a_known_shift() {
        let fs = 100.0;
        let mut rng = StdRng::seed_from_u64(42);
        let base: Vec<f64> = (0..1200).map(|_| rng.gen_range(-1.0..1.0)).collect();
        for k in [0usize, 7, 23] {
            // second channel trails the first by k samples
            let x = Array1::from_iter(base[100..1100].iter().copied());
            let y = Array1::from_iter(base[100 - k..1100 - k].iter().copied());
            let xc = cross_correlation(x.view(), y.view(), fs, 1.0).unwrap();
            assert!((xc.best_lag - k as f64 / fs).abs() <= 1.0 / fs, "k {} lag {}", k, xc.best_lag);
            assert_eq!(xc.lags.len(), 201);
            assert!(xc.values.iter().all(|v| v.abs() <= 1.1));
        }
    }

    #[test]
    fn negative_lag_when_second_channel_leads() {
        let mut rng = StdRng::seed_from_u64(3);
        let base: Vec<f64> = (0..700).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let x = Array1::from_iter(base[100..600].iter().copied());
        let y = Array1::from_iter(base[110..610].iter().copied());
        let xc = cross_correlation(x.view(), y.view(), 100.0, 0.5).unwrap();
        assert!((xc.best_lag + 0.1).abs() < 1e-9, "lag {}", xc.best_lag);
        assert!(cross_correlation(Array1::zeros(0).view(), y.view(), 100.0, 1.0).is_none());
    }

    #[test]
    fn average_of_identical_beats_has_no_spread() {
        let fs = 100.0;
        let x = Array1::from_iter((0..1000).map(|i| (2.0 * PI * i as f64 / 100.0).cos()));
        let peaks: Vec<usize> = (1..9).map(|k| k * 100).collect();
        let avg = average_beat(x.view(), &peaks, fs, 1.2, 200);
        assert_eq!(avg.beats, 8);
        assert_eq!(avg.mean.len(), 200);
        assert!(avg.std.iter().all(|&s| s < 1e-9));
        assert!((avg.t_rel[0] + 0.6).abs() < 1e-12 && (avg.t_rel[199] - 0.6).abs() < 1e-12);
        let norm = avg.normalized();
        assert!((norm.mean.iter().fold(0.0f64, |m, v| m.max(v.abs())) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn short_edge_windows_are_skipped() {
        let x = Array1::from_iter((0..300).map(|i| i as f64));
        // a 0.1 s window is 10 samples; the first peak only gets 5 of them
        let avg = average_beat(x.view(), &[0, 150], 100.0, 0.1, 50);
        assert_eq!(avg.beats, 1);
        assert_eq!(avg.mean[0], 145.0);
        assert!(average_beat(x.view(), &[150], 100.0, 1.2, 50).is_empty());
    }

    #[test]
    fn scatter_respects_point_cap() {
        let x = Array1::from_iter((0..25_000).map(|i| i as f64));
        let (sx, sy) = paired_scatter(x.view(), x.view(), 10_000);
        assert_eq!(sx.len(), sy.len());
        assert!(sx.len() <= 10_000);
        assert!(sx.mean().unwrap().abs() < 0.1);
    }
}
