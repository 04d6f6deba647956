use std::cmp::Ordering;

use find_peaks::PeakFinder;
use ndarray::{s, Array1, ArrayView1};
use ndarray_stats::interpolate::Midpoint;
use ndarray_stats::{QuantileExt, Quantile1dExt};
use noisy_float::types::{n64, N64};

/// One detected beat apex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub time: f64,
}

/// Beat detector output. `hr_times`/`hr_values` only hold the in-range rates,
/// `ibis` keeps every gap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatTrend {
    pub peaks: Vec<Peak>,
    pub ibis: Vec<f64>,
    pub hr_times: Vec<f64>,
    pub hr_values: Vec<f64>,
}

impl BeatTrend {
    pub fn peak_indices(&self) -> Vec<usize> {
        self.peaks.iter().map(|p| p.index).collect()
    }

    pub fn mean_hr(&self) -> Option<f64> {
        if self.hr_values.is_empty() {
            None
        } else {
            Some(self.hr_values.iter().sum::<f64>() / self.hr_values.len() as f64)
        }
    }
}

pub fn std_dev(x: ArrayView1<f64>) -> f64 {
    if x.is_empty() {
        0.0
    } else {
        x.std(0.0)
    }
}

fn find_peak_indices(signal: &[f64], prominence: f64, distance: usize) -> Vec<usize> {
    let peaks = PeakFinder::new(signal)
        .with_min_prominence(prominence)
        .with_min_distance(distance)
        .find_peaks();

    let mut peaks: Vec<usize> = peaks.iter().map(|p| p.middle_position()).collect();
    peaks.sort_unstable();
    peaks
}

/// Finds beat apices in an AC signal and derives inter-beat intervals and the
/// instantaneous heart rate between consecutive beats.
pub fn detect(ac: ArrayView1<f64>, fs: f64, hr_min: f64, hr_max: f64, prominence_factor: f64) -> BeatTrend {
    if !(fs > 0.0) || (ac.len() as f64) < fs || ac.iter().any(|v| !v.is_finite()) {
        return BeatTrend::default();
    }

    let distance = (fs * 60.0 / hr_max).max(1.0) as usize;
    let prominence = (prominence_factor * std_dev(ac)).max(1e-12);

    let indices = match ac.as_slice() {
        Some(slice) => find_peak_indices(slice, prominence, distance),
        None => find_peak_indices(&ac.to_vec(), prominence, distance),
    };
    if indices.len() < 2 {
        return BeatTrend::default();
    }

    let peaks: Vec<Peak> = indices
        .iter()
        .map(|&index| Peak { index, time: index as f64 / fs })
        .collect();
    let ibis: Vec<f64> = peaks.windows(2).map(|w| w[1].time - w[0].time).collect();

    let (hr_times, hr_values) = peaks
        .windows(2)
        .zip(&ibis)
        .map(|(w, &ibi)| ((w[0].time + w[1].time) / 2.0, 60.0 / ibi.max(1e-6)))
        .filter(|&(_, bpm)| (hr_min..=hr_max).contains(&bpm))
        .unzip();

    BeatTrend {
        peaks,
        ibis,
        hr_times,
        hr_values,
    }
}

/// Sample range of one beat around its apex. Invariant: `start <= peak <= end`
/// for apices inside the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    pub start: usize,
    pub peak: usize,
    pub end: usize,
}

impl Beat {
    /// Number of samples covered, both boundaries included.
    pub fn span(&self) -> usize {
        self.end - self.start + 1
    }

    /// Peak-to-trough span of `signal` within the beat.
    pub fn amplitude(&self, signal: ArrayView1<f64>) -> f64 {
        let segment = signal.slice(s![self.start..=self.end]);
        match (segment.max_skipnan(), segment.min_skipnan()) {
            (max, min) if max.is_finite() && min.is_finite() => max - min,
            _ => f64::NAN,
        }
    }

    pub fn mid_time(&self, fs: f64) -> f64 {
        (self.start + self.end) as f64 / (2.0 * fs)
    }
}

/// Splits a signal of `len` samples into one beat per peak. Boundaries sit
/// halfway between neighbouring peaks; the outer edges reach a `guard`
/// fraction of the adjacent interval beyond the first and last peak.
pub fn segment(peaks: &[usize], len: usize, guard: f64) -> Vec<Beat> {
    if peaks.len() < 2 || len < 2 {
        return Vec::new();
    }

    let first_ibi = peaks[1].saturating_sub(peaks[0]);
    let last_ibi = peaks[peaks.len() - 1].saturating_sub(peaks[peaks.len() - 2]);
    let mids: Vec<usize> = peaks.windows(2).map(|w| w[0] + w[1].saturating_sub(w[0]) / 2).collect();

    let first_start = peaks[0].saturating_sub((guard * first_ibi as f64) as usize);
    let last_end = peaks[peaks.len() - 1] + (guard * last_ibi as f64) as usize;

    let starts = std::iter::once(first_start).chain(mids.iter().copied());
    let ends = mids.iter().copied().chain(std::iter::once(last_end));

    starts
        .zip(peaks.iter().copied())
        .zip(ends)
        .map(|((start, peak), end)| {
            let start = start.min(len - 2);
            let end = end.clamp(start + 1, len - 1);
            Beat { start, peak, end }
        })
        .collect()
}

/// Per-beat AC amplitude and local DC level, stamped at the beat midpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatMetrics {
    pub mid_times: Vec<f64>,
    pub ac_amps: Vec<f64>,
    pub dc_baselines: Vec<f64>,
}

impl BeatMetrics {
    pub fn len(&self) -> usize {
        self.mid_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mid_times.is_empty()
    }
}

/// Median of the finite values, `NaN` when there are none.
pub fn median(x: ArrayView1<f64>) -> f64 {
    let mut finite: Array1<N64> = x.iter().filter(|v| v.is_finite()).map(|&v| n64(v)).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite
        .quantile_mut(n64(0.5), &Midpoint)
        .map(|m| m.raw())
        .unwrap_or(f64::NAN)
}

pub fn beat_metrics(raw: ArrayView1<f64>, ac: ArrayView1<f64>, beats: &[Beat], fs: f64, dc_window_s: f64) -> BeatMetrics {
    let n = raw.len().min(ac.len());
    let half = (dc_window_s * fs / 2.0).max(0.0) as usize;
    let mut metrics = BeatMetrics::default();

    for beat in beats.iter().filter(|b| b.end < n && b.span() >= 3) {
        let lo = beat.peak.saturating_sub(half);
        let hi = (beat.peak + half).min(n);
        let dc = if hi > lo {
            median(raw.slice(s![lo..hi]))
        } else {
            median(raw)
        };

        metrics.mid_times.push(beat.mid_time(fs));
        metrics.ac_amps.push(beat.amplitude(ac));
        metrics.dc_baselines.push(dc);
    }
    metrics
}

/// Index of the largest value, ignoring NaN.
pub fn argmax(x: ArrayView1<f64>) -> Option<usize> {
    x.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
}
