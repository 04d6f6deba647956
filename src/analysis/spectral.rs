//! Welch-averaged spectra on a shared segment layout: periodic Hann window,
//! 50 % overlap, per-segment mean removal, one-sided output.

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayView1};
use realfft::num_complex::Complex;
use realfft::RealFftPlanner;

use super::ppg::argmax;
use crate::Estimate;

/// One-sided spectrum with its frequency axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    pub freqs: Array1<f64>,
    pub values: Array1<f64>,
}

impl Spectrum {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the bin closest to `hz`.
    pub fn value_at(&self, hz: f64) -> Estimate {
        if !hz.is_finite() {
            return Estimate::Unavailable;
        }
        self.freqs
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - hz).abs().total_cmp(&(b.1 - hz).abs()))
            .map_or(Estimate::Unavailable, |(i, _)| Estimate::from_finite(self.values[i]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scaling {
    /// Power per Hz.
    Density,
    /// Power per bin.
    Spectrum,
}

/// Segment layout and FFT plan shared by every Welch-style estimate.
struct Segmenter {
    nperseg: usize,
    step: usize,
    window: Vec<f64>,
    fft: std::sync::Arc<dyn realfft::RealToComplex<f64>>,
}

impl Segmenter {
    fn new(nperseg: usize, noverlap: usize) -> Self {
        let window = hann(nperseg);
        let fft = RealFftPlanner::<f64>::new().plan_fft_forward(nperseg);
        Self {
            nperseg,
            step: (nperseg - noverlap.min(nperseg - 1)).max(1),
            window,
            fft,
        }
    }

    fn starts(&self, len: usize) -> impl Iterator<Item = usize> {
        let last = len.saturating_sub(self.nperseg);
        let usable = len >= self.nperseg;
        (0..=last).step_by(self.step).filter(move |_| usable)
    }

    fn bins(&self) -> usize {
        self.nperseg / 2 + 1
    }

    fn freqs(&self, fs: f64) -> Array1<f64> {
        Array1::from_iter((0..self.bins()).map(|k| k as f64 * fs / self.nperseg as f64))
    }

    /// Windowed FFT of one mean-removed segment.
    fn transform(&self, segment: ArrayView1<f64>) -> Vec<Complex<f64>> {
        let mean = segment.mean().unwrap_or(0.0);
        let mut input: Vec<f64> = segment
            .iter()
            .zip(&self.window)
            .map(|(&x, &w)| (x - mean) * w)
            .collect();
        let mut output = self.fft.make_output_vec();
        // lengths come from the plan itself
        if self.fft.process(&mut input, &mut output).is_err() {
            output.iter_mut().for_each(|c| *c = Complex::new(f64::NAN, f64::NAN));
        }
        output
    }

    /// Scale factor turning `X·conj(Y)` into a one-sided estimate.
    fn scale(&self, fs: f64, scaling: Scaling) -> Vec<f64> {
        let base = match scaling {
            Scaling::Density => 1.0 / (fs * self.window.iter().map(|w| w * w).sum::<f64>()),
            Scaling::Spectrum => 1.0 / self.window.iter().sum::<f64>().powi(2),
        };
        (0..self.bins())
            .map(|k| {
                let edge = k == 0 || (self.nperseg % 2 == 0 && k == self.nperseg / 2);
                if edge {
                    base
                } else {
                    2.0 * base
                }
            })
            .collect()
    }
}

/// Periodic Hann window.
fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

fn segment_len(len: usize, cap: usize) -> usize {
    len.min(cap)
}

/// Averaged cross-spectral density of `x` and `y` (`conj(X)·Y`). Returns the
/// frequency axis and complex values; empty for fewer than two samples.
pub fn csd(x: ArrayView1<f64>, y: ArrayView1<f64>, fs: f64, cap: usize) -> (Array1<f64>, Vec<Complex<f64>>) {
    let len = x.len().min(y.len());
    let nperseg = segment_len(len, cap);
    if nperseg < 2 || !(fs > 0.0) {
        return (Array1::zeros(0), Vec::new());
    }

    let seg = Segmenter::new(nperseg, nperseg / 2);
    let scale = seg.scale(fs, Scaling::Density);
    let mut acc = vec![Complex::new(0.0, 0.0); seg.bins()];
    let mut count = 0usize;
    for start in seg.starts(len) {
        let fx = seg.transform(x.slice(ndarray::s![start..start + nperseg]));
        let fy = seg.transform(y.slice(ndarray::s![start..start + nperseg]));
        for ((a, px), py) in acc.iter_mut().zip(&fx).zip(&fy) {
            *a += px.conj() * py;
        }
        count += 1;
    }

    let values = acc
        .iter()
        .zip(&scale)
        .map(|(a, s)| a * (*s / count.max(1) as f64))
        .collect();
    (seg.freqs(fs), values)
}

/// Welch power spectral density (power per Hz).
pub fn welch(x: ArrayView1<f64>, fs: f64, cap: usize) -> Spectrum {
    let (freqs, values) = csd(x, x, fs, cap);
    Spectrum {
        freqs,
        values: values.iter().map(|c| c.re).collect(),
    }
}

/// Magnitude-squared coherence `|Pxy|² / (Pxx·Pyy)`, clamped to [0, 1].
/// Bins where either channel carries no power are reported as 0.
pub fn coherence(x: ArrayView1<f64>, y: ArrayView1<f64>, fs: f64, cap: usize) -> Spectrum {
    let (freqs, pxy) = csd(x, y, fs, cap);
    let (_, pxx) = csd(x, x, fs, cap);
    let (_, pyy) = csd(y, y, fs, cap);

    let values = pxy
        .iter()
        .zip(pxx.iter().zip(&pyy))
        .map(|(xy, (xx, yy))| {
            let denom = xx.re * yy.re;
            if denom > 0.0 && denom.is_finite() {
                (xy.norm_sqr() / denom).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect();
    Spectrum { freqs, values }
}

/// Dominant rate in `band` (Hz), in events per minute.
pub fn rate(x: ArrayView1<f64>, fs: f64, band: (f64, f64), cap: usize) -> Estimate {
    let psd = welch(x, fs, cap);
    band_peak(&psd, band).map(|hz| 60.0 * hz).into()
}

/// Frequency of the largest finite in-band value.
pub fn band_peak(spectrum: &Spectrum, (lo, hi): (f64, f64)) -> Option<f64> {
    let (freqs, values): (Vec<f64>, Vec<f64>) = spectrum
        .freqs
        .iter()
        .zip(&spectrum.values)
        .filter(|&(&f, &v)| f >= lo && f <= hi && v.is_finite())
        .map(|(&f, &v)| (f, v))
        .unzip();
    argmax(ArrayView1::from(values.as_slice())).map(|i| freqs[i])
}

/// Short-time power spectrum; `power` is bins × segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub freqs: Array1<f64>,
    pub times: Array1<f64>,
    pub power: Array2<f64>,
}

/// Spectrogram with `window_s` long segments overlapping by `overlap`
/// (fraction, clipped to [0, 0.95]). `None` for signals of one second or
/// less, or when no full segment fits.
pub fn spectrogram(x: ArrayView1<f64>, fs: f64, window_s: f64, overlap: f64) -> Option<Spectrogram> {
    if !(fs > 0.0) || x.len() as f64 <= fs {
        return None;
    }
    let nperseg = ((window_s * fs).max(0.0) as usize).max(16);
    if nperseg > x.len() {
        return None;
    }
    let noverlap = (overlap.clamp(0.0, 0.95) * nperseg as f64) as usize;

    let seg = Segmenter::new(nperseg, noverlap);
    let scale = seg.scale(fs, Scaling::Spectrum);
    let starts: Vec<usize> = seg.starts(x.len()).collect();

    let mut power = Array2::<f64>::zeros((seg.bins(), starts.len()));
    for (col, &start) in starts.iter().enumerate() {
        let spectrum = seg.transform(x.slice(ndarray::s![start..start + nperseg]));
        for (row, (c, s)) in spectrum.iter().zip(&scale).enumerate() {
            power[[row, col]] = c.norm_sqr() * s;
        }
    }

    let times = starts
        .iter()
        .map(|&start| (start as f64 + nperseg as f64 / 2.0) / fs)
        .collect();
    Some(Spectrogram {
        freqs: seg.freqs(fs),
        times,
        power,
    })
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn tone(freq: f64, fs: f64, n: usize, amp: f64) -> Array1<f64> {
        Array1::from_iter((0..n).map(|i| amp * (2.0 * PI * freq * i as f64 / fs).sin()))
    }

    #[test]
    fn psd_integrates_to_signal_power() {
        let fs = 100.0;
        let x = tone(5.0, fs, 4096, 2.0);
        let psd = welch(x.view(), fs, 1024);
        assert_eq!(psd.freqs.len(), 513);
        let df = fs / 1024.0;
        let total: f64 = psd.values.sum() * df;
        // a sine of amplitude 2 carries power 2
        assert!((total - 2.0).abs() < 0.05, "total {}", total);
        assert!((band_peak(&psd, (0.0, 50.0)).unwrap() - 5.0).abs() <= df);
    }

    #[test]
    fn rate_finds_heart_and_breathing_components() {
        let fs = 100.0;
        let x = &tone(1.2, fs, 6000, 1.0) + &tone(0.25, fs, 6000, 0.5);
        let hr = rate(x.view(), fs, (0.6, 3.5), 2048).value().unwrap();
        let rr = rate(x.view(), fs, (0.1, 0.5), 2048).value().unwrap();
        let resolution = 60.0 * fs / 2048.0;
        assert!((hr - 72.0).abs() <= resolution, "hr {}", hr);
        assert!((rr - 15.0).abs() <= resolution, "rr {}", rr);
    }

    #[test]
    fn rate_outside_resolvable_band_is_unavailable() {
        let x = tone(1.0, 100.0, 50, 1.0);
        // 50-sample segments resolve 2 Hz steps; nothing lands in 0.6..1.5
        assert_eq!(rate(x.view(), 100.0, (0.6, 1.5), 2048), Estimate::Unavailable);
        assert_eq!(rate(Array1::zeros(0).view(), 100.0, (0.6, 3.5), 2048), Estimate::Unavailable);
    }

    #[test]
    fn coherence_is_bounded_and_high_for_shared_component() {
        let fs = 100.0;
        let mut rng = StdRng::seed_from_u64(7);
        let shared = tone(1.2, fs, 4000, 1.0);
        let x = shared.mapv(|v| v + 0.1 * rng.gen_range(-1.0..1.0));
        let y = shared.mapv(|v| 0.8 * v + 0.1 * rng.gen_range(-1.0..1.0));
        let coh = coherence(x.view(), y.view(), fs, 512);
        assert!(coh.values.iter().all(|&c| (0.0..=1.0).contains(&c)));
        let at_hr = coh.value_at(1.2).value().unwrap();
        assert!(at_hr > 0.9, "coherence {}", at_hr);
    }

    #[test]
    fn spectrogram_shape_follows_window_and_overlap() {
        let fs = 100.0;
        let x = tone(10.0, fs, 1000, 1.0);
        let sg = spectrogram(x.view(), fs, 2.0, 0.5).unwrap();
        assert_eq!(sg.freqs.len(), 101);
        // 200-sample segments every 100 samples
        assert_eq!(sg.times.len(), 9);
        assert_eq!(sg.power.dim(), (101, 9));
        let column = sg.power.column(4);
        assert_eq!(argmax(column), Some(20));
        assert!(spectrogram(x.slice(ndarray::s![..100]), fs, 2.0, 0.5).is_none());
    }
}
