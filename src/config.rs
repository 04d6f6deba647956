//! Analysis defaults and the typed request parameters.
//!
//! Values arriving from a parameter source are loosely typed (text, missing,
//! wrong kind). They are normalized once into [`Parameters`] here; pipeline
//! stages only ever see the typed form.

use std::str::FromStr;
use std::sync::Arc;

use crate::analysis::filter::{FilterFamily, FilterSpec, Notch, Response};
use crate::analysis::ratio::{QuadraticCurve, SpO2Curve};

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub sampling_frequency: f64,
    pub hr_range: (f64, f64),
    pub peak_prominence_factor: f64,
    pub max_display_points: usize,
    pub display_traces: usize,
    pub decimation: usize,
    pub window_rows: (usize, usize),
    pub beat_guard_fraction: f64,
    pub dc_window_s: f64,
    pub avg_beat_width_s: f64,
    pub avg_beat_points: usize,
    pub xcorr_max_lag_s: f64,
    /// FFT segment cap for rate estimation and coherence.
    pub spectral_segment_cap: usize,
    /// FFT segment cap for the displayed PSD.
    pub psd_segment_cap: usize,
    pub hr_band_hz: (f64, f64),
    pub rr_band_hz: (f64, f64),
    pub spectrogram_window_s: f64,
    pub spectrogram_overlap: f64,
    pub scatter_points: usize,
    pub ibi_histogram_bins: usize,
    pub spo2_curve: Arc<dyn SpO2Curve>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sampling_frequency: 100.0,
            hr_range: (40.0, 180.0),
            peak_prominence_factor: 0.5,
            max_display_points: 300_000,
            display_traces: 8,
            decimation: 1,
            window_rows: (0, 9_999),
            beat_guard_fraction: 0.15,
            dc_window_s: 0.4,
            avg_beat_width_s: 1.2,
            avg_beat_points: 200,
            xcorr_max_lag_s: 1.0,
            spectral_segment_cap: 2048,
            psd_segment_cap: 4096,
            hr_band_hz: (0.6, 3.5),
            rr_band_hz: (0.1, 0.5),
            spectrogram_window_s: 2.0,
            spectrogram_overlap: 0.5,
            scatter_points: 10_000,
            ibi_histogram_bins: 30,
            spo2_curve: Arc::new(QuadraticCurve::default()),
        }
    }
}

/// Which AC channel drives the heart-rate trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrSource {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrogramSpec {
    pub window_s: f64,
    pub overlap: f64,
}

/// Strongly-typed request parameters for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub sampling_frequency: f64,
    pub filter: FilterSpec,
    pub hr_range: (f64, f64),
    pub peak_prominence_factor: f64,
    pub decimation: usize,
    pub hr_source: HrSource,
    pub spectrogram: Option<SpectrogramSpec>,
}

impl Parameters {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        RawParameters::default().normalize(config)
    }
}

/// Parameters as delivered by an untyped source. Every field is optional and
/// may contain arbitrary text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawParameters {
    pub sampling_frequency: Option<String>,
    pub decimation: Option<String>,
    pub family: Option<String>,
    pub response: Option<String>,
    pub low_hz: Option<String>,
    pub high_hz: Option<String>,
    pub order: Option<String>,
    pub rp: Option<String>,
    pub rs: Option<String>,
    pub notch_enabled: bool,
    pub notch_hz: Option<String>,
    pub notch_q: Option<String>,
    /// Free-form flags; `detrend` and `invert` are recognised.
    pub flags: Vec<String>,
    pub hr_source: Option<String>,
    pub hr_min: Option<String>,
    pub hr_max: Option<String>,
    pub peak_prominence: Option<String>,
    pub show_spectrogram: bool,
    pub spectrogram_window_s: Option<String>,
    pub spectrogram_overlap: Option<String>,
}

fn parse_or<T: FromStr>(text: &Option<String>, fallback: T) -> T {
    text.as_deref()
        .and_then(|t| t.trim().parse().ok())
        .unwrap_or(fallback)
}

fn parse_f64_or(text: &Option<String>, fallback: f64) -> f64 {
    let value: f64 = parse_or(text, fallback);
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Integer fields also accept decimal text, truncated toward zero.
fn parse_count_or(text: &Option<String>, fallback: usize) -> usize {
    match text.as_deref().map(str::trim) {
        Some(t) => t
            .parse::<usize>()
            .ok()
            .or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(|v| v as usize)
            })
            .unwrap_or(fallback),
        None => fallback,
    }
}

impl RawParameters {
    pub fn normalize(&self, config: &AnalysisConfig) -> Parameters {
        let fs = parse_f64_or(&self.sampling_frequency, config.sampling_frequency);
        let has_flag = |name: &str| self.flags.iter().any(|f| f.eq_ignore_ascii_case(name));

        let notch = if self.notch_enabled {
            Some(Notch {
                hz: parse_f64_or(&self.notch_hz, 50.0),
                q: parse_f64_or(&self.notch_q, 30.0),
            })
        } else {
            None
        };

        let filter = FilterSpec {
            family: parse_or(&self.family, FilterFamily::Butterworth),
            response: parse_or(&self.response, Response::Bandpass),
            order: parse_count_or(&self.order, 2).max(1),
            low_hz: parse_f64_or(&self.low_hz, 0.5),
            high_hz: parse_f64_or(&self.high_hz, 5.0),
            rp: parse_f64_or(&self.rp, 1.0),
            rs: parse_f64_or(&self.rs, 40.0),
            notch,
            detrend: has_flag("detrend"),
            invert: has_flag("invert"),
        };

        let hr_source = match self.hr_source.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("red") || s == "1" || s.eq_ignore_ascii_case("first") => {
                HrSource::First
            }
            _ => HrSource::Second,
        };

        let spectrogram = self.show_spectrogram.then(|| SpectrogramSpec {
            window_s: parse_f64_or(&self.spectrogram_window_s, config.spectrogram_window_s),
            overlap: parse_f64_or(&self.spectrogram_overlap, config.spectrogram_overlap),
        });

        Parameters {
            sampling_frequency: fs,
            filter,
            hr_range: (
                parse_f64_or(&self.hr_min, config.hr_range.0),
                parse_f64_or(&self.hr_max, config.hr_range.1),
            ),
            peak_prominence_factor: parse_f64_or(&self.peak_prominence, config.peak_prominence_factor),
            decimation: parse_count_or(&self.decimation, config.decimation).max(1),
            hr_source,
            spectrogram,
        }
    }
}
