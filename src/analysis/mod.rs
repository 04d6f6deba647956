use ndarray::{Array1, ArrayView1};
use slog::{debug, warn, Logger};

use crate::config::{AnalysisConfig, HrSource, Parameters};
use crate::display::{decimate_factor, Trace};
use crate::log::silent_logger;
use crate::storage::{Channel, ChannelKind, Window};
use crate::Estimate;

pub mod cross;
pub mod design;
pub mod filter;
pub mod hrv;
pub mod ppg;
pub mod ratio;
pub mod spectral;


use cross::{average_beat, cross_correlation, paired_scatter, AverageBeat, CrossCorrelation};
use design::Cutoff;
use filter::FilterChain;
use hrv::{ibi_histogram, poincare, quick_snr, second_derivative, Histogram};
use ppg::{detect, BeatTrend};
use ratio::{absorbance, beat_ratio_series, window_estimate, BeatRatioSeries, RatioEstimate};
use spectral::{coherence, rate, spectrogram, welch, Spectrogram, Spectrum};

/// Decimated traces for rendering; every trace shares `factor`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayTraces {
    pub factor: usize,
    pub raw: Vec<Trace>,
    pub ac: Vec<Trace>,
    pub sdppg: Vec<Trace>,
}

/// Everything derived from one window under one parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub raw: [Channel; 2],
    pub ac: [Channel; 2],
    /// Set when the filter could not be designed; `ac` is all zeros then.
    pub filter_error: Option<String>,
    pub cutoff: Option<Cutoff>,
    pub filled_rows: usize,

    pub window_ratio: RatioEstimate,
    pub hr_psd: Estimate,
    pub rr_psd: Estimate,
    pub hr_mean: Estimate,
    pub snr: [Estimate; 2],
    pub dc_mean: [Estimate; 2],

    pub hr_source: HrSource,
    pub trend: BeatTrend,
    pub beat_ratio: BeatRatioSeries,

    pub coherence: Spectrum,
    pub coherence_at_hr: Estimate,
    pub cross_correlation: Option<CrossCorrelation>,
    pub average_beats: [AverageBeat; 2],
    pub scatter: (Array1<f64>, Array1<f64>),

    pub psd: [Spectrum; 2],
    pub spectrogram: Option<Spectrogram>,
    pub ibi_histogram: Histogram,
    pub poincare: Vec<(f64, f64)>,
    pub sdppg: [Array1<f64>; 2],
    pub absorbance: [Array1<f64>; 2],

    pub display: DisplayTraces,
}

pub struct Analysis {
    pub config: AnalysisConfig,
    logger: Logger,
}

impl Analysis {
    pub fn new(config: AnalysisConfig) -> Self {
        Self::with_logger(config, silent_logger())
    }

    pub fn with_logger(config: AnalysisConfig, logger: Logger) -> Self {
        Self { config, logger }
    }

    fn raw_channels(&self, window: &Window, fs: f64) -> [Channel; 2] {
        let column = |i: usize| {
            let name = window.columns.get(i).cloned().unwrap_or_default();
            let samples = window.samples.get(i).cloned().unwrap_or_else(|| Array1::zeros(0));
            Channel::new(name, ChannelKind::Raw, fs, samples)
        };
        let (first, second) = (column(0), column(1));
        // both channels come from the same rows
        let n = first.len().min(second.len());
        [truncate(first, n), truncate(second, n)]
    }

    fn filter(&self, raw: &[Channel; 2], params: &Parameters) -> ([Channel; 2], Option<Cutoff>, Option<String>) {
        match FilterChain::design(params.sampling_frequency, &params.filter) {
            Ok(chain) => {
                debug!(self.logger, "Filter designed";
                    "family" => ?params.filter.family,
                    "response" => ?params.filter.response,
                    "sections" => chain.base.sections.len());
                let ac = [
                    raw[0].with_ac(chain.apply(raw[0].view())),
                    raw[1].with_ac(chain.apply(raw[1].view())),
                ];
                (ac, Some(chain.base.cutoff), None)
            }
            Err(e) => {
                warn!(self.logger, "Filter design failed, AC channels zeroed"; "error" => %e);
                let ac = [
                    raw[0].with_ac(Array1::zeros(raw[0].len())),
                    raw[1].with_ac(Array1::zeros(raw[1].len())),
                ];
                (ac, None, Some(e.to_string()))
            }
        }
    }

    pub fn analyze(&self, window: &Window, params: &Parameters) -> Report {
        let config = &self.config;
        let fs = params.sampling_frequency;
        let (hr_min, hr_max) = params.hr_range;

        let raw = self.raw_channels(window, fs);
        let (ac, cutoff, filter_error) = self.filter(&raw, params);
        let n = raw[0].len();
        debug!(self.logger, "Analyzing window";
            "start" => window.start_row,
            "samples" => n,
            "fs" => fs);

        let window_ratio = window_estimate(
            raw[0].view(),
            raw[1].view(),
            ac[0].view(),
            ac[1].view(),
            config.spo2_curve.as_ref(),
        );

        let source = match params.hr_source {
            HrSource::First => &ac[0],
            HrSource::Second => &ac[1],
        };
        let trend = detect(source.view(), fs, hr_min, hr_max, params.peak_prominence_factor);
        let second_trend = match params.hr_source {
            HrSource::Second => trend.clone(),
            HrSource::First => detect(ac[1].view(), fs, hr_min, hr_max, params.peak_prominence_factor),
        };
        debug!(self.logger, "Beats detected";
            "peaks" => trend.peaks.len(),
            "hr_values" => trend.hr_values.len());

        let beat_ratio = beat_ratio_series(
            raw[0].view(),
            raw[1].view(),
            ac[0].view(),
            ac[1].view(),
            &second_trend.peak_indices(),
            fs,
            config.beat_guard_fraction,
            config.dc_window_s,
            config.spo2_curve.as_ref(),
        );

        // spectral rates and the spectrogram always come from the infrared channel
        let reference = &ac[1];
        let hr_psd = rate(reference.view(), fs, config.hr_band_hz, config.spectral_segment_cap);
        let rr_psd = rate(reference.view(), fs, config.rr_band_hz, config.spectral_segment_cap);

        let coherence = coherence(ac[0].view(), ac[1].view(), fs, config.spectral_segment_cap);
        let coherence_at_hr = match hr_psd {
            Estimate::Value(bpm) if !coherence.is_empty() => coherence.value_at(bpm / 60.0),
            _ => Estimate::Unavailable,
        };

        let peaks = trend.peak_indices();
        let average_beats = [
            average_beat(ac[0].view(), &peaks, fs, config.avg_beat_width_s, config.avg_beat_points),
            average_beat(ac[1].view(), &peaks, fs, config.avg_beat_width_s, config.avg_beat_points),
        ];

        let spectrogram = params
            .spectrogram
            .and_then(|spec| spectrogram(reference.view(), fs, spec.window_s, spec.overlap));

        let sdppg = [second_derivative(ac[0].view()), second_derivative(ac[1].view())];
        let display = self.display_traces(window, &raw, &ac, &sdppg, params);

        Report {
            filter_error,
            cutoff,
            filled_rows: window.filled_rows,
            window_ratio,
            hr_psd,
            rr_psd,
            hr_mean: trend.mean_hr().into(),
            snr: [quick_snr(ac[0].view()), quick_snr(ac[1].view())],
            dc_mean: [mean(raw[0].view()), mean(raw[1].view())],
            hr_source: params.hr_source,
            beat_ratio,
            coherence,
            coherence_at_hr,
            cross_correlation: cross_correlation(ac[0].view(), ac[1].view(), fs, config.xcorr_max_lag_s),
            average_beats,
            scatter: paired_scatter(ac[0].view(), ac[1].view(), config.scatter_points),
            psd: [
                welch(ac[0].view(), fs, config.psd_segment_cap),
                welch(ac[1].view(), fs, config.psd_segment_cap),
            ],
            spectrogram,
            ibi_histogram: ibi_histogram(&trend.ibis, config.ibi_histogram_bins),
            poincare: poincare(&trend.ibis),
            absorbance: [absorbance(raw[0].view()), absorbance(raw[1].view())],
            trend,
            sdppg,
            display,
            raw,
            ac,
        }
    }

    fn display_traces(
        &self,
        window: &Window,
        raw: &[Channel; 2],
        ac: &[Channel; 2],
        sdppg: &[Array1<f64>; 2],
        params: &Parameters,
    ) -> DisplayTraces {
        let fs = params.sampling_frequency;
        let factor = decimate_factor(
            raw[0].len(),
            params.decimation,
            self.config.display_traces,
            self.config.max_display_points,
        );
        let t0 = window.start_row as f64 / fs;
        let trace = |values: ArrayView1<f64>| Trace::sampled(values, fs, t0, factor);

        DisplayTraces {
            factor,
            raw: raw.iter().map(|c| trace(c.view())).collect(),
            ac: ac.iter().map(|c| trace(c.view())).collect(),
            sdppg: sdppg.iter().map(|s| trace(s.view())).collect(),
        }
    }
}

fn truncate(channel: Channel, n: usize) -> Channel {
    if channel.len() == n {
        channel
    } else {
        let samples = channel.samples.slice(ndarray::s![..n]).to_owned();
        Channel { samples, ..channel }
    }
}

fn mean(x: ArrayView1<f64>) -> Estimate {
    x.mean().into()
}
