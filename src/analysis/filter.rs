use std::str::FromStr;

use biquad::{Coefficients, ToHertz, Type};
use ndarray::{Array1, ArrayView1};

use super::design::{design, FilterDesign};
use crate::error::FilterDesignError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFamily {
    Butterworth,
    ChebyshevI,
    ChebyshevII,
    Elliptic,
    Bessel,
}

impl FromStr for FilterFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "butter" | "butterworth" => Ok(FilterFamily::Butterworth),
            "cheby1" | "chebyshev1" | "chebyshev-i" => Ok(FilterFamily::ChebyshevI),
            "cheby2" | "chebyshev2" | "chebyshev-ii" => Ok(FilterFamily::ChebyshevII),
            "ellip" | "elliptic" => Ok(FilterFamily::Elliptic),
            "bessel" => Ok(FilterFamily::Bessel),
            other => Err(format!("unknown filter family `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Lowpass,
    Highpass,
    Bandpass,
    Bandstop,
}

impl FromStr for Response {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lowpass" | "low" => Ok(Response::Lowpass),
            "highpass" | "high" => Ok(Response::Highpass),
            "bandpass" | "band" => Ok(Response::Bandpass),
            "bandstop" | "notch" => Ok(Response::Bandstop),
            other => Err(format!("unknown filter response `{}`", other)),
        }
    }
}

/// Line-frequency notch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Notch {
    pub hz: f64,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub family: FilterFamily,
    pub response: Response,
    pub order: usize,
    pub low_hz: f64,
    pub high_hz: f64,
    pub rp: f64,
    pub rs: f64,
    pub notch: Option<Notch>,
    pub detrend: bool,
    pub invert: bool,
}

/// The designed processing chain for one request:
/// mean removal → zero-phase base filter → zero-phase notch → inversion.
#[derive(Debug, Clone)]
pub struct FilterChain {
    pub base: FilterDesign,
    pub notch: Option<Coefficients<f64>>,
    pub detrend: bool,
    pub invert: bool,
}

impl FilterChain {
    pub fn design(fs: f64, spec: &FilterSpec) -> Result<Self, FilterDesignError> {
        let base = design(
            fs,
            spec.family,
            spec.response,
            spec.low_hz,
            spec.high_hz,
            spec.order,
            spec.rp,
            spec.rs,
        )?;

        let notch = match spec.notch {
            Some(notch) if notch.hz > 0.0 => Some(notch_coefficients(fs, notch)?),
            _ => None,
        };

        Ok(Self {
            base,
            notch,
            detrend: spec.detrend,
            invert: spec.invert,
        })
    }

    pub fn apply(&self, signal: ArrayView1<f64>) -> Array1<f64> {
        let mut y = if self.detrend {
            let mean = signal.mean().unwrap_or(0.0);
            signal.mapv(|a| a - mean)
        } else {
            signal.to_owned()
        };

        y = forward_backward_filter(y.view(), &self.base.sections);

        if let Some(notch) = &self.notch {
            y = forward_backward_filter(y.view(), std::slice::from_ref(notch));
        }

        if self.invert {
            y.mapv_inplace(|a| -a);
        }
        y
    }
}

/// Designs the chain for `spec` and runs `signal` through it.
pub fn apply(signal: ArrayView1<f64>, fs: f64, spec: &FilterSpec) -> Result<Array1<f64>, FilterDesignError> {
    Ok(FilterChain::design(fs, spec)?.apply(signal))
}

/// RBJ notch at `notch.hz`. The centre must lie strictly below Nyquist and Q
/// must be positive and finite.
fn notch_coefficients(fs: f64, notch: Notch) -> Result<Coefficients<f64>, FilterDesignError> {
    let error = |reason: String| FilterDesignError::Notch {
        hz: notch.hz,
        q: notch.q,
        reason,
    };
    if !(notch.q.is_finite() && notch.q > 0.0) {
        return Err(error("quality factor must be positive".to_string()));
    }
    if !notch.hz.is_finite() || notch.hz >= fs / 2.0 {
        return Err(error(format!("centre must lie below Nyquist ({} Hz)", fs / 2.0)));
    }
    Coefficients::<f64>::from_params(Type::Notch, fs.hz(), notch.hz.hz(), notch.q)
        .map_err(|e| error(format!("{:?}", e)))
}

/// Runs the cascade over `data` in place (Direct Form II transposed), starting
/// every section from the given state.
fn run_sections(sections: &[Coefficients<f64>], states: &mut [[f64; 2]], data: &mut [f64]) {
    for (c, s) in sections.iter().zip(states.iter_mut()) {
        for sample in data.iter_mut() {
            let x = *sample;
            let y = c.b0 * x + s[0];
            s[0] = c.b1 * x - c.a1 * y + s[1];
            s[1] = c.b2 * x - c.a2 * y;
            *sample = y;
        }
    }
}

/// Per-section state that a unit step input would settle to.
fn step_response_state(sections: &[Coefficients<f64>]) -> Vec<[f64; 2]> {
    let mut scale = 1.0;
    sections
        .iter()
        .map(|c| {
            let a_sum = 1.0 + c.a1 + c.a2;
            let gain = if a_sum.abs() > f64::EPSILON {
                (c.b0 + c.b1 + c.b2) / a_sum
            } else {
                0.0
            };
            let s1 = c.b2 - c.a2 * gain;
            let s0 = c.b1 - c.a1 * gain + s1;
            let state = [scale * s0, scale * s1];
            scale *= gain;
            state
        })
        .collect()
}

/// Odd extension by `pad` samples at each end (point reflection about the
/// first and last samples).
fn odd_extension(data: ArrayView1<f64>, pad: usize) -> Vec<f64> {
    let n = data.len();
    let (first, last) = (data[0], data[n - 1]);
    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - data[i]));
    ext.extend(data.iter().copied());
    ext.extend((n - 1 - pad..n - 1).rev().map(|i| 2.0 * last - data[i]));
    ext
}

/// Zero-phase filtering: the cascade is run forward, then backward over the
/// reversed output, cancelling the phase delay of each pass.
pub fn forward_backward_filter(data: ArrayView1<f64>, sections: &[Coefficients<f64>]) -> Array1<f64> {
    let n = data.len();
    if n == 0 || sections.is_empty() {
        return data.to_owned();
    }

    let trailing_zeros = sections
        .iter()
        .filter(|c| c.b2 == 0.0)
        .count()
        .min(sections.iter().filter(|c| c.a2 == 0.0).count());
    let taps = 2 * sections.len() + 1 - trailing_zeros;
    let pad = (3 * taps).min(n - 1);

    let zi = step_response_state(sections);
    let mut processed = odd_extension(data, pad);

    // Forward pass
    let mut states: Vec<[f64; 2]> = zi.iter().map(|s| [s[0] * processed[0], s[1] * processed[0]]).collect();
    run_sections(sections, &mut states, &mut processed);

    // Backward pass over the reversed signal, then restore the original order
    processed.reverse();
    let mut states: Vec<[f64; 2]> = zi.iter().map(|s| [s[0] * processed[0], s[1] * processed[0]]).collect();
    run_sections(sections, &mut states, &mut processed);
    processed.reverse();

    Array1::from(processed[pad..pad + n].to_vec())
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use ndarray::Array1;

    use super::*;

    fn spec(response: Response, low: f64, high: f64, order: usize) -> FilterSpec {
        FilterSpec {
            family: FilterFamily::Butterworth,
            response,
            order,
            low_hz: low,
            high_hz: high,
            rp: 1.0,
            rs: 40.0,
            notch: None,
            detrend: false,
            invert: false,
        }
    }

    fn argmax(x: &Array1<f64>) -> usize {
        x.iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn impulse_stays_centred() {
        let centre = 1000;
        let mut impulse = Array1::<f64>::zeros(2 * centre + 1);
        impulse[centre] = 1.0;
        for family in [FilterFamily::Butterworth, FilterFamily::ChebyshevI, FilterFamily::Bessel] {
            for response in [Response::Lowpass, Response::Bandpass] {
                let mut s = spec(response, 0.5, 5.0, 4);
                s.family = family;
                let y = apply(impulse.view(), 100.0, &s).unwrap();
                assert_eq!(y.len(), impulse.len());
                assert_eq!(argmax(&y), centre, "{:?} {:?}", family, response);
                // symmetric about the impulse up to the decayed edge transients
                let tolerance = 1e-3 * y[centre].abs();
                for k in 1..50 {
                    let asymmetry = (y[centre - k] - y[centre + k]).abs();
                    assert!(asymmetry < tolerance, "{:?} {:?} k={}: {}", family, response, k, asymmetry);
                }
            }
        }
    }

    #[test]
    fn sine_in_passband_keeps_phase_and_amplitude() {
        let fs = 100.0;
        let t: Array1<f64> = Array1::from_iter((0..2000).map(|i| i as f64 / fs));
        let x = t.mapv(|t| 500.0 + 20.0 * (2.0 * PI * 1.2 * t).sin());
        let y = apply(x.view(), fs, &spec(Response::Bandpass, 0.5, 5.0, 2)).unwrap();
        // ignore edges, compare against the pure AC component
        for i in 300..1700 {
            let expected = 20.0 * (2.0 * PI * 1.2 * t[i]).sin();
            assert!((y[i] - expected).abs() < 1.5, "sample {}: {} vs {}", i, y[i], expected);
        }
    }

    #[test]
    fn notch_removes_line_frequency() {
        let fs = 500.0;
        let x = Array1::from_iter((0..5000).map(|i| {
            let t = i as f64 / fs;
            (2.0 * PI * 1.0 * t).sin() + (2.0 * PI * 50.0 * t).sin()
        }));
        let mut s = spec(Response::Lowpass, 0.0, 100.0, 2);
        s.notch = Some(Notch { hz: 50.0, q: 30.0 });
        let y = apply(x.view(), fs, &s).unwrap();
        for i in 1000..4000 {
            let expected = (2.0 * PI * 1.0 * i as f64 / fs).sin();
            assert!((y[i] - expected).abs() < 0.1);
        }
    }

    #[test]
    fn detrend_and_invert_are_applied_in_order() {
        let level = Array1::from_elem(200, 7.5);
        let mut s = spec(Response::Lowpass, 0.0, 5.0, 2);
        s.invert = true;
        // unity DC gain, steady-state start: a constant comes out negated
        let inverted = FilterChain::design(100.0, &s).unwrap().apply(level.view());
        assert!(inverted.iter().all(|v| (v + 7.5).abs() < 1e-9));

        s.detrend = true;
        let flat = FilterChain::design(100.0, &s).unwrap().apply(level.view());
        assert!(flat.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn notch_at_or_above_nyquist_is_a_design_error() {
        let mut s = spec(Response::Bandpass, 0.5, 5.0, 2);
        s.notch = Some(Notch { hz: 60.0, q: 30.0 });
        assert!(matches!(
            FilterChain::design(100.0, &s),
            Err(FilterDesignError::Notch { .. })
        ));
        // exactly at Nyquist would put a double pole on the unit circle
        s.notch = Some(Notch { hz: 50.0, q: 30.0 });
        assert!(matches!(
            FilterChain::design(100.0, &s),
            Err(FilterDesignError::Notch { .. })
        ));
        s.notch = Some(Notch { hz: 49.0, q: 30.0 });
        assert!(FilterChain::design(100.0, &s).unwrap().notch.is_some());
        // non-positive notch frequency disables the stage
        s.notch = Some(Notch { hz: 0.0, q: 30.0 });
        assert!(FilterChain::design(100.0, &s).unwrap().notch.is_none());
    }

    #[test]
    fn notch_quality_factor_must_be_positive() {
        let mut s = spec(Response::Bandpass, 0.5, 5.0, 2);
        for q in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            s.notch = Some(Notch { hz: 10.0, q });
            assert!(
                matches!(FilterChain::design(100.0, &s), Err(FilterDesignError::Notch { .. })),
                "q = {}",
                q
            );
        }
        s.notch = Some(Notch { hz: 10.0, q: 5.0 });
        let x = Array1::from_iter((0..500).map(|i| (i as f64 * 0.3).sin()));
        assert!(apply(x.view(), 100.0, &s).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn short_and_empty_signals_are_handled() {
        let s = spec(Response::Bandpass, 0.5, 5.0, 2);
        assert_eq!(apply(Array1::<f64>::zeros(0).view(), 100.0, &s).unwrap().len(), 0);
        assert_eq!(apply(Array1::from(vec![3.0]).view(), 100.0, &s).unwrap().len(), 1);
        assert_eq!(apply(Array1::from(vec![3.0, 4.0, 5.0]).view(), 100.0, &s).unwrap().len(), 3);
    }

    #[test]
    fn family_names_parse() {
        assert_eq!("cheby1".parse::<FilterFamily>(), Ok(FilterFamily::ChebyshevI));
        assert_eq!(" Bessel ".parse::<FilterFamily>(), Ok(FilterFamily::Bessel));
        assert!("fir".parse::<FilterFamily>().is_err());
        assert_eq!("bandstop".parse::<Response>(), Ok(Response::Bandstop));
    }
}
