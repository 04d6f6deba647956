//! Windowed PPG analytics: reads a row window from a dual-channel CSV file,
//! filters it with a zero-phase IIR chain, detects beats and derives heart
//! rate, ratiometric SpO2, perfusion index and cross-channel relationships.

pub mod analysis;
pub mod config;
pub mod display;
pub mod error;
pub mod log;
pub mod storage;

pub use analysis::{Analysis, Report};
pub use config::{AnalysisConfig, Parameters, RawParameters};
pub use error::{Error, FileAccessError, FilterDesignError};
pub use storage::{Channel, ChannelKind, Window};

/// A scalar that may be undefined for the current window.
///
/// `Unavailable` is never a number: it must be rendered as "n/a" and kept out
/// of further arithmetic. Use [`Estimate::value`] to get at the number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Estimate {
    Value(f64),
    Unavailable,
}

impl Estimate {
    /// Wraps `x`, mapping non-finite values to `Unavailable`.
    pub fn from_finite(x: f64) -> Self {
        if x.is_finite() {
            Estimate::Value(x)
        } else {
            Estimate::Unavailable
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Estimate::Value(x) => Some(x),
            Estimate::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Estimate::Value(_))
    }

    pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
        match self {
            Estimate::Value(x) => Estimate::from_finite(f(x)),
            Estimate::Unavailable => Estimate::Unavailable,
        }
    }
}

impl From<Option<f64>> for Estimate {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Estimate::Unavailable, Estimate::from_finite)
    }
}

impl std::fmt::Display for Estimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Estimate::Value(x) => write!(f, "{:.2}", x),
            Estimate::Unavailable => write!(f, "n/a"),
        }
    }
}
