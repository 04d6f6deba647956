//! Point-count limiting for anything handed to a renderer.

use ndarray::{s, Array1, ArrayView1};

/// Decimation factor for an `n`-sample trace so that `trace_count` traces
/// together stay within `point_cap` points. Never lower than `requested`.
pub fn decimate_factor(n: usize, requested: usize, trace_count: usize, point_cap: usize) -> usize {
    let budget = (point_cap / trace_count.max(1)).max(1);
    let factor = requested.max(1);
    if n.div_ceil(factor) > budget {
        n.div_ceil(budget).max(factor)
    } else {
        factor
    }
}

/// Every `factor`-th sample, starting with the first.
pub fn decimate(x: ArrayView1<f64>, factor: usize) -> Array1<f64> {
    x.slice(s![..;factor.max(1)]).to_owned()
}

/// A trace ready for plotting: time axis and values of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub times: Array1<f64>,
    pub values: Array1<f64>,
}

impl Trace {
    /// Decimated copy of `values` sampled at `fs`, with times offset by `t0`.
    pub fn sampled(values: ArrayView1<f64>, fs: f64, t0: f64, factor: usize) -> Self {
        let factor = factor.max(1);
        let values = decimate(values, factor);
        let times = Array1::from_iter((0..values.len()).map(|i| t0 + (i * factor) as f64 / fs));
        Self { times, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
