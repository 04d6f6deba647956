//! IIR filter design in cascaded second-order-section form.
//!
//! Analog low-pass prototype (zeros, poles, gain) → frequency transformation
//! to the requested response → bilinear transform → pole/zero pairing into
//! biquad sections. Sections are never multiplied out into one high-order
//! transfer function.

use std::cmp::Ordering;
use std::f64::consts::PI;

use biquad::Coefficients;
use num_complex::Complex64;

use super::filter::{FilterFamily, Response};
use crate::error::FilterDesignError;

pub const MAX_ORDER: usize = 24;

const MIN_CUTOFF_HZ: f64 = 1e-6;
const NYQUIST_MARGIN: f64 = 0.999;
/// Sampling rate of the normalized bilinear transform (cutoffs are expressed
/// relative to Nyquist before warping).
const BILINEAR_FS: f64 = 2.0;

/// Cutoff frequencies actually used by a design, after clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cutoff {
    Single(f64),
    Band(f64, f64),
}

impl Cutoff {
    pub fn highest(&self) -> f64 {
        match *self {
            Cutoff::Single(f) => f,
            Cutoff::Band(_, hi) => hi,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterDesign {
    pub sections: Vec<Coefficients<f64>>,
    pub cutoff: Cutoff,
}

#[derive(Debug, Clone)]
struct Zpk {
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
}

impl Zpk {
    fn degree(&self) -> usize {
        self.poles.len().saturating_sub(self.zeros.len())
    }
}

fn product(values: &[Complex64]) -> Complex64 {
    values.iter().fold(Complex64::new(1.0, 0.0), |acc, &v| acc * v)
}

fn negated_product(values: &[Complex64]) -> Complex64 {
    values.iter().fold(Complex64::new(1.0, 0.0), |acc, &v| acc * -v)
}

/// Clamps the requested cutoffs into (1e-6, 0.999·Nyquist). Low-pass uses the
/// high cutoff, high-pass the low one; band responses sort the pair and keep
/// at least 1e-6 Hz between the edges.
pub fn effective_cutoff(fs: f64, response: Response, low_hz: f64, high_hz: f64) -> Cutoff {
    let nyq = fs / 2.0;
    let ceiling = nyq * NYQUIST_MARGIN;
    let low = low_hz.max(MIN_CUTOFF_HZ);
    let high = high_hz.max(MIN_CUTOFF_HZ);

    match response {
        Response::Lowpass => Cutoff::Single(high.min(ceiling)),
        Response::Highpass => Cutoff::Single(low.min(ceiling)),
        Response::Bandpass | Response::Bandstop => {
            let (lo, hi) = if low <= high { (low, high) } else { (high, low) };
            let mut hi = hi.min(ceiling);
            let lo = lo.min(hi - MIN_CUTOFF_HZ).max(MIN_CUTOFF_HZ);
            if hi - lo < MIN_CUTOFF_HZ {
                hi = (lo + MIN_CUTOFF_HZ).min(ceiling);
            }
            Cutoff::Band(lo, hi)
        }
    }
}

/// Designs a digital IIR filter.
///
/// `rp` (passband ripple, dB) is used by Chebyshev-I and Elliptic, `rs`
/// (stopband attenuation, dB) by Chebyshev-II and Elliptic; both are ignored
/// for Butterworth and Bessel.
#[allow(clippy::too_many_arguments)]
pub fn design(
    fs: f64,
    family: FilterFamily,
    response: Response,
    low_hz: f64,
    high_hz: f64,
    order: usize,
    rp: f64,
    rs: f64,
) -> Result<FilterDesign, FilterDesignError> {
    if !(fs.is_finite() && fs > 0.0) || fs / 2.0 * NYQUIST_MARGIN <= 2.0 * MIN_CUTOFF_HZ {
        return Err(FilterDesignError::SamplingRate(fs));
    }
    if order == 0 || order > MAX_ORDER {
        return Err(FilterDesignError::Order { order, max: MAX_ORDER });
    }

    let prototype = match family {
        FilterFamily::Butterworth => butterworth(order),
        FilterFamily::ChebyshevI => chebyshev1(order, rp)?,
        FilterFamily::ChebyshevII => chebyshev2(order, rs)?,
        FilterFamily::Elliptic => elliptic(order, rp, rs)?,
        FilterFamily::Bessel => bessel(order),
    };

    let cutoff = effective_cutoff(fs, response, low_hz, high_hz);
    let warp = |hz: f64| 2.0 * BILINEAR_FS * (PI * (hz / (fs / 2.0)) / BILINEAR_FS).tan();

    let analog = match cutoff {
        Cutoff::Single(f) if response == Response::Highpass => {
            lowpass_to_highpass(prototype, warp(f))
        }
        Cutoff::Single(f) => lowpass_to_lowpass(prototype, warp(f)),
        Cutoff::Band(lo, hi) => {
            let (w1, w2) = (warp(lo), warp(hi));
            if response == Response::Bandstop {
                lowpass_to_bandstop(prototype, (w1 * w2).sqrt(), w2 - w1)
            } else {
                lowpass_to_bandpass(prototype, (w1 * w2).sqrt(), w2 - w1)
            }
        }
    };

    let digital = bilinear(analog, BILINEAR_FS);
    Ok(FilterDesign {
        sections: zpk_to_sections(&digital),
        cutoff,
    })
}

// Analog prototypes, passband edge (or -3 dB point) at 1 rad/s

/// Odd-symmetric index set -n+1, -n+3, ..., n-1.
fn symmetric_indices(n: usize) -> impl Iterator<Item = f64> {
    (0..n).map(move |i| -(n as f64) + 1.0 + 2.0 * i as f64)
}

fn butterworth(n: usize) -> Zpk {
    let poles = symmetric_indices(n)
        .map(|m| -Complex64::from_polar(1.0, PI * m / (2.0 * n as f64)))
        .collect();
    Zpk { zeros: Vec::new(), poles, gain: 1.0 }
}

fn ripple_epsilon(db: f64, what: &str) -> Result<f64, FilterDesignError> {
    if !(db.is_finite() && db > 0.0) {
        return Err(FilterDesignError::Ripple(format!("{} must be positive, got {}", what, db)));
    }
    Ok((10f64.powf(0.1 * db) - 1.0).sqrt())
}

fn chebyshev1(n: usize, rp: f64) -> Result<Zpk, FilterDesignError> {
    let eps = ripple_epsilon(rp, "rp")?;
    let mu = (1.0 / eps).asinh() / n as f64;

    let poles: Vec<Complex64> = symmetric_indices(n)
        .map(|m| -Complex64::new(mu, PI * m / (2.0 * n as f64)).sinh())
        .collect();
    let mut gain = negated_product(&poles).re;
    if n % 2 == 0 {
        gain /= (1.0 + eps * eps).sqrt();
    }
    Ok(Zpk { zeros: Vec::new(), poles, gain })
}

fn chebyshev2(n: usize, rs: f64) -> Result<Zpk, FilterDesignError> {
    let de = 1.0 / ripple_epsilon(rs, "rs")?;
    let mu = (1.0 / de).asinh() / n as f64;
    let nf = n as f64;

    let zeros: Vec<Complex64> = symmetric_indices(n)
        .filter(|m| *m != 0.0)
        .map(|m| Complex64::new(0.0, 1.0 / (m * PI / (2.0 * nf)).sin()))
        .collect();

    let poles: Vec<Complex64> = symmetric_indices(n)
        .map(|m| {
            let p = -Complex64::from_polar(1.0, PI * m / (2.0 * nf));
            let p = Complex64::new(mu.sinh() * p.re, mu.cosh() * p.im);
            1.0 / p
        })
        .collect();

    let gain = (negated_product(&poles) / negated_product(&zeros)).re;
    Ok(Zpk { zeros, poles, gain })
}

/// Descending Landen sequence of an elliptic modulus, carried together with
/// the complementary modulus so moduli close to one keep full precision.
struct Landen {
    k: f64,
    moduli: Vec<f64>,
}

impl Landen {
    fn new(k: f64, k_comp: f64) -> Self {
        let mut moduli = Vec::new();
        let (mut kn, mut kn_comp) = (k, k_comp);
        while kn > 1e-15 && moduli.len() < 32 {
            let next = if kn < 0.5 {
                (kn / (1.0 + kn_comp)).powi(2)
            } else {
                (1.0 - kn_comp) / (1.0 + kn_comp)
            };
            kn_comp = 2.0 * kn_comp.sqrt() / (1.0 + kn_comp);
            kn = next;
            moduli.push(kn);
        }
        Self { k, moduli }
    }

    fn ascend(&self, mut w: Complex64) -> Complex64 {
        for &v in self.moduli.iter().rev() {
            w = (1.0 + v) * w / (1.0 + v * w * w);
        }
        w
    }

    /// Jacobi `cd` with argument in units of the quarter period.
    fn cde(&self, u: Complex64) -> Complex64 {
        self.ascend((u * PI / 2.0).cos())
    }

    /// Jacobi `sn` with argument in units of the quarter period.
    fn sne(&self, u: Complex64) -> Complex64 {
        self.ascend((u * PI / 2.0).sin())
    }

    fn acde(&self, mut w: Complex64) -> Complex64 {
        let mut previous = self.k;
        for &v in &self.moduli {
            w = w / (1.0 + (1.0 - w * w * previous * previous).sqrt()) * 2.0 / (1.0 + v);
            previous = v;
        }
        w.acos() * 2.0 / PI
    }

    fn asne(&self, w: Complex64) -> Complex64 {
        1.0 - self.acde(w)
    }
}

fn elliptic(n: usize, rp: f64, rs: f64) -> Result<Zpk, FilterDesignError> {
    let ep = ripple_epsilon(rp, "rp")?;
    let es = ripple_epsilon(rs, "rs")?;
    if es <= ep {
        return Err(FilterDesignError::Ripple(format!(
            "rs ({} dB) must exceed rp ({} dB)",
            rs, rp
        )));
    }

    let nf = n as f64;
    let half = n / 2;
    let j = Complex64::new(0.0, 1.0);
    let fractions: Vec<f64> = (1..=half).map(|i| (2 * i - 1) as f64 / nf).collect();

    // Discrimination modulus k1 and the selectivity k solving the degree
    // equation for this order.
    let k1 = ep / es;
    let k1_comp = ((1.0 - k1) * (1.0 + k1)).sqrt();
    let comp_landen = Landen::new(k1_comp, k1);
    let sn_product: f64 = fractions
        .iter()
        .map(|&u| comp_landen.sne(Complex64::new(u, 0.0)).re)
        .product();
    let k_comp = k1_comp.powi(n as i32) * sn_product.powi(4);
    let k = ((1.0 - k_comp) * (1.0 + k_comp)).sqrt();
    let landen = Landen::new(k, k_comp);

    let v0 = -j * Landen::new(k1, k1_comp).asne(j / ep) / nf;

    let mut zeros = Vec::with_capacity(2 * half);
    let mut poles = Vec::with_capacity(n);
    for &u in &fractions {
        let zeta = landen.cde(Complex64::new(u, 0.0));
        let zero = j / (k * zeta);
        zeros.push(zero);
        zeros.push(zero.conj());

        let pole = j * landen.cde(u - j * v0);
        poles.push(pole);
        poles.push(pole.conj());
    }
    if n % 2 == 1 {
        let pole = j * landen.sne(j * v0);
        poles.push(Complex64::new(pole.re, 0.0));
    }

    let dc_gain = if n % 2 == 1 { 1.0 } else { 1.0 / (1.0 + ep * ep).sqrt() };
    let gain = dc_gain * (negated_product(&poles) / negated_product(&zeros)).re;
    Ok(Zpk { zeros, poles, gain })
}

/// Bessel prototype normalized so the phase response reaches -n·π/4 at
/// 1 rad/s. Poles are the roots of the reverse Bessel polynomial scaled by
/// the n-th root of its constant term.
fn bessel(n: usize) -> Zpk {
    // a[k] = (2n-k)! / (2^(n-k) k! (n-k)!), built downward from a[n] = 1
    let mut coeffs = vec![0.0; n + 1];
    coeffs[n] = 1.0;
    for k in (0..n).rev() {
        coeffs[k] = coeffs[k + 1] * ((2 * n - k) * (k + 1)) as f64 / (2 * (n - k)) as f64;
    }
    let scale = coeffs[0].powf(1.0 / n as f64);
    let scaled: Vec<f64> = coeffs
        .iter()
        .enumerate()
        .map(|(k, c)| c / scale.powi((n - k) as i32))
        .collect();

    let poles = polynomial_roots(&scaled);
    let gain = negated_product(&poles).re;
    Zpk { zeros: Vec::new(), poles, gain }
}

/// Durand–Kerner iteration for the roots of a monic polynomial given in
/// ascending coefficient order.
fn polynomial_roots(coeffs: &[f64]) -> Vec<Complex64> {
    let n = coeffs.len() - 1;
    let eval = |x: Complex64| {
        coeffs
            .iter()
            .rev()
            .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * x + c)
    };

    let mut roots: Vec<Complex64> = (0..n)
        .map(|i| Complex64::from_polar(1.0, 2.0 * PI * i as f64 / n as f64 + 0.4))
        .collect();

    for _ in 0..1000 {
        let mut max_step: f64 = 0.0;
        for i in 0..n {
            let denom = roots
                .iter()
                .enumerate()
                .filter(|(m, _)| *m != i)
                .fold(Complex64::new(1.0, 0.0), |acc, (_, r)| acc * (roots[i] - r));
            if denom.norm() == 0.0 {
                continue;
            }
            let step = eval(roots[i]) / denom;
            roots[i] -= step;
            max_step = max_step.max(step.norm());
        }
        if max_step < 1e-14 {
            break;
        }
    }

    for r in roots.iter_mut() {
        if r.im.abs() < 1e-10 * r.norm().max(1.0) {
            r.im = 0.0;
        }
    }
    roots
}

fn lowpass_to_lowpass(proto: Zpk, wo: f64) -> Zpk {
    let degree = proto.degree();
    Zpk {
        zeros: proto.zeros.iter().map(|&z| z * wo).collect(),
        poles: proto.poles.iter().map(|&p| p * wo).collect(),
        gain: proto.gain * wo.powi(degree as i32),
    }
}

fn lowpass_to_highpass(proto: Zpk, wo: f64) -> Zpk {
    let degree = proto.degree();
    let mut zeros: Vec<Complex64> = proto.zeros.iter().map(|&z| wo / z).collect();
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        poles: proto.poles.iter().map(|&p| wo / p).collect(),
        gain: proto.gain * (negated_product(&proto.zeros) / negated_product(&proto.poles)).re,
        zeros,
    }
}

/// Maps each low-pass root to the two band roots `r·bw/2 ± sqrt((r·bw/2)² - wo²)`.
fn split_band(roots: &[Complex64], scale: impl Fn(Complex64) -> Complex64, wo: f64) -> Vec<Complex64> {
    let scaled: Vec<Complex64> = roots.iter().map(|&r| scale(r)).collect();
    let plus = scaled.iter().map(|&r| r + (r * r - wo * wo).sqrt());
    let minus = scaled.iter().map(|&r| r - (r * r - wo * wo).sqrt());
    plus.chain(minus).collect()
}

fn lowpass_to_bandpass(proto: Zpk, wo: f64, bw: f64) -> Zpk {
    let degree = proto.degree();
    let mut zeros = split_band(&proto.zeros, |z| z * bw / 2.0, wo);
    zeros.extend(std::iter::repeat(Complex64::new(0.0, 0.0)).take(degree));
    Zpk {
        zeros,
        poles: split_band(&proto.poles, |p| p * bw / 2.0, wo),
        gain: proto.gain * bw.powi(degree as i32),
    }
}

fn lowpass_to_bandstop(proto: Zpk, wo: f64, bw: f64) -> Zpk {
    let degree = proto.degree();
    // Prototype zeros split into band pairs; the excess degree lands on the
    // stopband centre.
    let mut zeros = split_band(&proto.zeros, |z| (bw / 2.0) / z, wo);
    zeros.extend(std::iter::repeat(Complex64::new(0.0, wo)).take(degree));
    zeros.extend(std::iter::repeat(Complex64::new(0.0, -wo)).take(degree));
    Zpk {
        zeros,
        poles: split_band(&proto.poles, |p| (bw / 2.0) / p, wo),
        gain: proto.gain * (negated_product(&proto.zeros) / negated_product(&proto.poles)).re,
    }
}

fn bilinear(analog: Zpk, fs: f64) -> Zpk {
    let fs2 = 2.0 * fs;
    let degree = analog.degree();
    let map = |&r: &Complex64| (fs2 + r) / (fs2 - r);

    let mut zeros: Vec<Complex64> = analog.zeros.iter().map(map).collect();
    zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(degree));
    let zero_terms: Vec<Complex64> = analog.zeros.iter().map(|&z| fs2 - z).collect();
    let pole_terms: Vec<Complex64> = analog.poles.iter().map(|&p| fs2 - p).collect();

    Zpk {
        zeros,
        poles: analog.poles.iter().map(map).collect(),
        gain: analog.gain * (product(&zero_terms) / product(&pole_terms)).re,
    }
}

/// A group of roots forming one real-coefficient quadratic (or linear) factor.
#[derive(Debug, Clone, Copy)]
enum RootGroup {
    Conjugate(Complex64),
    Real(f64, Option<f64>),
}

impl RootGroup {
    /// Ascending polynomial `[1, c1, c2]` in z^-1.
    fn polynomial(&self) -> [f64; 3] {
        match *self {
            RootGroup::Conjugate(c) => [1.0, -2.0 * c.re, c.norm_sqr()],
            RootGroup::Real(r1, Some(r2)) => [1.0, -(r1 + r2), r1 * r2],
            RootGroup::Real(r, None) => [1.0, -r, 0.0],
        }
    }

    fn representative(&self) -> Complex64 {
        match *self {
            RootGroup::Conjugate(c) => c,
            RootGroup::Real(r1, Some(r2)) if r2.abs() > r1.abs() => Complex64::new(r2, 0.0),
            RootGroup::Real(r1, _) => Complex64::new(r1, 0.0),
        }
    }

    fn distance_to(&self, target: Complex64) -> f64 {
        match *self {
            RootGroup::Conjugate(c) => (c - target).norm().min((c.conj() - target).norm()),
            RootGroup::Real(r1, r2) => {
                let d1 = (Complex64::new(r1, 0.0) - target).norm();
                r2.map_or(d1, |r2| d1.min((Complex64::new(r2, 0.0) - target).norm()))
            }
        }
    }
}

fn group_roots(roots: &[Complex64]) -> Vec<RootGroup> {
    let tolerance = |r: &Complex64| 1e-9 * r.norm().max(1.0);
    let mut groups: Vec<RootGroup> = roots
        .iter()
        .filter(|r| r.im > tolerance(*r))
        .map(|&r| RootGroup::Conjugate(r))
        .collect();

    let mut reals: Vec<f64> = roots
        .iter()
        .filter(|r| r.im.abs() <= tolerance(*r))
        .map(|r| r.re)
        .collect();
    reals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    groups.extend(reals.chunks(2).map(|pair| RootGroup::Real(pair[0], pair.get(1).copied())));
    groups
}

fn zpk_to_sections(digital: &Zpk) -> Vec<Coefficients<f64>> {
    let mut pole_groups = group_roots(&digital.poles);
    let mut zero_groups = group_roots(&digital.zeros);

    // Poles closest to the unit circle pick their zeros first.
    pole_groups.sort_by(|a, b| {
        let da = 1.0 - a.representative().norm();
        let db = 1.0 - b.representative().norm();
        da.abs().partial_cmp(&db.abs()).unwrap_or(Ordering::Equal)
    });

    let mut sections = Vec::with_capacity(pole_groups.len().max(zero_groups.len()));
    for poles in &pole_groups {
        let target = poles.representative();
        let nearest = zero_groups
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                a.distance_to(target)
                    .partial_cmp(&b.distance_to(target))
                    .unwrap_or(Ordering::Equal)
            })
            .map(|(i, _)| i);
        let numerator = match nearest {
            Some(i) => zero_groups.remove(i).polynomial(),
            None => [1.0, 0.0, 0.0],
        };
        sections.push((numerator, poles.polynomial()));
    }
    for zeros in zero_groups {
        sections.push((zeros.polynomial(), [1.0, 0.0, 0.0]));
    }

    sections
        .into_iter()
        .enumerate()
        .map(|(i, (b, a))| {
            let g = if i == 0 { digital.gain } else { 1.0 };
            Coefficients {
                b0: g * b[0],
                b1: g * b[1],
                b2: g * b[2],
                a1: a[1],
                a2: a[2],
            }
        })
        .collect()
}
