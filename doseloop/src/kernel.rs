// src/kernel.rs
//
// Absorption kernels: normalised response curves K(Δt) describing how much
// effect one unit of a dose produces Δt minutes after administration.
//
// A kernel is a plain value (onset + list of components) evaluated by a pure
// function, so every dose event of a class shares the same descriptor and
// superposition reduces to adding scaled evaluations.
//
// Families:
// - Gamma mixtures (unit mass when weights sum to 1). Drug absorption through
//   a chain of first-order compartments is well approximated by a gamma pdf;
//   two components model fast and slow pools.
// - Triangular (unit peak), the simpler linear ramp-up / ramp-down shape.

use serde::{Deserialize, Serialize};

/// Natural log of the gamma function (Lanczos approximation, g = 7).
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        // Reflection formula
        let pi = std::f64::consts::PI;
        pi.ln() - (pi * x).sin().ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        for (i, &coeff) in COEFFS.iter().enumerate().skip(1) {
            a += coeff / (x + i as f64);
        }
        let t = x + 7.5;
        let sqrt_2pi = (2.0 * std::f64::consts::PI).sqrt();
        (sqrt_2pi * a).ln() + (x + 0.5) * t.ln() - t
    }
}

/// One weighted gamma pdf (shape k, scale θ in minutes).
///
/// Peak of a single component sits at `(k - 1) * θ`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaComponent {
    pub weight: f64,
    pub shape: f64,
    pub scale: f64,
}

impl GammaComponent {
    pub fn new(weight: f64, shape: f64, scale: f64) -> Self {
        Self {
            weight,
            shape,
            scale,
        }
    }

    /// Unweighted gamma pdf at `t` minutes.
    pub fn pdf(&self, t: f64) -> f64 {
        if t.is_nan() || t <= 0.0 || self.shape <= 0.0 || self.scale <= 0.0 {
            return 0.0;
        }
        let k = self.shape;
        let theta = self.scale;
        let log_pdf = (k - 1.0) * t.ln() - t / theta - ln_gamma(k) - k * theta.ln();
        log_pdf.exp()
    }

    fn eval(&self, t: f64) -> f64 {
        self.weight * self.pdf(t)
    }
}

/// Piecewise-linear ramp: 0 at `onset`, `weight` at `peak`, 0 at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriangularComponent {
    pub weight: f64,
    pub onset: f64,
    pub peak: f64,
    pub end: f64,
}

impl TriangularComponent {
    pub fn new(weight: f64, onset: f64, peak: f64, end: f64) -> Self {
        Self {
            weight,
            onset,
            peak,
            end,
        }
    }

    fn eval(&self, t: f64) -> f64 {
        if t < self.onset || t > self.end {
            return 0.0;
        }
        let shape = if t <= self.peak {
            let rise = self.peak - self.onset;
            if rise <= 0.0 {
                1.0
            } else {
                (t - self.onset) / rise
            }
        } else {
            let fall = self.end - self.peak;
            if fall <= 0.0 {
                0.0
            } else {
                (self.end - t) / fall
            }
        };
        self.weight * shape.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelComponent {
    Gamma(GammaComponent),
    Triangular(TriangularComponent),
}

impl KernelComponent {
    fn eval(&self, t: f64) -> f64 {
        match self {
            KernelComponent::Gamma(g) => g.eval(t),
            KernelComponent::Triangular(tri) => tri.eval(t),
        }
    }
}

/// Absorption kernel descriptor.
///
/// `eval(dt)` is exactly zero for `dt < onset` (no response before onset),
/// and a non-negative sum of components otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorptionKernel {
    /// Delay (minutes) before any component starts.
    #[serde(default)]
    pub onset: f64,
    pub components: Vec<KernelComponent>,
}

impl AbsorptionKernel {
    pub fn new(onset: f64, components: Vec<KernelComponent>) -> Self {
        Self { onset, components }
    }

    /// Two-pool subcutaneous insulin: peaks a little after 3 hours and
    /// decays over the following several hours.
    pub fn insulin() -> Self {
        Self::new(
            0.0,
            vec![
                KernelComponent::Gamma(GammaComponent::new(0.35, 4.0, 50.0)),
                KernelComponent::Gamma(GammaComponent::new(0.65, 5.0, 60.0)),
            ],
        )
    }

    /// Two-pool digestion: peaks between one and two hours, mostly resolved
    /// within five.
    pub fn food() -> Self {
        Self::new(
            0.0,
            vec![
                KernelComponent::Gamma(GammaComponent::new(0.6, 7.0, 12.0)),
                KernelComponent::Gamma(GammaComponent::new(0.4, 4.0, 30.0)),
            ],
        )
    }

    /// Single triangle with unit peak.
    pub fn triangular(onset: f64, peak: f64, end: f64) -> Self {
        Self::new(
            0.0,
            vec![KernelComponent::Triangular(TriangularComponent::new(
                1.0, onset, peak, end,
            ))],
        )
    }

    /// Effect of one unit `dt` minutes after administration.
    pub fn eval(&self, dt: f64) -> f64 {
        if dt.is_nan() || dt < self.onset {
            return 0.0;
        }
        let local = dt - self.onset;
        self.components
            .iter()
            .map(|c| c.eval(local))
            .sum::<f64>()
            .max(0.0)
    }

    /// Integer-minute convenience wrapper around [`eval`](Self::eval).
    pub fn at(&self, dt_minutes: i64) -> f64 {
        self.eval(dt_minutes as f64)
    }

    /// Precomputed curve `[K(0), K(1), ..., K(len - 1)]`.
    pub fn table(&self, len: usize) -> Vec<f64> {
        (0..len).map(|i| self.eval(i as f64)).collect()
    }

    /// Minute offset of the maximum within `[0, max_minutes)` (first on ties).
    pub fn peak_offset(&self, max_minutes: usize) -> usize {
        let mut best = 0;
        let mut best_val = f64::NEG_INFINITY;
        for i in 0..max_minutes {
            let v = self.eval(i as f64);
            if v > best_val {
                best_val = v;
                best = i;
            }
        }
        best
    }

    /// Last minute in `[0, max_minutes)` where the kernel exceeds `eps`.
    pub fn support(&self, max_minutes: usize, eps: f64) -> Option<usize> {
        (0..max_minutes).rev().find(|&i| self.eval(i as f64) > eps)
    }

    /// Riemann sum over `[0, max_minutes)` at one-minute resolution.
    pub fn mass(&self, max_minutes: usize) -> f64 {
        (0..max_minutes).map(|i| self.eval(i as f64)).sum()
    }
}
