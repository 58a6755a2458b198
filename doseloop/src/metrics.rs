// src/metrics.rs
//
// Online metrics helpers for training and scenario harnesses.
// - OnlineStats: Welford running mean/variance + min/max.
// - GlycemicSummary: time-in-range style summary of a glucose trace.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct OnlineStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for OnlineStats {
    fn default() -> Self {
        Self {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl OnlineStats {
    /// Adds a sample if finite. Non-finite samples are ignored.
    pub fn add(&mut self, x: f64) {
        if !x.is_finite() {
            return;
        }
        self.n += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        let delta = x - self.mean;
        self.mean += delta / (self.n as f64);
        self.m2 += delta * (x - self.mean);
    }

    pub fn n(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.max
        }
    }

    /// Population variance (divide by n).
    pub fn variance(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.m2 / (self.n as f64)
        }
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Glucose trace summary against a target band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlycemicSummary {
    pub samples: u64,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    /// Fraction of samples in `[target_low, target_high]`.
    pub time_in_range: f64,
    pub time_below_range: f64,
    pub time_above_range: f64,
    /// Samples below 70 mg/dL.
    pub hypo_samples: u64,
}

impl GlycemicSummary {
    pub fn from_trace(trace: &[f64], target_low: f64, target_high: f64) -> Self {
        let mut stats = OnlineStats::default();
        let (mut below, mut inside, mut above, mut hypo) = (0u64, 0u64, 0u64, 0u64);
        for &g in trace {
            if !g.is_finite() {
                continue;
            }
            stats.add(g);
            if g < target_low {
                below += 1;
            } else if g > target_high {
                above += 1;
            } else {
                inside += 1;
            }
            if g < 70.0 {
                hypo += 1;
            }
        }
        let n = stats.n();
        let frac = |c: u64| if n == 0 { 0.0 } else { c as f64 / n as f64 };
        Self {
            samples: n,
            mean: stats.mean(),
            stddev: stats.stddev(),
            min: stats.min(),
            max: stats.max(),
            time_in_range: frac(inside),
            time_below_range: frac(below),
            time_above_range: frac(above),
            hypo_samples: hypo,
        }
    }
}
