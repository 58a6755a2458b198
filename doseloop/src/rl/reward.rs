// src/rl/reward.rs
//
// Reward shaping and credit attribution.
//
// The reward at an evaluation tick is the negated sum of a glucose level
// penalty and a rate penalty. Every earlier insulin dose whose kernel is
// still active at the tick is charged that reward, weighted by its kernel
// value at the current offset. Weights are not normalised across doses, so
// overlapping doses each receive the full reward at their own weight.

use serde::{Deserialize, Serialize};

use crate::binning::StateKey;
use crate::config::RewardConfig;
use crate::error::SimError;
use crate::simulator::Simulator;

/// Level penalty: zero in `[target_low, target_high]`, cubic below, quadratic above.
pub fn bgl_penalty(cfg: &RewardConfig, glucose: f64) -> f64 {
    if glucose < cfg.target_low {
        cfg.hypo_scale * (cfg.target_low - glucose).powi(3)
    } else if glucose > cfg.target_high {
        cfg.hyper_scale * (glucose - cfg.target_high).powi(2)
    } else {
        0.0
    }
}

/// Linear penalty on |rate| beyond the threshold.
pub fn rate_penalty(cfg: &RewardConfig, rate: f64) -> f64 {
    let excess = rate.abs() - cfg.rate_threshold;
    if excess > 0.0 {
        cfg.rate_scale * excess
    } else {
        0.0
    }
}

pub fn reward(cfg: &RewardConfig, glucose: f64, rate: f64) -> f64 {
    -(bgl_penalty(cfg, glucose) + rate_penalty(cfg, rate))
}

/// A policy decision remembered for later credit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IssuedDose {
    /// Index into `Simulator::insulin_doses`.
    pub event: usize,
    pub minute: usize,
    pub state: StateKey,
    pub arm: usize,
}

/// One credit to apply to the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub event: usize,
    pub state: StateKey,
    pub arm: usize,
    pub weight: f64,
    pub reward: f64,
}

/// Tracks issued doses and turns a tick's reward into per-dose credits.
#[derive(Debug, Clone)]
pub struct RewardAttributor {
    cfg: RewardConfig,
    issued: Vec<IssuedDose>,
}

impl RewardAttributor {
    pub fn new(cfg: RewardConfig) -> Self {
        Self {
            cfg,
            issued: Vec::new(),
        }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.cfg
    }

    pub fn record(&mut self, dose: IssuedDose) {
        self.issued.push(dose);
    }

    pub fn issued(&self) -> &[IssuedDose] {
        &self.issued
    }

    pub fn clear(&mut self) {
        self.issued.clear();
    }

    /// Reward at minute `t` from the simulator's glucose and rate.
    pub fn reward_at(&self, sim: &Simulator, t: usize) -> Result<f64, SimError> {
        Ok(reward(&self.cfg, sim.glucose_at(t)?, sim.rate_at(t)?))
    }

    /// Credits for `reward` at minute `t`.
    ///
    /// Only doses issued strictly before `t` whose kernel value exceeds
    /// `attribution_min_weight` are charged; each gets `weight = K_ins(t - t0)`.
    pub fn attribute(
        &self,
        sim: &Simulator,
        t: usize,
        reward: f64,
    ) -> Result<Vec<Attribution>, SimError> {
        let mut out = Vec::new();
        for dose in self.issued.iter().filter(|d| d.minute < t) {
            let weight = sim.insulin_contribution(dose.event, t)?;
            if weight > self.cfg.attribution_min_weight {
                out.push(Attribution {
                    event: dose.event,
                    state: dose.state,
                    arm: dose.arm,
                    weight,
                    reward,
                });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalty_is_zero_in_band() {
        let cfg = RewardConfig::default();
        assert_eq!(bgl_penalty(&cfg, 90.0), 0.0);
        assert_eq!(bgl_penalty(&cfg, 100.0), 0.0);
        assert_eq!(bgl_penalty(&cfg, 130.0), 0.0);
    }

    #[test]
    fn hypo_is_steeper_than_hyper() {
        let cfg = RewardConfig::default();
        assert!(bgl_penalty(&cfg, 80.0) > bgl_penalty(&cfg, 85.0));
        assert!(bgl_penalty(&cfg, 85.0) > 0.0);
        assert!(bgl_penalty(&cfg, 200.0) > 0.0);
        // 10 below vs 10 above.
        assert!(bgl_penalty(&cfg, 80.0) > bgl_penalty(&cfg, 140.0));
        assert!((bgl_penalty(&cfg, 80.0) - 10.0).abs() < 1e-12);
        assert!((bgl_penalty(&cfg, 140.0) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn rate_penalty_applies_beyond_threshold() {
        let cfg = RewardConfig::default();
        assert_eq!(rate_penalty(&cfg, 0.9), 0.0);
        assert_eq!(rate_penalty(&cfg, -1.0), 0.0);
        assert!((rate_penalty(&cfg, -2.5) - 1.5).abs() < 1e-12);
        assert!((reward(&cfg, 140.0, 2.0) + 1.1).abs() < 1e-12);
    }
}
