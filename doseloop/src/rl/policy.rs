// src/rl/policy.rs
//
// Tabular bandit dosing policy.
//
// One row per visited StateKey, one ArmStatistic per candidate dose (keyed by
// index into the fixed candidate array). Rows and arms are created lazily.
// Arm selection is delegated to a DoseSelector so exploration strategies can
// be swapped without touching the table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::binning::StateKey;
use crate::config::{PolicyConfig, SelectorKind};
use crate::error::PolicyError;

/// Weighted streaming mean/variance of the rewards credited to one arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStatistic {
    /// Accumulated (possibly fractional) weight.
    pub n: f64,
    pub mean: f64,
    pub m2: f64,
    /// Number of accepted updates.
    pub visits: u64,
}

impl ArmStatistic {
    /// Non-positive weights are ignored.
    pub fn update(&mut self, weight: f64, value: f64) {
        if weight.is_nan() || weight <= 0.0 {
            return;
        }
        self.n += weight;
        let delta = value - self.mean;
        self.mean += (weight / self.n) * delta;
        let delta2 = value - self.mean;
        self.m2 += weight * delta * delta2;
        self.visits += 1;
    }

    /// Weighted population variance; zero for an unobserved arm.
    pub fn variance(&self) -> f64 {
        if self.n > 0.0 {
            self.m2 / self.n
        } else {
            0.0
        }
    }

    /// Parallel Welford combination of two independent accumulations.
    pub fn merge(&self, other: &ArmStatistic) -> ArmStatistic {
        if other.n <= 0.0 {
            return ArmStatistic {
                visits: self.visits + other.visits,
                ..*self
            };
        }
        if self.n <= 0.0 {
            return ArmStatistic {
                visits: self.visits + other.visits,
                ..*other
            };
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        ArmStatistic {
            n,
            mean: self.mean + delta * other.n / n,
            m2: self.m2 + other.m2 + delta * delta * self.n * other.n / n,
            visits: self.visits + other.visits,
        }
    }
}

/// UCB1 score: `+∞` for an unobserved arm, else `mean + c·sqrt(|ln n / n|)`.
pub fn ucb_score(stat: &ArmStatistic, c: f64) -> f64 {
    if stat.n <= 0.0 {
        return f64::INFINITY;
    }
    stat.mean + c * (stat.n.ln() / stat.n).abs().sqrt()
}

/// Index of the strictly greatest score (first on ties).
fn argmax_first(scores: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, s) in scores.enumerate() {
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}

/// Chooses an arm given one statistic per candidate, in candidate order.
pub trait DoseSelector: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, arms: &[ArmStatistic]) -> usize;
}

#[derive(Debug, Clone, Copy)]
pub struct Ucb1Selector {
    pub c: f64,
}

impl DoseSelector for Ucb1Selector {
    fn name(&self) -> &'static str {
        "ucb1"
    }

    fn select(&self, arms: &[ArmStatistic]) -> usize {
        argmax_first(arms.iter().map(|a| ucb_score(a, self.c)))
    }
}

/// Least-observed arm until every arm has `min_trials` accepted updates,
/// then the greatest mean.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobinSelector {
    pub min_trials: u64,
}

impl DoseSelector for RoundRobinSelector {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select(&self, arms: &[ArmStatistic]) -> usize {
        let mut least: Option<(usize, u64)> = None;
        for (i, a) in arms.iter().enumerate() {
            if a.visits < self.min_trials && least.map_or(true, |(_, v)| a.visits < v) {
                least = Some((i, a.visits));
            }
        }
        match least {
            Some((i, _)) => i,
            None => argmax_first(arms.iter().map(|a| a.mean)),
        }
    }
}

pub fn selector_for(cfg: &PolicyConfig) -> Box<dyn DoseSelector> {
    match cfg.selector {
        SelectorKind::Ucb1 => Box::new(Ucb1Selector {
            c: cfg.exploration_c,
        }),
        SelectorKind::RoundRobin => Box::new(RoundRobinSelector {
            min_trials: cfg.min_trials,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoseChoice {
    pub arm: usize,
    pub dose: f64,
}

/// One line of the policy export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub state: StateKey,
    /// None until some arm in this row has been credited.
    pub best_arm: Option<usize>,
    pub best_dose: Option<f64>,
    pub mean_reward: Option<f64>,
    pub total_weight: f64,
    pub visits: u64,
}

pub struct PolicyTable {
    candidates: Vec<f64>,
    selector: Box<dyn DoseSelector>,
    min_weight: f64,
    rows: BTreeMap<StateKey, BTreeMap<usize, ArmStatistic>>,
}

impl PolicyTable {
    pub fn new(
        candidates: Vec<f64>,
        selector: Box<dyn DoseSelector>,
        min_weight: f64,
    ) -> Result<Self, PolicyError> {
        if candidates.is_empty() {
            return Err(PolicyError::EmptyCandidates);
        }
        if let Some(&bad) = candidates.iter().find(|d| !d.is_finite() || **d < 0.0) {
            return Err(PolicyError::InvalidCandidate(bad));
        }
        Ok(Self {
            candidates,
            selector,
            min_weight,
            rows: BTreeMap::new(),
        })
    }

    pub fn from_config(cfg: &PolicyConfig) -> Result<Self, PolicyError> {
        Self::new(cfg.candidate_doses.clone(), selector_for(cfg), cfg.min_weight)
    }

    pub fn candidates(&self) -> &[f64] {
        &self.candidates
    }

    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// Statistics for every candidate in `state`, unobserved arms defaulted.
    pub fn arm_stats(&self, state: &StateKey) -> Vec<ArmStatistic> {
        let row = self.rows.get(state);
        (0..self.candidates.len())
            .map(|i| {
                row.and_then(|r| r.get(&i))
                    .copied()
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Pick a dose for `state`, creating its row if this is the first visit.
    pub fn choose(&mut self, state: &StateKey) -> DoseChoice {
        self.rows.entry(*state).or_default();
        let arms = self.arm_stats(state);
        let arm = self.selector.select(&arms);
        DoseChoice {
            arm,
            dose: self.candidates[arm],
        }
    }

    /// Credit `reward` with `weight` to `(state, arm)`.
    ///
    /// Returns false (and leaves the table untouched) when the weight is not
    /// positive, is below `min_weight`, or either value is not finite.
    pub fn update_reward(
        &mut self,
        state: &StateKey,
        arm: usize,
        weight: f64,
        reward: f64,
    ) -> Result<bool, PolicyError> {
        if arm >= self.candidates.len() {
            return Err(PolicyError::ArmOutOfRange {
                arm,
                candidates: self.candidates.len(),
            });
        }
        let usable = weight.is_finite() && weight > 0.0 && weight >= self.min_weight;
        if !usable || !reward.is_finite() {
            return Ok(false);
        }
        self.rows
            .entry(*state)
            .or_default()
            .entry(arm)
            .or_default()
            .update(weight, reward);
        Ok(true)
    }

    pub fn stat(&self, state: &StateKey, arm: usize) -> Option<&ArmStatistic> {
        self.rows.get(state).and_then(|r| r.get(&arm))
    }

    pub fn reset_state(&mut self, state: &StateKey) {
        self.rows.remove(state);
    }

    pub fn reset_all(&mut self) {
        self.rows.clear();
    }

    pub fn visited_states(&self) -> Vec<StateKey> {
        self.rows.keys().copied().collect()
    }

    /// Best dose and its mean reward per visited state, sorted by key.
    pub fn summary(&self) -> Vec<StateSummary> {
        self.rows
            .iter()
            .map(|(state, row)| {
                let mut best: Option<(usize, f64)> = None;
                for (&arm, stat) in row {
                    if stat.n > 0.0 && best.map_or(true, |(_, m)| stat.mean > m) {
                        best = Some((arm, stat.mean));
                    }
                }
                StateSummary {
                    state: *state,
                    best_arm: best.map(|(a, _)| a),
                    best_dose: best.map(|(a, _)| self.candidates[a]),
                    mean_reward: best.map(|(_, m)| m),
                    total_weight: row.values().map(|s| s.n).sum(),
                    visits: row.values().map(|s| s.visits).sum(),
                }
            })
            .collect()
    }

    /// Fold another table's statistics into this one.
    pub fn merge_from(&mut self, other: &PolicyTable) -> Result<(), PolicyError> {
        if self.candidates != other.candidates {
            return Err(PolicyError::CandidateMismatch);
        }
        for (state, row) in &other.rows {
            let mine = self.rows.entry(*state).or_default();
            for (&arm, stat) in row {
                let slot = mine.entry(arm).or_default();
                *slot = slot.merge(stat);
            }
        }
        Ok(())
    }
}
