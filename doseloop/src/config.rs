// src/config.rs
//
// Central configuration for doseloop.
//
// Single source of truth for the physiological constants (glucose balance
// equation, kernel shapes), the bandit policy (candidate doses, selector,
// exploration), the reward shape and the training schedule.
//
// Layering, lowest to highest precedence:
//   defaults -> YAML file -> dosing profile -> DOSELOOP_* env knobs -> CLI

use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::kernel::AbsorptionKernel;
use crate::rl::domain_rand::EpisodeRandConfig;

/// How `glucose_rate[t]` is derived from the glucose series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateMode {
    /// `(g[t] - g[t-1]) / Δ`.
    Difference,
    /// Least-squares slope over the trailing `window` minutes.
    Regression { window: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Integration step Δ in minutes (multiplies the rate terms).
    pub step_minutes: f64,
    /// Initial condition glucose[0] (mg/dL).
    pub initial_glucose: f64,
    /// Mass-action insulin uptake coefficient S_I.
    pub insulin_sensitivity: f64,
    /// mg/dL contributed per calorie of food over the whole absorption.
    pub food_sensitivity: f64,
    /// Constant glucose sink (brain, red cells), mg/dL per minute.
    pub background_use_rate: f64,
    /// Fraction of the excess over the renal threshold cleared per minute.
    pub kidney_clearance_rate: f64,
    /// Renal threshold (mg/dL).
    pub renal_threshold: f64,
    /// Offset used by the insulin/food on-board readings.
    pub onboard_lookahead_minutes: usize,
    pub rate_mode: RateMode,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            step_minutes: 1.0,
            initial_glucose: 250.0,
            insulin_sensitivity: 0.62,
            food_sensitivity: 1.0,
            background_use_rate: 0.0,
            // GFR ~2 mL/min/kg, ~1/20 of filtered glucose spills, dL -> mL.
            kidney_clearance_rate: 2.0 / 20.0 / 1000.0,
            renal_threshold: 180.0,
            onboard_lookahead_minutes: 300,
            rate_mode: RateMode::Difference,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub insulin: AbsorptionKernel,
    pub food: AbsorptionKernel,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            insulin: AbsorptionKernel::insulin(),
            food: AbsorptionKernel::food(),
        }
    }
}

/// Which dose selection rule the policy table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// Upper confidence bound over running mean reward.
    Ucb1,
    /// Try every arm `min_trials` times in order, then exploit the best mean.
    RoundRobin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Allowed doses (units), in tie-break order.
    pub candidate_doses: Vec<f64>,
    pub selector: SelectorKind,
    /// UCB exploration constant c.
    pub exploration_c: f64,
    /// Observations per arm before the round-robin selector exploits.
    pub min_trials: u64,
    /// Updates with smaller weight are dropped.
    pub min_weight: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            candidate_doses: vec![0.0, 0.05, 0.1, 0.25, 0.5, 1.0],
            selector: SelectorKind::Ucb1,
            exploration_c: 1.0,
            min_trials: 20,
            min_weight: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Lower edge of the target band (inclusive).
    pub target_low: f64,
    /// Upper edge of the target band (inclusive).
    pub target_high: f64,
    /// Coefficient of the cubic hypoglycemia penalty.
    pub hypo_scale: f64,
    /// Coefficient of the quadratic hyperglycemia penalty.
    pub hyper_scale: f64,
    /// |rate| above this (mg/dL/min) is penalised.
    pub rate_threshold: f64,
    pub rate_scale: f64,
    /// Doses whose kernel value at the evaluation tick is not above this get no credit.
    pub attribution_min_weight: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            target_low: 90.0,
            target_high: 130.0,
            hypo_scale: 0.01,
            hyper_scale: 0.001,
            rate_threshold: 1.0,
            rate_scale: 1.0,
            attribution_min_weight: 1e-4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: u64,
    /// Evaluated minutes per episode.
    pub episode_minutes: usize,
    /// Cadence of policy queries / reward attribution.
    pub dose_step_minutes: usize,
    pub feed_interval_minutes: usize,
    /// Minute within each feed interval at which the meal is given.
    pub feed_offset_minutes: usize,
    pub feed_calories: f64,
    /// Base seed; episode `i` is randomised with `seed + i`.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 20,
            episode_minutes: 3 * 24 * 60,
            dose_step_minutes: 30,
            feed_interval_minutes: 12 * 60,
            feed_offset_minutes: 90,
            feed_calories: 130.0,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Human-readable config version.
    pub version: String,
    pub sim: SimConfig,
    pub kernels: KernelConfig,
    pub policy: PolicyConfig,
    pub reward: RewardConfig,
    pub training: TrainingConfig,
    pub episode_rand: EpisodeRandConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "doseloop-v0.1".to_string(),
            sim: SimConfig::default(),
            kernels: KernelConfig::default(),
            policy: PolicyConfig::default(),
            reward: RewardConfig::default(),
            training: TrainingConfig::default(),
            episode_rand: EpisodeRandConfig::default(),
        }
    }
}

/// Coarse dosing preset used by the CLI / research harness.
///
/// Presets only touch the candidate dose set and the exploration constant on
/// top of the default (which is `Balanced`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DosingProfile {
    Cautious,
    Balanced,
    Aggressive,
}

impl DosingProfile {
    /// Stable lowercase name (used in logs/telemetry).
    pub fn as_str(&self) -> &'static str {
        match self {
            DosingProfile::Cautious => "cautious",
            DosingProfile::Balanced => "balanced",
            DosingProfile::Aggressive => "aggressive",
        }
    }

    /// Parse a profile name (case-insensitive). Returns None if unrecognized.
    pub fn parse(s: &str) -> Option<DosingProfile> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" | "bal" | "b" => Some(DosingProfile::Balanced),
            "cautious" | "conservative" | "c" => Some(DosingProfile::Cautious),
            "aggressive" | "agg" | "a" => Some(DosingProfile::Aggressive),
            _ => None,
        }
    }
}

/// Where the effective profile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Cli,
    Env,
    Default,
}

impl ProfileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileSource::Cli => "cli",
            ProfileSource::Env => "env",
            ProfileSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EffectiveProfile {
    pub profile: DosingProfile,
    pub source: ProfileSource,
}

impl EffectiveProfile {
    pub fn log_startup(&self) {
        tracing::info!(
            profile = self.profile.as_str(),
            source = self.source.as_str(),
            "effective dosing profile"
        );
    }
}

/// Resolve the dosing profile: CLI, then `DOSELOOP_PROFILE`, then Balanced.
pub fn resolve_effective_profile(cli_profile: Option<DosingProfile>) -> EffectiveProfile {
    if let Some(p) = cli_profile {
        return EffectiveProfile {
            profile: p,
            source: ProfileSource::Cli,
        };
    }

    if let Ok(env_val) = std::env::var("DOSELOOP_PROFILE") {
        if !env_val.is_empty() {
            if let Some(p) = DosingProfile::parse(&env_val) {
                return EffectiveProfile {
                    profile: p,
                    source: ProfileSource::Env,
                };
            }
            tracing::warn!(value = %env_val, "invalid DOSELOOP_PROFILE; ignoring");
        }
    }

    EffectiveProfile {
        profile: DosingProfile::Balanced,
        source: ProfileSource::Default,
    }
}

impl Config {
    /// Default config with a dosing profile applied.
    pub fn for_profile(profile: DosingProfile) -> Self {
        let mut cfg = Config::default();
        cfg.apply_profile(profile);
        cfg
    }

    pub fn apply_profile(&mut self, profile: DosingProfile) {
        match profile {
            DosingProfile::Balanced => {}
            DosingProfile::Cautious => {
                self.policy.candidate_doses = vec![0.0, 0.02, 0.05, 0.1, 0.25];
                self.policy.exploration_c = 0.5;
            }
            DosingProfile::Aggressive => {
                self.policy.candidate_doses = vec![0.0, 0.1, 0.25, 0.5, 1.0, 2.0];
                self.policy.exploration_c = 2.0;
            }
        }
    }

    /// Parse a (possibly partial) YAML document; missing fields keep defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply `DOSELOOP_*` research knobs. Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_f64("DOSELOOP_INSULIN_SENSITIVITY") {
            self.sim.insulin_sensitivity = v;
        }
        if let Some(v) = env_f64("DOSELOOP_FOOD_SENSITIVITY") {
            self.sim.food_sensitivity = v;
        }
        if let Some(v) = env_f64("DOSELOOP_INITIAL_GLUCOSE") {
            self.sim.initial_glucose = v;
        }
        if let Some(v) = env_f64("DOSELOOP_EXPLORATION_C") {
            self.policy.exploration_c = v;
        }
        if let Some(v) = env_usize("DOSELOOP_DOSE_STEP_MINUTES") {
            self.training.dose_step_minutes = v;
        }
    }

    /// Check invariants the simulator and policy rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.sim;
        if !(sim.step_minutes.is_finite() && sim.step_minutes > 0.0) {
            return Err(ConfigError::invalid("sim.step_minutes", "must be finite and > 0"));
        }
        for (field, v) in [
            ("sim.initial_glucose", sim.initial_glucose),
            ("sim.insulin_sensitivity", sim.insulin_sensitivity),
            ("sim.food_sensitivity", sim.food_sensitivity),
            ("sim.background_use_rate", sim.background_use_rate),
            ("sim.kidney_clearance_rate", sim.kidney_clearance_rate),
            ("sim.renal_threshold", sim.renal_threshold),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::invalid(field, "must be finite and >= 0"));
            }
        }
        if let RateMode::Regression { window } = sim.rate_mode {
            if window < 2 {
                return Err(ConfigError::invalid("sim.rate_mode.window", "must be >= 2"));
            }
        }

        if self.kernels.insulin.components.is_empty() {
            return Err(ConfigError::invalid("kernels.insulin", "needs at least one component"));
        }
        if self.kernels.food.components.is_empty() {
            return Err(ConfigError::invalid("kernels.food", "needs at least one component"));
        }

        let policy = &self.policy;
        if policy.candidate_doses.is_empty() {
            return Err(ConfigError::invalid("policy.candidate_doses", "must not be empty"));
        }
        if policy
            .candidate_doses
            .iter()
            .any(|d| !d.is_finite() || *d < 0.0)
        {
            return Err(ConfigError::invalid(
                "policy.candidate_doses",
                "doses must be finite and >= 0",
            ));
        }
        if !(policy.exploration_c.is_finite() && policy.exploration_c >= 0.0) {
            return Err(ConfigError::invalid("policy.exploration_c", "must be finite and >= 0"));
        }
        if !(policy.min_weight.is_finite() && policy.min_weight > 0.0) {
            return Err(ConfigError::invalid("policy.min_weight", "must be finite and > 0"));
        }

        if self.reward.target_low > self.reward.target_high {
            return Err(ConfigError::invalid("reward.target_low", "must be <= target_high"));
        }

        let t = &self.training;
        if t.episode_minutes == 0 {
            return Err(ConfigError::invalid("training.episode_minutes", "must be > 0"));
        }
        if t.dose_step_minutes == 0 {
            return Err(ConfigError::invalid("training.dose_step_minutes", "must be > 0"));
        }
        if t.feed_interval_minutes == 0 {
            return Err(ConfigError::invalid("training.feed_interval_minutes", "must be > 0"));
        }
        if t.feed_offset_minutes >= t.feed_interval_minutes {
            return Err(ConfigError::invalid(
                "training.feed_offset_minutes",
                "must be < feed_interval_minutes",
            ));
        }

        self.episode_rand.validate()
    }
}

fn env_f64(key: &str) -> Option<f64> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn profile_parse_aliases() {
        assert_eq!(DosingProfile::parse("B"), Some(DosingProfile::Balanced));
        assert_eq!(
            DosingProfile::parse(" conservative "),
            Some(DosingProfile::Cautious)
        );
        assert_eq!(DosingProfile::parse("agg"), Some(DosingProfile::Aggressive));
        assert_eq!(DosingProfile::parse("reckless"), None);
    }

    #[test]
    fn cli_profile_values_are_canonical_names() {
        assert_eq!(
            <DosingProfile as ValueEnum>::from_str("aggressive", false),
            Ok(DosingProfile::Aggressive)
        );
        assert!(<DosingProfile as ValueEnum>::from_str("agg", false).is_err());
    }

    #[test]
    fn cli_profile_wins() {
        let eff = resolve_effective_profile(Some(DosingProfile::Aggressive));
        assert_eq!(eff.profile, DosingProfile::Aggressive);
        assert_eq!(eff.source, ProfileSource::Cli);
    }

    #[test]
    fn profiles_change_candidates() {
        let cautious = Config::for_profile(DosingProfile::Cautious);
        let balanced = Config::for_profile(DosingProfile::Balanced);
        assert_ne!(
            cautious.policy.candidate_doses,
            balanced.policy.candidate_doses
        );
        assert!(cautious.policy.exploration_c < balanced.policy.exploration_c);
        cautious.validate().unwrap();
        Config::for_profile(DosingProfile::Aggressive)
            .validate()
            .unwrap();
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
sim:
  initial_glucose: 370.0
policy:
  selector: round_robin
  min_trials: 3
"#;
        let cfg = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.sim.initial_glucose, 370.0);
        assert_eq!(cfg.sim.insulin_sensitivity, 0.62);
        assert_eq!(cfg.policy.selector, SelectorKind::RoundRobin);
        assert_eq!(cfg.policy.min_trials, 3);
        assert_eq!(cfg.policy.candidate_doses.len(), 6);
        assert_eq!(cfg.training.dose_step_minutes, 30);
    }

    #[test]
    fn yaml_round_trip_preserves_kernels() {
        let cfg = Config::default();
        let yaml = cfg.to_yaml_string().unwrap();
        let back = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(back.kernels.insulin, cfg.kernels.insulin);
        assert_eq!(back.kernels.food, cfg.kernels.food);
        assert_eq!(back.sim.rate_mode, RateMode::Difference);
    }

    #[test]
    fn validation_rejects_empty_candidates() {
        let yaml = "policy:\n  candidate_doses: []\n";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "policy.candidate_doses"));
    }

    #[test]
    fn validation_rejects_zero_dose_step() {
        let mut cfg = Config::default();
        cfg.training.dose_step_minutes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_min_weight() {
        let mut cfg = Config::default();
        cfg.policy.min_weight = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "policy.min_weight"
        ));
    }

    #[test]
    fn regression_rate_mode_parses() {
        let yaml = "sim:\n  rate_mode:\n    mode: regression\n    window: 15\n";
        let cfg = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.sim.rate_mode, RateMode::Regression { window: 15 });
    }
}
