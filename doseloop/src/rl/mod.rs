// src/rl/mod.rs
//
// Online dosing controller.
//
// Key components:
// - PolicyTable: per-state bandit statistics with pluggable DoseSelector
//   (UCB1, round-robin until min trials)
// - RewardAttributor: glucose penalty and kernel-weighted credit to earlier doses
// - Trainer: episode loop driving simulator, feeds, doses and updates
// - EpisodeSampler: deterministic per-episode randomisation
// - run_ensemble: independent runs on worker threads, merged tables
// - TickRecord / EpisodeMarker: telemetry records

pub mod domain_rand;
pub mod ensemble;
pub mod policy;
pub mod reward;
pub mod telemetry;
pub mod trainer;

// Re-exports for convenience
pub use domain_rand::{EpisodeRandConfig, EpisodeSample, EpisodeSampler};
pub use ensemble::{run_ensemble, EnsembleReport, EnsembleSummary, RunResult};
pub use policy::{
    ucb_score, ArmStatistic, DoseChoice, DoseSelector, PolicyTable, RoundRobinSelector,
    StateSummary, Ucb1Selector,
};
pub use reward::{bgl_penalty, rate_penalty, reward, Attribution, IssuedDose, RewardAttributor};
pub use telemetry::{EpisodeMarker, EpisodeMarkerType, TelemetryEvent, TickRecord};
pub use trainer::{EpisodeConfig, EpisodeSummary, Trainer};
