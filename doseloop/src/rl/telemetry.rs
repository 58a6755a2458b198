// src/rl/telemetry.rs
//
// Training telemetry records.
//
// Every evaluation tick produces a TickRecord (readings, discrete state, the
// chosen dose, the reward and the credits it generated). Episode boundaries
// are marked with an EpisodeMarker; the end marker carries the episode
// summary. Records are written through an EventSink (see logging.rs).

use serde::{Deserialize, Serialize};

use super::reward::Attribution;
use super::trainer::EpisodeSummary;
use crate::binning::StateKey;

/// Bumped when TickRecord fields change.
pub const TELEMETRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    pub telemetry_version: u32,
    pub config_version: String,
    pub episode_id: u64,
    pub minute: usize,

    // ----- Readings -----
    pub glucose: f64,
    pub glucose_rate: f64,
    pub insulin_on_board: f64,
    pub food_on_board: f64,
    pub state: StateKey,

    // ----- Decision -----
    pub arm: usize,
    pub dose: f64,

    // ----- Learning signal -----
    pub reward: f64,
    pub attributions: Vec<Attribution>,
    /// Credits the policy accepted (weight above its floor).
    pub applied_updates: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeMarkerType {
    Start,
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMarker {
    pub episode_id: u64,
    pub seed: u64,
    pub marker_type: EpisodeMarkerType,
    pub initial_glucose: f64,
    /// Present on end markers.
    pub summary: Option<EpisodeSummary>,
}

impl EpisodeMarker {
    pub fn start(episode_id: u64, seed: u64, initial_glucose: f64) -> Self {
        Self {
            episode_id,
            seed,
            marker_type: EpisodeMarkerType::Start,
            initial_glucose,
            summary: None,
        }
    }

    pub fn end(summary: &EpisodeSummary) -> Self {
        Self {
            episode_id: summary.episode_id,
            seed: summary.seed,
            marker_type: EpisodeMarkerType::End,
            initial_glucose: summary.initial_glucose,
            summary: Some(summary.clone()),
        }
    }
}

/// One JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Tick(TickRecord),
    Episode(EpisodeMarker),
}
