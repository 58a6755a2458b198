// src/error.rs
//
// Error types for the simulator, policy table, configuration and scenarios.
//
// The numeric core is closed: the only failures are programming errors
// (indices outside the horizon, malformed doses) and bad configuration.
// Nothing here is retried.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Simulator errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    /// Minute index outside `[0, horizon)`.
    #[error("minute index {index} outside simulation horizon [0, {horizon})")]
    IndexOutOfRange { index: usize, horizon: usize },

    /// Dose magnitude negative or not finite.
    #[error("invalid {kind} dose magnitude {magnitude}")]
    InvalidDose { kind: &'static str, magnitude: f64 },

    /// Dose event index that was never issued.
    #[error("unknown dose event {0}")]
    UnknownDose(usize),
}

/// Policy table errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("candidate dose set is empty")]
    EmptyCandidates,

    #[error("candidate dose {0} is negative or not finite")]
    InvalidCandidate(f64),

    #[error("arm index {arm} out of range for {candidates} candidates")]
    ArmOutOfRange { arm: usize, candidates: usize },

    #[error("cannot merge tables with different candidate sets")]
    CandidateMismatch,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config validation error in '{field}': {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Scenario errors.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("scenario validation error in '{field}': {message}")]
    Validation { field: String, message: String },
}

/// Top-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}
