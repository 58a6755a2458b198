//! doseloop core library.
//!
//! A minute-resolution insulin/food/glucose simulator coupled with an online
//! bandit controller that learns a dosing policy without labelled data. The
//! binaries (`src/main.rs`, `src/bin/*`) are thin harnesses around these
//! components.
//!
//! # Architecture
//!
//! - **Kernels** (`kernel`): absorption curves as plain value descriptors
//!   (gamma mixtures, triangles) evaluated by a pure function.
//! - **Simulator** (`simulator`, `series`): dose folding into active-effect
//!   series and the forward-Euler glucose balance step.
//! - **Binning** (`binning`): readings to a discrete `StateKey`.
//! - **Controller** (`rl`): bandit policy table, reward attribution, the
//!   training loop, ensembles and episode randomisation.
//! - **Scenarios** (`scenario`): scripted open-loop dose schedules.
//! - **Trend** (`trend`): regression slope, rolling window, projection alerts.
//!
//! # Example
//!
//! ```
//! use doseloop::{Config, NoopSink, Trainer};
//!
//! let mut cfg = Config::default();
//! cfg.training.episodes = 1;
//! cfg.training.episode_minutes = 600;
//! let mut trainer = Trainer::new(&cfg, NoopSink).unwrap();
//! let summaries = trainer.run().unwrap();
//! assert_eq!(summaries.len(), 1);
//! ```

pub mod binning;
pub mod config;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod metrics;
pub mod rl;
pub mod scenario;
pub mod series;
pub mod simulator;
pub mod trend;

// --- Re-exports for ergonomic external use ---------------------------------

pub use binning::{GlucoseBin, LoadBin, RateBin, StateKey};
pub use config::{
    resolve_effective_profile, Config, DosingProfile, EffectiveProfile, KernelConfig,
    PolicyConfig, ProfileSource, RateMode, RewardConfig, SelectorKind, SimConfig, TrainingConfig,
};
pub use error::{ConfigError, Error, PolicyError, Result, ScenarioError, SimError};
pub use kernel::{AbsorptionKernel, GammaComponent, KernelComponent, TriangularComponent};
pub use logging::{init_tracing, EventSink, FileSink, MemorySink, NoopSink};
pub use metrics::{GlycemicSummary, OnlineStats};
pub use rl::{
    run_ensemble, ArmStatistic, DoseSelector, EpisodeSummary, PolicyTable, RewardAttributor,
    Trainer,
};
pub use scenario::{DoseSpec, Scenario, ScenarioOutcome};
pub use series::TimeSeries;
pub use simulator::{DoseEvent, DoseKind, Simulator};
pub use trend::{linear_regression_slope, ProjectionGuard, RollingWindow};
