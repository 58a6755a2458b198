// src/rl/trainer.rs
//
// Online training loop.
//
// Each episode builds a fresh simulator (optionally randomised), then for
// every minute:
//   1) step the glucose model;
//   2) feed at the scheduled meal minutes;
//   3) on the dose cadence: observe the state, choose a dose from the policy
//      table, administer it, compute the reward and credit every earlier,
//      still-active dose.
//
// The policy table persists across episodes; the simulator does not.

use serde::{Deserialize, Serialize};

use super::domain_rand::{EpisodeSample, EpisodeSampler};
use super::policy::PolicyTable;
use super::reward::{IssuedDose, RewardAttributor};
use super::telemetry::{EpisodeMarker, TickRecord, TELEMETRY_VERSION};
use crate::binning::StateKey;
use crate::config::Config;
use crate::error::Result;
use crate::logging::EventSink;
use crate::metrics::{GlycemicSummary, OnlineStats};
use crate::simulator::Simulator;

/// Per-episode parameters.
#[derive(Debug, Clone, Default)]
pub struct EpisodeConfig {
    /// Seed for episode randomisation.
    pub seed: u64,
    /// Episode ID for logging.
    pub episode_id: u64,
}

impl EpisodeConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_episode_id(mut self, episode_id: u64) -> Self {
        self.episode_id = episode_id;
        self
    }
}

/// Summary of a completed episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_id: u64,
    pub seed: u64,
    pub initial_glucose: f64,
    pub meal_scale: f64,
    pub insulin_sensitivity_scale: f64,
    /// Evaluated minutes.
    pub minutes: usize,
    /// Policy queries (one insulin dose each, possibly zero units).
    pub decisions: u64,
    pub total_insulin_units: f64,
    pub meals: u64,
    pub total_calories: f64,
    pub total_reward: f64,
    pub mean_reward: f64,
    /// Credits accepted by the policy table.
    pub updates_applied: u64,
    /// Distinct states in the policy table at episode end.
    pub visited_states: usize,
    pub final_glucose: f64,
    pub glycemic: GlycemicSummary,
}

/// Meal minutes for one episode, after jitter, sorted.
///
/// Unjittered meals sit at `offset + k * interval`; jittered minutes are
/// clamped into the episode.
pub fn meal_schedule(cfg: &Config, jitter: &[i64]) -> Vec<usize> {
    let t = &cfg.training;
    let last = t.episode_minutes.saturating_sub(1) as i64;
    let mut minutes: Vec<usize> = (t.feed_offset_minutes..t.episode_minutes)
        .step_by(t.feed_interval_minutes)
        .enumerate()
        .map(|(k, m)| {
            let j = jitter.get(k).copied().unwrap_or(0);
            (m as i64 + j).clamp(0, last) as usize
        })
        .collect();
    minutes.sort_unstable();
    minutes
}

/// Number of scheduled meals in one episode.
pub fn meal_count(cfg: &Config) -> usize {
    let t = &cfg.training;
    (t.feed_offset_minutes..t.episode_minutes)
        .step_by(t.feed_interval_minutes)
        .count()
}

pub struct Trainer<'a, S: EventSink> {
    cfg: &'a Config,
    policy: PolicyTable,
    sampler: EpisodeSampler,
    sink: S,
}

impl<'a, S: EventSink> Trainer<'a, S> {
    /// Rejects a config that fails `Config::validate`.
    pub fn new(cfg: &'a Config, sink: S) -> Result<Self> {
        cfg.validate()?;
        let policy = PolicyTable::from_config(&cfg.policy)?;
        Self::with_policy(cfg, policy, sink)
    }

    /// Continue training an existing table.
    pub fn with_policy(cfg: &'a Config, policy: PolicyTable, sink: S) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            policy,
            sampler: EpisodeSampler::new(cfg.episode_rand.clone(), cfg.training.seed),
            sink,
        })
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut PolicyTable {
        &mut self.policy
    }

    pub fn into_policy(self) -> PolicyTable {
        self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (PolicyTable, S) {
        (self.policy, self.sink)
    }

    fn sample_episode(&mut self, seed: u64) -> EpisodeSample {
        let meals = meal_count(self.cfg);
        if self.cfg.episode_rand.enabled {
            self.sampler.reseed(seed);
            self.sampler.sample_episode(meals)
        } else {
            EpisodeSample::identity(self.cfg.sim.initial_glucose, meals)
        }
    }

    fn build_simulator(&self, sample: &EpisodeSample) -> Result<Simulator> {
        let mut sim_cfg = self.cfg.sim.clone();
        sim_cfg.initial_glucose = sample.initial_glucose;
        sim_cfg.insulin_sensitivity *= sample.insulin_sensitivity_scale;
        let horizon = Simulator::training_horizon(self.cfg);
        Ok(Simulator::new(sim_cfg, self.cfg.kernels.clone(), horizon)?)
    }

    /// Run one episode against the persistent policy table.
    pub fn run_episode(&mut self, episode: EpisodeConfig) -> Result<EpisodeSummary> {
        let sample = self.sample_episode(episode.seed);
        let mut sim = self.build_simulator(&sample)?;
        let meals = meal_schedule(self.cfg, &sample.meal_jitter);
        let calories = self.cfg.training.feed_calories * sample.meal_scale;
        let minutes = self.cfg.training.episode_minutes;
        let dose_step = self.cfg.training.dose_step_minutes;

        self.sink.log_marker(&EpisodeMarker::start(
            episode.episode_id,
            episode.seed,
            sample.initial_glucose,
        ));

        let mut attributor = RewardAttributor::new(self.cfg.reward.clone());
        let mut rewards = OnlineStats::default();
        let mut next_meal = 0;
        let mut decisions = 0u64;
        let mut total_insulin = 0.0;
        let mut total_calories = 0.0;
        let mut total_reward = 0.0;
        let mut updates_applied = 0u64;

        for t in 0..minutes {
            sim.step(t)?;

            while next_meal < meals.len() && meals[next_meal] == t {
                sim.dose_food(t, calories)?;
                total_calories += calories;
                next_meal += 1;
            }

            if t % dose_step != 0 {
                continue;
            }

            let state = StateKey::observe(&sim, t)?;
            let choice = self.policy.choose(&state);
            let event = sim.dose_insulin(t, choice.dose)?;
            attributor.record(IssuedDose {
                event,
                minute: t,
                state,
                arm: choice.arm,
            });
            decisions += 1;
            total_insulin += choice.dose;

            let reward = attributor.reward_at(&sim, t)?;
            let credits = attributor.attribute(&sim, t, reward)?;
            let mut applied = 0;
            for c in &credits {
                if self.policy.update_reward(&c.state, c.arm, c.weight, c.reward)? {
                    applied += 1;
                }
            }
            updates_applied += applied as u64;
            rewards.add(reward);
            total_reward += reward;

            let glucose = sim.glucose_at(t)?;
            tracing::debug!(
                episode = episode.episode_id,
                minute = t,
                glucose,
                dose = choice.dose,
                reward,
                credits = credits.len(),
                "dose decision"
            );

            self.sink.log_tick(&TickRecord {
                telemetry_version: TELEMETRY_VERSION,
                config_version: self.cfg.version.clone(),
                episode_id: episode.episode_id,
                minute: t,
                glucose,
                glucose_rate: sim.rate_at(t)?,
                insulin_on_board: sim.insulin_on_board(t)?,
                food_on_board: sim.food_on_board(t)?,
                state,
                arm: choice.arm,
                dose: choice.dose,
                reward,
                attributions: credits,
                applied_updates: applied,
            });
        }

        let trace = &sim.glucose()[..minutes];
        let summary = EpisodeSummary {
            episode_id: episode.episode_id,
            seed: episode.seed,
            initial_glucose: sample.initial_glucose,
            meal_scale: sample.meal_scale,
            insulin_sensitivity_scale: sample.insulin_sensitivity_scale,
            minutes,
            decisions,
            total_insulin_units: total_insulin,
            meals: next_meal as u64,
            total_calories,
            total_reward,
            mean_reward: rewards.mean(),
            updates_applied,
            visited_states: self.policy.visited_states().len(),
            final_glucose: trace.last().copied().unwrap_or(sample.initial_glucose),
            glycemic: GlycemicSummary::from_trace(
                trace,
                self.cfg.reward.target_low,
                self.cfg.reward.target_high,
            ),
        };

        self.sink.log_marker(&EpisodeMarker::end(&summary));
        self.sink.flush();

        tracing::info!(
            episode = summary.episode_id,
            seed = summary.seed,
            initial_glucose = summary.initial_glucose,
            mean_reward = summary.mean_reward,
            time_in_range = summary.glycemic.time_in_range,
            insulin_units = summary.total_insulin_units,
            states = summary.visited_states,
            "episode complete"
        );

        Ok(summary)
    }

    /// Run `episodes` episodes; episode `i` uses seed `base_seed + i`.
    pub fn run_from(&mut self, base_seed: u64, episodes: u64) -> Result<Vec<EpisodeSummary>> {
        (0..episodes)
            .map(|i| {
                self.run_episode(
                    EpisodeConfig::default()
                        .with_seed(base_seed.wrapping_add(i))
                        .with_episode_id(i),
                )
            })
            .collect()
    }

    /// Run the configured number of episodes from the configured seed.
    pub fn run(&mut self) -> Result<Vec<EpisodeSummary>> {
        self.run_from(self.cfg.training.seed, self.cfg.training.episodes)
    }
}
