// src/main.rs
//
// Training harness for doseloop.
//
// - Profile precedence: --profile, then DOSELOOP_PROFILE, then Balanced.
// - Config layering: defaults -> --config YAML -> profile -> DOSELOOP_* env -> CLI flags.
// - Deterministic runs via --seed (episode i uses seed + i).
// - Prints a run header, one line per episode and the learned policy.
// - Optional JSONL telemetry (--telemetry) and JSON summary (--summary-out).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde::Serialize;

use doseloop::config::{resolve_effective_profile, Config, DosingProfile};
use doseloop::logging::{init_tracing, EventSink, FileSink, NoopSink};
use doseloop::rl::{EpisodeSummary, PolicyTable, StateSummary, Trainer};

#[derive(Debug, Parser)]
#[command(
    name = "doseloop",
    about = "Train an online insulin dosing policy against the glucose simulator",
    version
)]
struct Args {
    /// YAML config file (partial documents fall back to defaults).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dosing profile preset. If omitted, uses DOSELOOP_PROFILE (default Balanced).
    #[arg(long, value_enum)]
    profile: Option<DosingProfile>,

    /// Number of training episodes.
    #[arg(long)]
    episodes: Option<u64>,

    /// Minutes per episode.
    #[arg(long)]
    minutes: Option<usize>,

    /// Base seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Write per-tick telemetry as JSONL.
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Write episode summaries and the learned policy as JSON.
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Print the effective config as YAML and exit.
    #[arg(long)]
    print_config: bool,

    /// Suppress the per-state policy table.
    #[arg(long)]
    quiet: bool,

    /// Verbosity: -v for per-decision debug logs.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    config_version: &'a str,
    profile: &'static str,
    selector: &'static str,
    candidate_doses: &'a [f64],
    episodes: &'a [EpisodeSummary],
    policy: Vec<StateSummary>,
}

fn build_config(args: &Args) -> Result<(Config, DosingProfile)> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    let effective = resolve_effective_profile(args.profile);
    effective.log_startup();
    cfg.apply_profile(effective.profile);
    cfg.apply_env_overrides();

    if let Some(n) = args.episodes {
        cfg.training.episodes = n;
    }
    if let Some(m) = args.minutes {
        cfg.training.episode_minutes = m;
    }
    if let Some(s) = args.seed {
        cfg.training.seed = s;
    }
    cfg.validate().context("invalid configuration")?;
    Ok((cfg, effective.profile))
}

fn train<S: EventSink>(cfg: &Config, sink: S) -> Result<(Vec<EpisodeSummary>, PolicyTable)> {
    let mut trainer = Trainer::new(cfg, sink)?;
    let episodes = trainer.run()?;
    Ok((episodes, trainer.into_policy()))
}

fn print_policy(policy: &PolicyTable) {
    println!("state                                            best_dose  mean_reward  weight   visits");
    for row in policy.summary() {
        let state = format!(
            "{:?}/{:?}/{:?}/{:?}",
            row.state.glucose, row.state.rate, row.state.insulin, row.state.food
        );
        match (row.best_dose, row.mean_reward) {
            (Some(dose), Some(mean)) => println!(
                "{state:<48} {dose:>9.3} {mean:>12.4} {:>8.3} {:>8}",
                row.total_weight, row.visits
            ),
            _ => println!(
                "{state:<48} {:>9} {:>12} {:>8.3} {:>8}",
                "-", "-", row.total_weight, row.visits
            ),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose > 0);

    let (cfg, profile) = build_config(&args)?;

    if args.print_config {
        print!("{}", cfg.to_yaml_string()?);
        return Ok(());
    }

    println!(
        "doseloop | cfg={} | profile={} | selector={:?} | episodes={} | minutes={} | seed={}",
        cfg.version,
        profile.as_str(),
        cfg.policy.selector,
        cfg.training.episodes,
        cfg.training.episode_minutes,
        cfg.training.seed,
    );

    let (episodes, policy) = match &args.telemetry {
        Some(path) => {
            let sink = FileSink::create(path)
                .with_context(|| format!("creating telemetry file {}", path.display()))?;
            train(&cfg, sink)?
        }
        None => train(&cfg, NoopSink)?,
    };

    for e in &episodes {
        println!(
            "episode {:>4} | seed={} | g0={:>6.1} | mean_reward={:>10.4} | tir={:>5.1}% | insulin={:>6.2}u | final={:>6.1}",
            e.episode_id,
            e.seed,
            e.initial_glucose,
            e.mean_reward,
            100.0 * e.glycemic.time_in_range,
            e.total_insulin_units,
            e.final_glucose,
        );
    }

    if !args.quiet {
        print_policy(&policy);
    }

    if let Some(path) = &args.summary_out {
        let summary = RunSummary {
            config_version: &cfg.version,
            profile: profile.as_str(),
            selector: policy.selector_name(),
            candidate_doses: policy.candidates(),
            episodes: &episodes,
            policy: policy.summary(),
        };
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing summary {}", path.display()))?;
    }

    Ok(())
}
