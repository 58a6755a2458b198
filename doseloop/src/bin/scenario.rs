// src/bin/scenario.rs
//
// Scripted scenario runner.
//
// Runs a YAML scenario (or the built-in reference day) through the simulator
// without a policy and prints its glycemic summary and projection alerts.
//
// Run examples:
//   cargo run --bin scenario -- --reference
//   cargo run --bin scenario -- --scenario day.yaml --series-out day.json

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};

use doseloop::config::Config;
use doseloop::logging::init_tracing;
use doseloop::scenario::Scenario;

#[derive(Debug, Parser)]
#[command(
    name = "scenario",
    about = "Run a scripted insulin/food schedule through the glucose simulator",
    version
)]
struct Args {
    /// Scenario YAML file.
    #[arg(long, conflicts_with_all = ["reference", "fasting"])]
    scenario: Option<PathBuf>,

    /// Use the built-in reference day.
    #[arg(long)]
    reference: bool,

    /// Fasting run from this initial glucose (mg/dL).
    #[arg(long)]
    fasting: Option<f64>,

    /// Horizon in minutes for --fasting.
    #[arg(long, default_value_t = 10_000)]
    horizon: usize,

    /// YAML config providing physiology and kernels.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the full outcome (series included) as JSON.
    #[arg(long)]
    series_out: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose > 0);

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    cfg.apply_env_overrides();
    cfg.validate().context("invalid configuration")?;

    let scenario = match (&args.scenario, args.reference, args.fasting) {
        (Some(path), _, _) => Scenario::from_yaml_file(path)
            .with_context(|| format!("loading scenario {}", path.display()))?,
        (None, true, _) => Scenario::reference_day(),
        (None, false, Some(g)) => Scenario::fasting(g, args.horizon),
        (None, false, None) => bail!("one of --scenario, --reference or --fasting is required"),
    };

    let out = scenario.run(&cfg)?;
    let g = &out.glycemic;
    println!(
        "scenario {} | minutes={} | insulin={:.2}u | food={:.0}cal",
        out.name, out.horizon_minutes, out.total_insulin_units, out.total_calories
    );
    println!(
        "glucose mean={:.1} sd={:.1} min={:.1} max={:.1} final={:.1}",
        g.mean, g.stddev, g.min, g.max, out.final_glucose
    );
    println!(
        "time in range={:.1}% below={:.1}% above={:.1}% hypo_samples={}",
        100.0 * g.time_in_range,
        100.0 * g.time_below_range,
        100.0 * g.time_above_range,
        g.hypo_samples
    );
    for a in &out.alerts {
        println!(
            "alert {:?} at minute {:.0}: projected {:.1} mg/dL in {:.0} min (slope {:.2}/min)",
            a.kind, a.minute, a.projected_mgdl, a.horizon_minutes, a.slope_per_minute
        );
    }

    if let Some(path) = &args.series_out {
        std::fs::write(path, serde_json::to_string(&out)?)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
