use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use sbasim::{config_loader, orchestrator};
use std::fs;
use std::path::PathBuf;

/// Deterministic 5G service-based architecture simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the scenario YAML file
    #[arg(short, long)]
    scenario: PathBuf,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seed for the random source, overriding the scenario's own
    #[arg(long)]
    seed: Option<u64>,

    /// Only load and validate the scenario
    #[arg(long)]
    validate_only: bool,
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("Starting SBA simulator");
    info!("Scenario file: {:?}", args.scenario);

    let scenario = config_loader::load_scenario(&args.scenario)?;

    if args.validate_only {
        info!("Scenario is valid ({} step(s))", scenario.steps.len());
        return Ok(());
    }

    let report = orchestrator::run_scenario(&scenario, args.seed)?;
    if report.failures > 0 {
        warn!("{} step(s) failed, see report for details", report.failures);
    }

    let json = serde_json::to_string_pretty(&report).wrap_err("Failed to serialize report")?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)
                .wrap_err_with(|| format!("Failed to write report to '{}'", path.display()))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", json),
    }

    info!("Simulation completed at t={:?}", report.final_time);
    Ok(())
}
