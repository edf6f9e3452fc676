//! SPSA tuning CLI: loads a tuning configuration (or the built-in
//! continuation-history preset), runs the optimizer and prints the final
//! report as JSON.
//!
//! Usage:
//!   cargo run --release -p spsa-tuner -- --config tune.json --output report.json
//!   RUST_LOG=debug cargo run -p spsa-tuner -- --iterations 20 --seed 7

use clap::Parser;
use spsa_tuner::TuningConfig;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spsa-tune")]
#[command(about = "Tune engine parameters with simultaneous perturbation stochastic approximation")]
struct Args {
    /// JSON tuning configuration; the continuation-history preset when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the iteration budget
    #[arg(long)]
    iterations: Option<u64>,

    /// Override the perturbation seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the report here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, abandoning the in-flight iteration"),
        Err(e) => {
            warn!("Unable to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TuningConfig::from_file(path)?,
        None => TuningConfig::continuation_history(),
    };
    if let Some(iterations) = args.iterations {
        config = config.with_iterations(iterations);
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let report = spsa_tuner::run(&config, shutdown_signal()).await?;
    let json = serde_json::to_string_pretty(&report)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json)?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{json}"),
    }

    if let Some(error) = report.failure() {
        anyhow::bail!(
            "tuning stopped after {} completed iterations: {error}",
            report.iterations
        );
    }
    Ok(())
}
