//! Command line driver for the ecosystem simulator.

mod telemetry;

use anyhow::{bail, Context, Result};
use clap::Parser;
use eco_core::{Error, SimulationConfig};
use eco_world::{FrameOptions, RunSummary, Runner};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use telemetry::LogFormat;
use tokio::signal;
use tracing::{error, info, warn};

/// Simulate populations of organisms living on a toroidal grid.
#[derive(Debug, Parser)]
#[command(name = "ecosystem", version, about)]
struct Args {
    /// JSON configuration document
    config: PathBuf,

    /// Override the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the configured step count (and disable run_forever)
    #[arg(long)]
    steps: Option<u32>,

    /// Pixels per grid cell in rendered frames
    #[arg(long, default_value_t = 4)]
    zoom: u32,

    /// Directory for rendered frames when the config enables `visual`
    #[arg(long, default_value = "frames")]
    frames_dir: PathBuf,

    /// Render a frame every this many ticks
    #[arg(long, default_value_t = 10)]
    frame_every: u64,

    /// Do not print census lines
    #[arg(long)]
    quiet: bool,

    /// Write a JSON run summary to this path
    #[arg(long)]
    summary: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_telemetry(args.log_format)?;

    let config = load_config(&args)?;
    let mut runner = Runner::from_config(&config).context("failed to create world")?;
    if config.visual {
        runner = runner.with_frames(FrameOptions {
            dir: args.frames_dir.clone(),
            zoom: args.zoom,
            every: args.frame_every,
        });
    }
    info!(
        seed = runner.simulation().seed(),
        "Simulation seeded; pass --seed {} to replay this run",
        runner.simulation().seed()
    );

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.store(true, Ordering::Relaxed);
    });

    let quiet = args.quiet;
    let summary = tokio::task::spawn_blocking(move || {
        if quiet {
            runner.run(&mut io::sink())
        } else {
            runner.run(&mut io::stdout().lock())
        }
    })
    .await
    .context("simulation task panicked")??;

    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let mut config = match SimulationConfig::load(&args.config) {
        Ok(config) => config,
        Err(Error::InvalidConfig(issues)) => {
            for issue in &issues {
                error!(field = %issue.field, "{}", issue.message);
            }
            bail!(
                "{} is not a valid configuration ({} problems)",
                args.config.display(),
                issues.len()
            );
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to load {}", args.config.display()))
        }
    };

    if let Some(seed) = args.seed {
        config.random_seed = Some(seed);
    }
    if let Some(steps) = args.steps {
        config.num_steps = steps;
        config.run_forever = false;
    }
    if config.run_forever {
        warn!("run_forever is set; stop the simulation with Ctrl+C");
    }
    Ok(config)
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote run summary");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, finishing current tick");
}
