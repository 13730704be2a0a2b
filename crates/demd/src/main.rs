//! demd - Diagnostic Event Manager daemon
//!
//! Loads a DEM configuration, restores fault memory from an NV directory,
//! runs the main function periodically and replays an optional monitor
//! scenario. Ctrl-C flushes all NV blocks before exiting.
//!
//! # Usage
//!
//! ```bash
//! demd --config config/demd.toml --nv-dir /tmp/dem-nv --scenario config/scenario.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dem::{
    Dem, DemConfig, DtcNumber, FileNvStorage, MemoryNvStorage, Notification, NvStorage,
    StaticDataProvider,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod scenario;

use scenario::{Scenario, ScenarioPlayer};

#[derive(Parser, Debug)]
#[command(name = "demd")]
#[command(about = "Diagnostic Event Manager host daemon")]
struct Args {
    /// DEM configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Directory holding one file per NV block
    /// Without it, fault memory lives in RAM only
    #[arg(long)]
    nv_dir: Option<PathBuf>,

    /// Main function period in milliseconds
    #[arg(long, default_value_t = 10)]
    period_ms: u64,

    /// Monitor scenario to replay (TOML)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "demd=debug,dem=debug"
    } else {
        "demd=info,dem=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting demd (Diagnostic Event Manager daemon)");

    info!("Loading config from: {}", args.config.display());
    let config = DemConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let nv: Arc<dyn NvStorage> = match &args.nv_dir {
        Some(dir) => {
            info!("Persisting NV blocks in {}", dir.display());
            Arc::new(FileNvStorage::new(dir).context("failed to open NV directory")?)
        }
        None => {
            warn!("No NV directory given, fault memory is not persisted");
            Arc::new(MemoryNvStorage::new())
        }
    };

    let scenario = match &args.scenario {
        Some(path) => {
            info!("Loading scenario from: {}", path.display());
            Scenario::load(path)?
        }
        None => Scenario::default(),
    };
    let mut player = ScenarioPlayer::new(&scenario, &config)?;

    let dem = Dem::new(config, nv, Arc::new(StaticDataProvider::new()))?;
    let report = dem.init()?;
    info!(
        layout_matched = report.layout_matched,
        entries = report.entries,
        reinitialised = report.reinitialised,
        "Fault memory restored"
    );

    let logger = tokio::spawn(log_notifications(dem.subscribe()));

    let mut interval = tokio::time::interval(Duration::from_millis(args.period_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                player.run_tick(&dem, tick);
                dem.main_function();
                tick += 1;
            }
            result = &mut shutdown => {
                result.context("failed to listen for Ctrl-C")?;
                info!(tick, "Shutdown requested");
                break;
            }
        }
    }

    dem.shutdown().context("failed to flush NV blocks")?;
    logger.abort();
    info!(runtime_checks = dem.runtime_check_count(), "demd stopped");
    Ok(())
}

async fn log_notifications(mut rx: tokio::sync::broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => log_notification(&notification),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification log lagging"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::EventStatusChanged { event, old, new } => {
            debug!(event = %event, old = %old, new = %new, "Event status changed");
        }
        Notification::DtcStatusChanged { dtc, old, new } => {
            info!(
                dtc = %DtcNumber(*dtc),
                code = %DtcNumber(*dtc).code(),
                old = %old,
                new = %new,
                "DTC status changed"
            );
        }
        Notification::EventDataChanged { event } => {
            debug!(event = %event, "Event data captured");
        }
        Notification::ClearDtcCompleted { client, success } => {
            info!(client = client.0, success, "Clear completed");
        }
    }
}
