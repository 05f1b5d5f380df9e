use std::path::Path;

use anyhow::Context;
use clap::Parser;
use fleetmon::{
    broadcast::LiveEvent,
    config::{Config, read_config_file},
    monitor::Monitor,
    util::get_config_path,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $FLEETMON_CONFIG or ./fleetmon.json)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleetmon", LevelFilter::DEBUG),
        ("fleetmon_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let path = args.file.clone().unwrap_or_else(get_config_path);

    if args.file.is_none() && !Path::new(&path).exists() {
        info!("no config at {path}, using defaults");
        return Ok(Config::default());
    }

    read_config_file(&path).with_context(|| format!("failed to read config {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = load_config(&args)?;
    let monitor = Monitor::start(config).await?;

    let mut events = monitor.subscribe();
    let observer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LiveEvent::StatusChange { message, .. }) => info!("{message}"),
                Ok(LiveEvent::MetricUpdate {
                    hostname, status, ..
                }) => trace!("{hostname}: {status}"),
                Err(RecvError::Lagged(missed)) => warn!("event log lagged, missed {missed}"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    debug!("received ctrl-c, shutting down");

    monitor.shutdown().await?;
    observer.abort();

    Ok(())
}
