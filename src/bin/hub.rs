use std::sync::Arc;
#[cfg(feature = "api")]
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use transmitter_poller::{
    Poller,
    config::{Config, StorageConfig, read_config_file},
    directory::MemoryDirectory,
    snmp::UdpTransport,
    store::{MemoryStore, MetricsStore},
};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "SNMP polling hub for FM transmitters")]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log at TRACE instead of DEBUG
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("transmitter_poller", level),
        ("txpoll_hub", level),
        ("tower_http", LevelFilter::INFO),
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let store = open_store(&config.storage).await?;
    let directory = Arc::new(MemoryDirectory::with_records(
        config.transmitters.clone(),
        config.sites.clone(),
    ));

    let poller = Poller::new(
        Arc::new(UdpTransport::new()),
        directory,
        Some(store),
        config.poller.result_capacity,
    );

    register_devices(&poller, &config).await;

    if config.poller.autostart {
        poller.start().await;
    } else {
        // configured devices armed themselves on add
        poller.stop().await;
        info!("autostart disabled, waiting for POST /api/v1/poller/start");
    }

    #[cfg(feature = "api")]
    {
        use transmitter_poller::api::{ApiConfig, ApiState, spawn_api_server};

        let state = ApiState::new(
            poller.clone(),
            Duration::from_secs(config.poller.stream_interval_secs.max(1)),
        );
        spawn_api_server(ApiConfig::from(&config.api), state)
            .await
            .context("failed to start API server")?;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    poller.shutdown().await;

    Ok(())
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn MetricsStore>> {
    match storage {
        StorageConfig::None => {
            debug!("using in-memory metrics store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = transmitter_poller::store::sqlite::SqliteStore::new(path)
                .await
                .with_context(|| format!("failed to open SQLite store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            warn!("built without storage-sqlite, falling back to in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

async fn register_devices(poller: &Poller, config: &Config) {
    for device in &config.devices {
        let host = device.host.clone();
        if let Err(e) = poller.add_device(device.clone()).await {
            error!("skipping configured device {host}: {e}");
        }
    }

    let count = poller.list_devices().await.len();
    if count == 0 {
        warn!("no devices configured, add them via the API");
    } else {
        debug!("{count} device(s) registered from config");
    }
}
