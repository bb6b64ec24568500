//! kyc-pd - Compliance Pipeline Daemon
//!
//! Wires the tiered store, ephemeral cache, event bus, anomaly detector,
//! and pipeline coordinator, then subscribes the stage workers and runs
//! until interrupted.

use anyhow::Result;
use clap::Parser;
use kyc_common::config::{BusMode, PipelineConfig};
use kyc_common::events::{EventBus, MockEventBus};
use kyc_pd::anomaly::AnomalyDetector;
use kyc_pd::bus::RedisEventBus;
use kyc_pd::cache::{Cache, MemoryCache, RedisCache};
use kyc_pd::classify::KeywordClassifier;
use kyc_pd::coordinator::PipelineCoordinator;
use kyc_pd::rules::StandardRules;
use kyc_pd::store::{SqliteTier, TieredStore};
use kyc_pd::workers;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kyc-pd", about = "KYC compliance pipeline daemon")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the durable store connection string
    #[arg(long)]
    database_url: Option<String>,

    /// Override the cache/broker endpoint
    #[arg(long)]
    redis_url: Option<String>,

    /// Use the in-process mock bus regardless of configuration
    #[arg(long)]
    mock_bus: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting kyc-pd (compliance pipeline daemon)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = PipelineConfig::resolve(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(url) = args.redis_url {
        config.redis.url = Some(url);
    }
    if args.mock_bus {
        config.bus.mode = BusMode::Mock;
    }

    let op_timeout = Duration::from_millis(config.store.op_timeout_ms);
    let reprobe_interval = Duration::from_secs(config.store.reprobe_interval_secs);

    // Durable tier + in-memory fallback
    let pool = kyc_common::db::init_database(&config.database.url).await?;
    let store = Arc::new(TieredStore::new(
        Arc::new(SqliteTier::new(pool)),
        op_timeout,
        reprobe_interval,
    ));

    // Cache: redis when configured, otherwise in-process
    let cache: Arc<dyn Cache> = match &config.redis.url {
        Some(url) => match RedisCache::connect(url, op_timeout).await {
            Ok(cache) => {
                info!("Cache backend connected");
                Arc::new(cache)
            }
            Err(e) => {
                warn!(error = %e, "Cache backend unavailable, continuing without cache");
                Arc::new(MemoryCache::new())
            }
        },
        None => {
            info!("No cache backend configured, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };

    // Event bus: broker when configured and reachable, otherwise mock
    let bus: Arc<dyn EventBus> = match (config.bus.mode, &config.redis.url) {
        (BusMode::Broker, Some(url)) => match RedisEventBus::connect(url, op_timeout).await {
            Ok(bus) => Arc::new(bus),
            Err(e) => {
                warn!(error = %e, "Broker unavailable, falling back to mock bus");
                Arc::new(MockEventBus::new())
            }
        },
        (BusMode::Broker, None) => {
            warn!("Broker bus requested but no endpoint configured, using mock bus");
            Arc::new(MockEventBus::new())
        }
        (BusMode::Mock, _) => {
            info!("Using in-process mock bus");
            Arc::new(MockEventBus::new())
        }
    };

    let anomaly = AnomalyDetector::new(
        cache.clone(),
        &config.anomaly,
        Duration::from_secs(config.cache.alert_ttl_secs),
    );

    let coordinator = Arc::new(PipelineCoordinator::new(
        store,
        cache,
        bus.clone(),
        anomaly,
        Arc::new(StandardRules::new()),
        Arc::new(KeywordClassifier::new()),
        &config.cache,
    ));

    workers::spawn_stage_workers(coordinator.clone(), bus).await?;
    info!("Pipeline stages subscribed, daemon ready");

    tokio::signal::ctrl_c().await?;
    info!(store_status = ?coordinator.store_status(), "Shutting down");

    Ok(())
}
