//! Streetlight Fault Sync Service - Main Entry Point

mod settings;

use anyhow::Context;
use chrono::Utc;
use debounce::{DebounceTracker, FileStore};
use fault_sync::{RunLease, SyncError, SyncJob};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use storage::{SourceSettings, SqliteCheckpoints, SqliteIncidents, SqliteSource};
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let cfg = settings::ServiceConfig::load(config_path.as_deref())?;
    init_logging(&cfg.service.log_level);

    info!("=== {} v{} ===", cfg.service.name, env!("CARGO_PKG_VERSION"));

    if let Some(addr) = &cfg.service.metrics_addr {
        let addr: std::net::SocketAddr = addr.parse().context("invalid metrics address")?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to start metrics exporter")?;
        info!(%addr, "Metrics exporter listening");
    }

    let source_pool = connect(&cfg.database.source_url).await?;
    let target_pool = connect(&cfg.database.target_url).await?;
    SqliteSource::migrate(&source_pool).await?;
    SqliteIncidents::migrate(&target_pool).await?;
    SqliteCheckpoints::migrate(&target_pool).await?;

    let source = SqliteSource::new(
        source_pool,
        SourceSettings {
            comm_tag: cfg.sync.comm_tag.clone(),
            power_tag: cfg.sync.power_tag.clone(),
            ..Default::default()
        },
    );
    let incidents = SqliteIncidents::new(target_pool.clone());
    let checkpoints = SqliteCheckpoints::new(target_pool);
    let tracker = DebounceTracker::new(FileStore::open(&cfg.sync.debounce_path));
    let lease = RunLease::new(Duration::from_secs(cfg.sync.lease_ttl_secs));

    let mut job = SyncJob::new(
        source,
        incidents,
        checkpoints,
        tracker,
        cfg.rules.clone(),
        cfg.mapping.clone(),
        cfg.job_settings(),
        lease,
    );

    info!(
        interval_secs = cfg.service.interval_secs,
        dry_run = cfg.service.dry_run,
        "Scheduler started"
    );
    let mut ticker = interval(Duration::from_secs(cfg.service.interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match job.run(Utc::now()).await {
                    Ok(stats) => info!(
                        processed = stats.processed,
                        skipped = stats.skipped,
                        errors = stats.errors,
                        "Scheduled run finished"
                    ),
                    Err(SyncError::AlreadyRunning) => {
                        warn!("Previous run still in progress, skipping this trigger");
                    }
                    Err(e) => error!(error = %e, "Scheduled run failed"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received, stopping scheduler");
                break;
            }
        }
    }

    Ok(())
}

async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url: {url}"))?
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to connect to {url}"))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
