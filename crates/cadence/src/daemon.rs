//! Daemon command: wire the store, collaborators, and processor together
//! and run the processing loop until shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use cadence_analytics::AnalyticsEngine;
use cadence_processor::{ProcessorConfig, QueueProcessor};
use cadence_queue::{ContentSelector, DestinationKind, DestinationRegistry, QueueManager};
use cadence_scheduler::Scheduler;
use cadence_store::{QueueStore, SourceKind};

use crate::clients::{FsContentSource, LogDestination};

/// Configuration for the daemon.
pub struct DaemonConfig {
    pub database: PathBuf,
    pub library: Option<PathBuf>,
    pub accounts: String,
    pub interval: u64,
    pub batch_size: u32,
    pub horizon_days: u32,
}

/// Parse `id=kind` account pairs from the CLI/env string.
fn parse_accounts(accounts: &str) -> Result<Vec<(String, DestinationKind)>> {
    let mut parsed = Vec::new();
    for pair in accounts.split(',').filter(|p| !p.trim().is_empty()) {
        let (id, kind) = pair
            .split_once('=')
            .ok_or_else(|| miette::miette!("invalid account pair '{pair}', expected id=kind"))?;
        let kind: DestinationKind = kind
            .trim()
            .parse()
            .map_err(|e: String| miette::miette!("{e}"))?;
        parsed.push((id.trim().to_string(), kind));
    }
    Ok(parsed)
}

fn build_processor(
    database: &Path,
    library: Option<PathBuf>,
    accounts: &str,
    config: ProcessorConfig,
) -> Result<QueueProcessor> {
    let store = Arc::new(
        QueueStore::open(database).map_err(|e| miette::miette!("failed to open store: {e}"))?,
    );
    let manager = Arc::new(QueueManager::new(store.clone()));

    let mut registry = DestinationRegistry::new();
    let pairs = parse_accounts(accounts)?;
    for (id, kind) in &pairs {
        registry.register_account(id.clone(), *kind);
        registry.register_client(Arc::new(LogDestination::new(*kind)));
    }
    info!(accounts = pairs.len(), "registered destination accounts");
    let registry = Arc::new(registry);

    let mut selector = ContentSelector::new(store.clone());
    let source = library.map(|root| Arc::new(FsContentSource::new(root)));
    if let Some(source) = &source {
        selector.register_source(SourceKind::Library, source.clone());
    }
    let selector = Arc::new(selector);

    let analytics = Arc::new(AnalyticsEngine::new(store.clone(), registry.clone()));
    let scheduler = Arc::new(Scheduler::new(store.clone(), analytics));

    let mut processor = QueueProcessor::new(store, manager, selector, scheduler, registry, config);
    if let Some(source) = source {
        processor.register_source(SourceKind::Library, source);
    }
    Ok(processor)
}

/// Run the processing loop until ctrl-c.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let processor = build_processor(
        &config.database,
        config.library,
        &config.accounts,
        ProcessorConfig {
            interval: Duration::from_secs(config.interval),
            batch_size: config.batch_size,
            horizon_days: config.horizon_days,
            ..ProcessorConfig::default()
        },
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    processor.run(shutdown_rx).await;
    Ok(())
}

/// Run one processing pass (or one entry) and exit.
pub async fn process_once(
    database: &Path,
    library: Option<PathBuf>,
    accounts: &str,
    entry: Option<Uuid>,
) -> Result<()> {
    let processor = build_processor(database, library, accounts, ProcessorConfig::default())?;

    match entry {
        Some(id) => {
            let status = processor
                .process_single(id)
                .await
                .map_err(|e| miette::miette!("{e}"))?;
            match status {
                Some(status) => info!(entry_id = %id, %status, "entry processed"),
                None => info!(entry_id = %id, "entry was not in a processable state"),
            }
        }
        None => {
            let summary = processor
                .process()
                .await
                .map_err(|e| miette::miette!("{e}"))?;
            info!(
                processed = summary.processed,
                posted = summary.posted,
                failed = summary.failed,
                materialized = summary.materialized,
                cleaned = summary.cleaned,
                "pass complete"
            );
        }
    }
    Ok(())
}

/// Print queue health counters for an owner as JSON.
pub fn print_health(database: &Path, owner: &str) -> Result<()> {
    let store =
        QueueStore::open(database).map_err(|e| miette::miette!("failed to open store: {e}"))?;
    let manager = QueueManager::new(Arc::new(store));
    let health = manager
        .health(owner)
        .map_err(|e| miette::miette!("{e}"))?;
    let json =
        serde_json::to_string_pretty(&health).map_err(|e| miette::miette!("{e}"))?;
    println!("{json}");
    Ok(())
}
