//! Realty Publisher - Main Entry Point
//! Publication dispatcher + JSON-RPC server over one SQLite database

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use realty_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use realty_core::application::{
    shutdown_channel, BulkOperationCoordinator, PublicationQueue, RecoveryService, StatusHub,
};
use realty_core::port::id_provider::UuidProvider;
use realty_core::port::time_provider::SystemTimeProvider;
use realty_core::port::{JobStore, PortalRegistry, TimeProvider};
use realty_infra_portals::{HttpPortalAdapter, HttpPortalConfig};
use realty_infra_sqlite::{
    create_pool, run_migrations, SqliteBulkOperationStore, SqliteJobStore, SqlitePropertyCatalog,
};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra time granted to in-flight attempts on top of the adapter timeout
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One HTTP adapter per enabled portal table
fn build_registry(settings: &Settings) -> Result<PortalRegistry> {
    let mut registry = PortalRegistry::new();
    for (portal, entry) in settings.enabled_portals()? {
        let mut config = HttpPortalConfig::new(portal, entry.base_url.clone());
        if let Some(api_key) = &entry.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(timeout_ms) = entry.request_timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(timeout_ms));
        }
        let adapter = HttpPortalAdapter::new(config)
            .with_context(|| format!("Failed to build adapter for {}", portal))?;
        registry.register(Arc::new(adapter), entry.settings());
        info!(portal = %portal, base_url = %entry.base_url, "Portal enabled");
    }
    Ok(registry)
}

/// Re-queue jobs left mid-attempt by the previous run.
///
/// The queue only restores `QUEUED` rows, so starting without this would
/// leave interrupted jobs stuck active forever.
async fn recover_interrupted(
    jobs: Arc<dyn JobStore>,
    clock: Arc<dyn TimeProvider>,
) -> Result<usize> {
    let count = RecoveryService::new(jobs, clock)
        .recover_interrupted_jobs()
        .await
        .context("Crash recovery failed")?;
    info!(recovered_jobs = count, "Crash recovery completed");
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let settings = Settings::load()?;
    let _log_guard = logging::init(&settings.log)?;

    info!("Realty Publisher v{} starting...", VERSION);

    let portals = build_registry(&settings)?;
    if portals.portals().is_empty() {
        warn!("No portals enabled; every enqueue will be rejected");
    }

    // 2. Database
    let database_url = settings.database_url();
    info!(database_url = %database_url, "Initializing database...");
    let pool = create_pool(&database_url)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 3. DI wiring
    let clock = Arc::new(SystemTimeProvider);
    let ids = Arc::new(UuidProvider);
    let jobs = Arc::new(SqliteJobStore::new(pool.clone()));
    let operations = Arc::new(SqliteBulkOperationStore::new(pool.clone()));
    let catalog = Arc::new(SqlitePropertyCatalog::new(pool.clone(), clock.clone()));

    // 4. Crash recovery, before the dispatcher can see any job
    info!("Running crash recovery...");
    recover_interrupted(jobs.clone(), clock.clone()).await?;

    let queue_config = settings.queue_config()?;
    let drain_timeout = queue_config.adapter_timeout + SHUTDOWN_GRACE;
    let queue = PublicationQueue::new(
        queue_config,
        jobs.clone(),
        catalog.clone(),
        portals,
        StatusHub::new(),
        ids.clone(),
        clock.clone(),
    );
    let restored = queue
        .restore()
        .await
        .map_err(|e| anyhow::anyhow!("Queue restore failed: {}", e))?;
    info!(restored_jobs = restored, "Queue cache rebuilt");

    // 5. Dispatcher
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let dispatcher = queue.spawn(shutdown_rx);

    // 6. JSON-RPC server (HTTP + WebSocket)
    let bulk = Arc::new(BulkOperationCoordinator::new(
        queue.clone(),
        catalog,
        jobs,
        operations,
        ids,
        clock,
    ));
    let rpc_config = RpcServerConfig {
        host: settings.rpc.host.clone(),
        port: settings.rpc.port,
    };
    let (addr, rpc_handle) = RpcServer::new(rpc_config, RpcHandler::new(queue.clone(), bulk))
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(addr = %addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop intake, then let in-flight attempts finish
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    shutdown_tx.shutdown();
    if tokio::time::timeout(drain_timeout, dispatcher).await.is_err() {
        warn!(
            in_flight = queue.in_flight().await,
            "Dispatcher did not drain in time"
        );
    }

    info!("Shutdown complete.");
    Ok(())
}
