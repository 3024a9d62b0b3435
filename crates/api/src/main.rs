use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use edge_fleet_api::app::{create_app, AppState};
use edge_fleet_api::config::Config;
use edge_fleet_api::jobs::{JobScheduler, PoolMetricsJob, TunnelSweepJob};
use edge_fleet_api::middleware::{init_logging, init_metrics};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging);
    init_metrics()?;

    info!("Starting edge fleet controller v{}", env!("CARGO_PKG_VERSION"));

    let pool = if config.database.is_configured() {
        let db_config = persistence::DatabaseConfig::from(&config.database);
        let pool = persistence::create_pool(&db_config).await?;
        persistence::run_migrations(&pool).await?;
        Some(pool)
    } else {
        warn!("No database configured, using the in-memory store");
        None
    };

    let addr = config.socket_addr()?;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    let idle_timeout = Duration::from_secs(config.edge.tunnel_idle_timeout_secs);

    let state = AppState::new(config, pool.clone());
    let tunnels = state.tunnels.clone();

    let mut scheduler = JobScheduler::new();
    scheduler.register(TunnelSweepJob::new(tunnels.clone(), idle_timeout));
    if let Some(pool) = pool {
        scheduler.register(PoolMetricsJob::new(pool));
    }
    scheduler.start();

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(shutdown_timeout).await;
    tunnels.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
