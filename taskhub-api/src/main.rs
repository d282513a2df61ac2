//! TaskHub API Server Entry Point
//!
//! Loads configuration, opens the selected store, starts the timeout
//! sweeper and serves the Axum router until Ctrl-C.

use std::sync::Arc;

use taskhub_api::telemetry::init_tracing;
use taskhub_api::{
    create_api_router, run_migrations, timeout_sweep_task, ApiConfig, ApiError, ApiResult,
    AppState, DbConfig, PgStore, StoreKind, TimeoutSweepConfig,
};
use taskhub_market::Market;
use taskhub_storage::{MarketStore, MemoryStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let config = ApiConfig::from_env()?;
    init_tracing(config.log_format)?;

    let store = open_store(config.store).await?;
    let market = Market::with_system_clock(store);

    let sweep_config = TimeoutSweepConfig::from_env();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if sweep_config.enabled {
        Some(tokio::spawn(timeout_sweep_task(
            market.clone(),
            sweep_config,
            shutdown_rx,
        )))
    } else {
        tracing::info!("Timeout sweep task disabled");
        None
    };

    let addr = config.socket_addr()?;
    let app = create_api_router(AppState::new(market, config));

    tracing::info!(%addr, "Starting TaskHub API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Timeout sweep task did not shut down cleanly");
        }
    }

    Ok(())
}

async fn open_store(kind: StoreKind) -> ApiResult<Arc<dyn MarketStore>> {
    match kind {
        StoreKind::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Postgres => {
            let db_config = DbConfig::from_env();
            let pool = db_config.create_pool()?;
            run_migrations(&pool).await?;
            tracing::info!(
                host = %db_config.host,
                dbname = %db_config.dbname,
                "Connected to Postgres"
            );
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}
