//! Tempo API Server Entry Point
//!
//! Bootstraps configuration, the storage backend, the executor client, and
//! the background reschedule poller, then serves the Axum router until a
//! shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use tempo_api::{
    create_api_router, jobs, ApiConfig, ApiError, ApiResult, AppState, DbConfig, ExecutorConfig,
    HttpExecutor, PgStore, PollerConfig,
};
use tempo_core::Executor;
use tempo_storage::{MemoryStore, ScheduleStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let api_config = ApiConfig::from_env();
    let poller_config = PollerConfig::from_env();

    // TEMPO_STORE=memory runs without PostgreSQL for local development.
    let store: Arc<dyn ScheduleStore> = match std::env::var("TEMPO_STORE").as_deref() {
        Ok("memory") => {
            tracing::warn!("using in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
        _ => {
            let db_config = DbConfig::from_env();
            Arc::new(
                PgStore::from_config(&db_config)
                    .map_err(|e| ApiError::internal_error(e.to_string()))?,
            )
        }
    };

    let executor_config = ExecutorConfig::from_env();
    let executor: Arc<dyn Executor> = Arc::new(
        HttpExecutor::new(executor_config).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = tokio::spawn(jobs::reschedule_poller_task(
        Arc::clone(&store),
        Arc::clone(&executor),
        poller_config.clone(),
        api_config.clone_horizon_days,
        shutdown_rx,
    ));

    let state = AppState::new(store, executor, api_config, poller_config);
    let app = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Tempo API server");

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
    if let Ok(metrics) = poller_handle.await {
        let snapshot = metrics.snapshot();
        tracing::info!(
            poll_cycles = snapshot.poll_cycles,
            batches_completed = snapshot.batches_completed,
            "Reschedule poller stopped"
        );
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("TEMPO_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("TEMPO_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
