//! Shared application state for Axum routers.

use std::sync::Arc;

use tempo_core::Executor;
use tempo_storage::ScheduleStore;

use crate::config::{ApiConfig, PollerConfig};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Storage backend (PostgreSQL in production, in-memory in dev mode).
    pub store: Arc<dyn ScheduleStore>,
    /// Optimization executor invoked by the orchestrator.
    pub executor: Arc<dyn Executor>,
    pub config: Arc<ApiConfig>,
    pub poller_config: Arc<PollerConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        executor: Arc<dyn Executor>,
        config: ApiConfig,
        poller_config: PollerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config: Arc::new(config),
            poller_config: Arc::new(poller_config),
            start_time: std::time::Instant::now(),
        }
    }
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<dyn ScheduleStore>, store);
crate::impl_from_ref!(Arc<dyn Executor>, executor);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<PollerConfig>, poller_config);
crate::impl_from_ref!(std::time::Instant, start_time);
