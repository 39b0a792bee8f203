//! Tempo API
//!
//! REST surface, business services, PostgreSQL storage, and the background
//! reschedule poller for the Tempo scheduling engine.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod jobs;
pub mod macros;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod types;

pub use client::HttpExecutor;
pub use config::{ApiConfig, ExecutorConfig, PollerConfig};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
