//! API Configuration Module
//!
//! Env-var driven configuration with development defaults. Three groups:
//! general API settings, the reschedule poller, and the optimization
//! executor client.

use std::time::Duration;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// General API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Rolling-plan horizon for first-time plan creation, in days.
    pub plan_horizon_days: i64,

    /// How far ahead availability changes re-materialize windows, in days.
    pub materialize_horizon_days: i64,

    /// Forward horizon of events copied by clone-on-propose, in days.
    pub clone_horizon_days: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(), // Empty = allow all
            plan_horizon_days: 30,
            materialize_horizon_days: 28,
            clone_horizon_days: 183, // ~six months
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TEMPO_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `TEMPO_PLAN_HORIZON_DAYS`: Rolling-plan horizon (default: 30)
    /// - `TEMPO_MATERIALIZE_HORIZON_DAYS`: Window regeneration horizon (default: 28)
    /// - `TEMPO_CLONE_HORIZON_DAYS`: Clone-on-propose event horizon (default: 183)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("TEMPO_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cors_origins,
            plan_horizon_days: env_i64("TEMPO_PLAN_HORIZON_DAYS", defaults.plan_horizon_days),
            materialize_horizon_days: env_i64(
                "TEMPO_MATERIALIZE_HORIZON_DAYS",
                defaults.materialize_horizon_days,
            ),
            clone_horizon_days: env_i64("TEMPO_CLONE_HORIZON_DAYS", defaults.clone_horizon_days),
        }
    }
}

// ============================================================================
// POLLER CONFIGURATION
// ============================================================================

/// Configuration for the background reschedule poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How often to poll for dirty plans (default: 10 seconds).
    pub poll_interval: Duration,

    /// Quiet period applied to new and refreshed queue items
    /// (default: 30 seconds).
    pub debounce: Duration,

    /// Bounded-staleness guarantee: an item first created longer ago than
    /// this is due even while its debounce keeps being refreshed
    /// (default: 5 minutes).
    pub max_debounce_wait: Duration,

    /// Maximum number of plans drained per poll cycle (default: 10).
    pub max_plans_per_poll: i64,

    /// Retry budget for a failed batch before it is marked `FAILED`
    /// (default: 3).
    pub max_retries: i32,

    /// Retention window for completed queue items (default: 24 hours).
    pub completed_retention: Duration,

    /// How often completed items and stale dedup records are purged
    /// (default: 1 hour).
    pub purge_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            debounce: Duration::from_secs(30),
            max_debounce_wait: Duration::from_secs(300),
            max_plans_per_poll: 10,
            max_retries: 3,
            completed_retention: Duration::from_secs(24 * 3600),
            purge_interval: Duration::from_secs(3600),
        }
    }
}

impl PollerConfig {
    /// Create PollerConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TEMPO_POLL_INTERVAL_SECS` (default: 10)
    /// - `TEMPO_DEBOUNCE_SECS` (default: 30)
    /// - `TEMPO_MAX_DEBOUNCE_WAIT_SECS` (default: 300)
    /// - `TEMPO_MAX_PLANS_PER_POLL` (default: 10)
    /// - `TEMPO_QUEUE_MAX_RETRIES` (default: 3)
    /// - `TEMPO_COMPLETED_RETENTION_SECS` (default: 86400)
    /// - `TEMPO_PURGE_INTERVAL_SECS` (default: 3600)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_duration("TEMPO_POLL_INTERVAL_SECS", defaults.poll_interval),
            debounce: env_duration("TEMPO_DEBOUNCE_SECS", defaults.debounce),
            max_debounce_wait: env_duration(
                "TEMPO_MAX_DEBOUNCE_WAIT_SECS",
                defaults.max_debounce_wait,
            ),
            max_plans_per_poll: env_i64("TEMPO_MAX_PLANS_PER_POLL", defaults.max_plans_per_poll),
            max_retries: env_i64("TEMPO_QUEUE_MAX_RETRIES", i64::from(defaults.max_retries))
                as i32,
            completed_retention: env_duration(
                "TEMPO_COMPLETED_RETENTION_SECS",
                defaults.completed_retention,
            ),
            purge_interval: env_duration("TEMPO_PURGE_INTERVAL_SECS", defaults.purge_interval),
        }
    }

    /// Shorter intervals for development/testing.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            debounce: Duration::from_secs(2),
            max_debounce_wait: Duration::from_secs(20),
            max_plans_per_poll: 5,
            max_retries: 2,
            completed_retention: Duration::from_secs(300),
            purge_interval: Duration::from_secs(60),
        }
    }

    pub fn debounce_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.debounce).unwrap_or_else(|_| chrono::Duration::seconds(30))
    }

    pub fn max_wait_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.max_debounce_wait)
            .unwrap_or_else(|_| chrono::Duration::minutes(5))
    }
}

// ============================================================================
// EXECUTOR CONFIGURATION
// ============================================================================

/// Configuration for the optimization executor HTTP client.
///
/// The request timeout is deliberately explicit: a hung optimization
/// surfaces as an executor error and the plan is marked failed, instead of
/// staying in `OPTIMIZING` forever.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Base URL of the optimization service.
    pub base_url: String,

    /// Hard bound on a single optimization request (default: 120 seconds).
    pub request_timeout: Duration,

    /// Additional attempts after a failed request (default: 2).
    pub retry_count: u32,

    /// Delay between attempts (default: 2 seconds).
    pub retry_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            request_timeout: Duration::from_secs(120),
            retry_count: 2,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl ExecutorConfig {
    /// Create ExecutorConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TEMPO_OPTIMIZER_URL` (default: http://localhost:8090)
    /// - `TEMPO_OPTIMIZER_TIMEOUT_SECS` (default: 120)
    /// - `TEMPO_OPTIMIZER_RETRIES` (default: 2)
    /// - `TEMPO_OPTIMIZER_RETRY_DELAY_SECS` (default: 2)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TEMPO_OPTIMIZER_URL").unwrap_or(defaults.base_url),
            request_timeout: env_duration(
                "TEMPO_OPTIMIZER_TIMEOUT_SECS",
                defaults.request_timeout,
            ),
            retry_count: env_i64("TEMPO_OPTIMIZER_RETRIES", i64::from(defaults.retry_count))
                as u32,
            retry_delay: env_duration("TEMPO_OPTIMIZER_RETRY_DELAY_SECS", defaults.retry_delay),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_duration(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
