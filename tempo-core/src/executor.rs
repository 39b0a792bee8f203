//! Pluggable optimization executor contract.
//!
//! The orchestrator clones the active plan, then hands the proposed plan to
//! an [`Executor`]. The executor owns the actual solving (and bounding its
//! own runtime); this crate only defines the seam.

use crate::enums::{Algorithm, StrategyKind};
use crate::error::ScheduleResult;
use crate::queue::RescheduleBatch;
use crate::EntityId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of one executor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ExecutorOutcome {
    /// Whether every schedulable task was placed.
    pub success: bool,
    /// Events the executor created or rewrote in the proposed plan.
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>, format = "uuid"))]
    pub updated_event_ids: Vec<EntityId>,
    pub duration_ms: i64,
}

/// Capability to run an optimization pass over a proposed plan.
///
/// Implementations mutate the proposed plan's events/tasks through their own
/// channel and report what changed. An `Err` means the pass could not run at
/// all; `success: false` means it ran but left tasks unscheduled.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, batch: &RescheduleBatch) -> ScheduleResult<ExecutorOutcome>;
}

/// Map a requested solver strategy onto the algorithm recorded on the plan.
///
/// Pure, table-driven, no side effects. The plain reschedule endpoint always
/// uses [`Algorithm::Hybrid`] and the fallback-chain endpoint always uses
/// [`Algorithm::FallbackChain`]; only deep-optimize callers pick a strategy.
pub fn algorithm_for_strategy(strategy: StrategyKind) -> Algorithm {
    match strategy {
        StrategyKind::CpSat => Algorithm::CpSat,
        StrategyKind::Milp => Algorithm::Milp,
        StrategyKind::LocalSearch => Algorithm::LocalSearch,
        StrategyKind::Heuristic => Algorithm::Heuristic,
        StrategyKind::Auto => Algorithm::Hybrid,
    }
}
