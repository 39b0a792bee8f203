//! Optimization orchestrator.
//!
//! Coordinates plan cloning, algorithm selection, executor invocation, and
//! committing or failing the proposed plan. An executor failure is
//! absorbed into the plan lifecycle and reported as a structured result,
//! never surfaced as a transport fault.

use chrono::Utc;
use std::time::Instant;
use tempo_core::{
    algorithm_for_strategy, Algorithm, EntityId, Executor, RescheduleBatch, RescheduleStrategy,
    ScheduleResult, StrategyKind, DAY_MS,
};
use tempo_storage::ScheduleStore;

use crate::services::plan_service;
use crate::types::OptimizationResult;

/// How an optimization run is parameterized.
#[derive(Debug, Clone, Copy)]
pub struct OptimizationParams {
    /// Algorithm recorded on the proposed plan.
    pub algorithm: Algorithm,
    /// Strategy handed to the executor.
    pub strategy: RescheduleStrategy,
    /// When true, only a competing proposed plan with the same algorithm
    /// blocks; otherwise any proposed plan does.
    pub check_by_algorithm: bool,
    /// Optional solver-runtime hint.
    pub max_time_sec: Option<i32>,
}

/// Params for the plain reschedule endpoint: always the hybrid default.
pub fn reschedule_params(strategy: Option<RescheduleStrategy>) -> OptimizationParams {
    OptimizationParams {
        algorithm: Algorithm::Hybrid,
        strategy: strategy.unwrap_or(RescheduleStrategy::Ripple),
        check_by_algorithm: false,
        max_time_sec: None,
    }
}

/// Params for a deep-optimize request: strategy maps 1:1 to an algorithm.
pub fn deep_optimize_params(
    strategy: StrategyKind,
    max_time_sec: Option<i32>,
) -> OptimizationParams {
    OptimizationParams {
        algorithm: algorithm_for_strategy(strategy),
        strategy: RescheduleStrategy::OptimalReplan,
        check_by_algorithm: true,
        max_time_sec,
    }
}

/// Params for the fallback-chain endpoint: always the fallback-chain tag.
pub fn fallback_chain_params(max_time_sec: Option<i32>) -> OptimizationParams {
    OptimizationParams {
        algorithm: Algorithm::FallbackChain,
        strategy: RescheduleStrategy::OptimalReplan,
        check_by_algorithm: true,
        max_time_sec,
    }
}

/// Run one optimization pass for a user.
///
/// 1. Load the active plan (`NotFound` if none).
/// 2. Reject when a competing proposed plan exists.
/// 3. Clone the active plan into a proposed version (atomic).
/// 4. Mark it `OPTIMIZING`.
/// 5. Invoke the executor.
/// 6. Executor error → plan `FAILED` with the message, structured failure
///    result returned to the caller.
/// 7. Success → plan back to `PROPOSED` with score/duration, full detail
///    returned for review before apply/discard.
pub async fn execute_optimization(
    store: &dyn ScheduleStore,
    executor: &dyn Executor,
    user_id: EntityId,
    params: OptimizationParams,
    clone_horizon_days: i64,
) -> ScheduleResult<OptimizationResult> {
    let active = plan_service::get_active_plan(store, user_id).await?;

    let algorithm_filter = params.check_by_algorithm.then_some(params.algorithm);
    if store
        .plan_get_proposed(user_id, algorithm_filter)
        .await?
        .is_some()
    {
        return Err(tempo_core::ScheduleError::conflict(
            "a proposed plan already exists; apply or discard it first",
        ));
    }

    let started = Instant::now();

    let cloned = match plan_service::clone_plan(
        store,
        &active,
        params.algorithm,
        clone_horizon_days,
    )
    .await
    {
        Ok(cloned) => cloned,
        Err(err) => {
            tracing::error!(%user_id, error = %err, "plan clone failed");
            return Ok(failure_result(started, err.to_string()));
        }
    };
    let mut plan = cloned.plan;

    if let Err(err) = plan.start_optimization(params.algorithm) {
        return Ok(failure_result(started, err.to_string()));
    }
    store.plan_update(&plan).await?;

    let mut batch = RescheduleBatch::new(user_id, plan.id, params.strategy);
    batch.max_time_sec = params.max_time_sec;

    let outcome = match executor.execute(&batch).await {
        Ok(outcome) => outcome,
        Err(err) => {
            let duration_ms = started.elapsed().as_millis() as i64;
            plan.fail_optimization(err.to_string());
            if let Err(update_err) = store.plan_update(&plan).await {
                tracing::warn!(plan_id = %plan.id, error = %update_err, "failed to persist failed plan");
            }
            tracing::warn!(plan_id = %plan.id, error = %err, "optimization failed");
            return Ok(OptimizationResult {
                success: false,
                duration_ms,
                tasks_scheduled: 0,
                tasks_unscheduled: 0,
                error_message: Some(err.to_string()),
                proposed_plan: None,
            });
        }
    };

    let duration_ms = started.elapsed().as_millis() as i64;
    let score = if outcome.success { 1.0 } else { 0.0 };
    if let Err(err) = plan.complete_optimization(score, duration_ms) {
        tracing::warn!(plan_id = %plan.id, error = %err, "failed to complete optimization");
    } else {
        store.plan_update(&plan).await?;
    }

    // One review month of detail for the caller.
    let review_end = Utc::now().timestamp_millis() + 31 * DAY_MS;
    let proposed_plan =
        match plan_service::get_plan_detail(store, user_id, plan.id, plan.start_date_ms, review_end)
            .await
        {
            Ok(detail) => Some(detail),
            Err(err) => {
                tracing::warn!(plan_id = %plan.id, error = %err, "failed to load proposed plan detail");
                None
            }
        };

    let tasks_unscheduled = proposed_plan
        .as_ref()
        .map(|detail| detail.stats.unscheduled_tasks)
        .unwrap_or(0);

    tracing::info!(
        %user_id,
        plan_id = %plan.id,
        algorithm = %plan.algorithm_used,
        success = outcome.success,
        duration_ms,
        "optimization finished"
    );

    Ok(OptimizationResult {
        success: outcome.success,
        duration_ms,
        tasks_scheduled: outcome.updated_event_ids.len() as i64,
        tasks_unscheduled,
        error_message: None,
        proposed_plan,
    })
}

fn failure_result(started: Instant, message: String) -> OptimizationResult {
    OptimizationResult {
        success: false,
        duration_ms: started.elapsed().as_millis() as i64,
        tasks_scheduled: 0,
        tasks_unscheduled: 0,
        error_message: Some(message),
        proposed_plan: None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
