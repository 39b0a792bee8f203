//! Reschedule Queue Poller
//!
//! Background task that drains the reschedule queue: it periodically asks
//! for plans with due pending items, claims each plan's batch with the
//! store's skip-locked fetch, and runs one optimization pass per plan.
//!
//! Concurrency discipline:
//!
//! - The skip-locked fetch guarantees two pollers (in separate processes)
//!   never claim the same plan's batch.
//! - Within this process a `DashMap` guard prevents re-entering a plan
//!   that is still being processed from a previous cycle.
//! - Plans are processed independently and in parallel; there is no
//!   ordering guarantee across plans.
//!
//! Failure discipline: a failed batch returns to `PENDING` with a fresh
//! quiet period until `max_retries` attempts are consumed, then it is
//! marked `FAILED`. While a proposed plan is awaiting user review the
//! plan's batch is not claimed at all — the triggers stay pending until
//! the proposal is applied or discarded.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempo_core::{EntityId, Executor, QueueStatus, RescheduleBatch, RescheduleQueueItem};
use tempo_storage::ScheduleStore;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::PollerConfig;
use crate::services::optimizer_service::{self, OptimizationParams};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for poller activity.
#[derive(Debug, Default)]
pub struct PollerMetrics {
    /// Poll cycles completed since startup
    pub poll_cycles: AtomicU64,

    /// Batches drained to completion
    pub batches_completed: AtomicU64,

    /// Items returned to pending for retry
    pub items_retried: AtomicU64,

    /// Items terminally failed after exhausting the retry budget
    pub items_failed: AtomicU64,

    /// Errors encountered while polling or draining
    pub poll_errors: AtomicU64,
}

impl PollerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        PollerSnapshot {
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            items_retried: self.items_retried.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of poller metrics at a point in time.
#[derive(Debug, Clone)]
pub struct PollerSnapshot {
    pub poll_cycles: u64,
    pub batches_completed: u64,
    pub items_retried: u64,
    pub items_failed: u64,
    pub poll_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run the reschedule poller until the shutdown signal flips.
pub async fn reschedule_poller_task(
    store: Arc<dyn ScheduleStore>,
    executor: Arc<dyn Executor>,
    config: PollerConfig,
    clone_horizon_days: i64,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<PollerMetrics> {
    let metrics = Arc::new(PollerMetrics::new());
    let in_flight: Arc<DashMap<EntityId, ()>> = Arc::new(DashMap::new());

    let mut poll_tick = interval(config.poll_interval);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut purge_tick = interval(config.purge_interval);
    purge_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        debounce_secs = config.debounce.as_secs(),
        max_debounce_wait_secs = config.max_debounce_wait.as_secs(),
        "Reschedule poller started"
    );

    loop {
        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Reschedule poller shutting down");
                    break;
                }
            }
            _ = poll_tick.tick() => {
                poll_once(
                    &store,
                    &executor,
                    &config,
                    clone_horizon_days,
                    &metrics,
                    &in_flight,
                )
                .await;
            }
            _ = purge_tick.tick() => {
                purge_once(&store, &config, &metrics).await;
            }
        }
    }

    metrics
}

async fn poll_once(
    store: &Arc<dyn ScheduleStore>,
    executor: &Arc<dyn Executor>,
    config: &PollerConfig,
    clone_horizon_days: i64,
    metrics: &Arc<PollerMetrics>,
    in_flight: &Arc<DashMap<EntityId, ()>>,
) {
    metrics.poll_cycles.fetch_add(1, Ordering::Relaxed);

    let now = Utc::now();
    let stale_before = now - config.max_wait_chrono();
    let plan_ids = match store
        .queue_dirty_plan_ids(now, stale_before, config.max_plans_per_poll)
        .await
    {
        Ok(ids) => ids,
        Err(err) => {
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %err, "failed to poll dirty plan ids");
            return;
        }
    };

    for plan_id in plan_ids {
        if in_flight.insert(plan_id, ()).is_some() {
            // Still being processed from a previous cycle.
            continue;
        }

        let store = Arc::clone(store);
        let executor = Arc::clone(executor);
        let config = config.clone();
        let metrics = Arc::clone(metrics);
        let in_flight = Arc::clone(in_flight);
        tokio::spawn(async move {
            process_plan(&*store, &*executor, &config, clone_horizon_days, &metrics, plan_id)
                .await;
            in_flight.remove(&plan_id);
        });
    }
}

/// Drain one plan's due batch: claim, optimize, settle statuses.
pub(crate) async fn process_plan(
    store: &dyn ScheduleStore,
    executor: &dyn Executor,
    config: &PollerConfig,
    clone_horizon_days: i64,
    metrics: &PollerMetrics,
    plan_id: EntityId,
) {
    let started = std::time::Instant::now();
    let now = Utc::now();
    let stale_before = now - config.max_wait_chrono();

    // Defer before claiming anything while a proposal awaits review; the
    // orchestrator would reject the run anyway.
    let plan = match store.plan_get(plan_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            tracing::warn!(%plan_id, "queue items reference a missing plan");
            return;
        }
        Err(err) => {
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(%plan_id, error = %err, "failed to load plan");
            return;
        }
    };
    match store.plan_get_proposed(plan.user_id, None).await {
        Ok(Some(_)) => {
            tracing::debug!(%plan_id, "proposed plan awaiting review, deferring batch");
            return;
        }
        Ok(None) => {}
        Err(err) => {
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(%plan_id, error = %err, "failed to check proposed plans");
            return;
        }
    }

    let items = match store.queue_fetch_and_lock(plan_id, now, stale_before).await {
        Ok(items) => items,
        Err(err) => {
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(%plan_id, error = %err, "failed to claim queue batch");
            return;
        }
    };
    if items.is_empty() {
        return;
    }

    let user_id = items[0].user_id;
    let strategy = RescheduleBatch::determine_strategy(&items);
    let mut batch = RescheduleBatch::new(user_id, plan_id, strategy);
    batch.items = items;
    let ids = batch.item_ids();

    let params = OptimizationParams {
        algorithm: tempo_core::Algorithm::Hybrid,
        strategy,
        check_by_algorithm: false,
        max_time_sec: None,
    };

    tracing::info!(
        %plan_id,
        %user_id,
        items = ids.len(),
        affected_tasks = batch.affected_task_ids().len(),
        ?strategy,
        "draining reschedule batch"
    );

    let run = optimizer_service::execute_optimization(
        store,
        executor,
        user_id,
        params,
        clone_horizon_days,
    )
    .await;

    match run {
        Ok(result) if result.success => {
            let duration_ms = started.elapsed().as_millis() as i64;
            if let Err(err) = store
                .queue_update_status(&ids, QueueStatus::Completed, None, Some(duration_ms))
                .await
            {
                tracing::error!(%plan_id, error = %err, "failed to mark batch completed");
                metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
                return;
            }
            metrics.batches_completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(result) => {
            let message = result
                .error_message
                .unwrap_or_else(|| "optimization reported failure".to_string());
            settle_failure(store, config, metrics, &batch.items, &message).await;
        }
        Err(err) => {
            settle_failure(store, config, metrics, &batch.items, &err.to_string()).await;
        }
    }
}

/// Route failed items back to pending while budget remains, otherwise to
/// terminal failure.
async fn settle_failure(
    store: &dyn ScheduleStore,
    config: &PollerConfig,
    metrics: &PollerMetrics,
    items: &[RescheduleQueueItem],
    message: &str,
) {
    let mut retry_ids = Vec::new();
    let mut failed_ids = Vec::new();
    for item in items {
        if item.retry_count + 1 < config.max_retries {
            retry_ids.push(item.id);
        } else {
            failed_ids.push(item.id);
        }
    }

    let next_due = Utc::now() + config.debounce_chrono();
    if !retry_ids.is_empty() {
        if let Err(err) = store.queue_increment_retry(&retry_ids, next_due).await {
            tracing::error!(error = %err, "failed to requeue items for retry");
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
        }
        metrics
            .items_retried
            .fetch_add(retry_ids.len() as u64, Ordering::Relaxed);
    }

    if !failed_ids.is_empty() {
        if let Err(err) = store
            .queue_update_status(
                &failed_ids,
                QueueStatus::Failed,
                Some(message.to_string()),
                None,
            )
            .await
        {
            tracing::error!(error = %err, "failed to mark items failed");
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
        }
        metrics
            .items_failed
            .fetch_add(failed_ids.len() as u64, Ordering::Relaxed);
        tracing::warn!(items = failed_ids.len(), %message, "queue items exhausted retry budget");
    }
}

async fn purge_once(
    store: &Arc<dyn ScheduleStore>,
    config: &PollerConfig,
    metrics: &Arc<PollerMetrics>,
) {
    let retention = chrono::Duration::from_std(config.completed_retention)
        .unwrap_or_else(|_| chrono::Duration::hours(24));
    let cutoff = Utc::now() - retention;

    match store.queue_purge_completed(cutoff).await {
        Ok(purged) if purged > 0 => {
            tracing::info!(purged, "purged completed queue items");
        }
        Ok(_) => {}
        Err(err) => {
            metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %err, "failed to purge completed queue items");
        }
    }

    if let Err(err) = store.processed_event_purge(cutoff).await {
        metrics.poll_errors.fetch_add(1, Ordering::Relaxed);
        tracing::error!(error = %err, "failed to purge processed-event records");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use tempo_core::{
        new_entity_id, ChangePayload, ExecutorOutcome, ScheduleError, ScheduleResult,
    };
    use tempo_storage::{MemoryStore, ScheduleStore as _};

    struct StubExecutor {
        outcome: ScheduleResult<ExecutorOutcome>,
    }

    #[async_trait]
    impl Executor for StubExecutor {
        async fn execute(&self, _batch: &RescheduleBatch) -> ScheduleResult<ExecutorOutcome> {
            self.outcome.clone()
        }
    }

    fn success_executor() -> StubExecutor {
        StubExecutor {
            outcome: Ok(ExecutorOutcome {
                success: true,
                updated_event_ids: vec![new_entity_id()],
                duration_ms: 10,
            }),
        }
    }

    fn failing_executor() -> StubExecutor {
        StubExecutor {
            outcome: Err(ScheduleError::executor("optimizer unreachable")),
        }
    }

    async fn seed(store: &MemoryStore) -> (EntityId, EntityId) {
        let user = new_entity_id();
        let plan = crate::services::plan_service::get_or_create_active_plan(
            store,
            user,
            new_entity_id(),
            30,
        )
        .await
        .unwrap();

        let task_row = new_entity_id();
        let mut item = tempo_core::RescheduleQueueItem::new(
            user,
            plan.id,
            task_row,
            ChangePayload::TaskAdded { task_id: task_row },
            Duration::seconds(0),
        );
        item.debounce_until = Utc::now() - Duration::seconds(1);
        store.insert_queue_item_raw(item);

        (user, plan.id)
    }

    fn test_config() -> PollerConfig {
        let mut config = PollerConfig::development();
        config.max_retries = 2;
        config
    }

    #[tokio::test]
    async fn test_successful_drain_completes_batch() {
        let store = MemoryStore::new();
        let executor = success_executor();
        let metrics = PollerMetrics::new();
        let (_user, plan_id) = seed(&store).await;

        process_plan(&store, &executor, &test_config(), 183, &metrics, plan_id).await;

        assert_eq!(store.queue_pending_count(plan_id).await.unwrap(), 0);
        assert_eq!(metrics.snapshot().batches_completed, 1);
        assert_eq!(metrics.snapshot().items_failed, 0);

        // Completed items purge after retention.
        let purged = store
            .queue_purge_completed(Utc::now() + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }

    #[tokio::test]
    async fn test_failed_drain_retries_then_fails() {
        let store = MemoryStore::new();
        let executor = failing_executor();
        let metrics = PollerMetrics::new();
        let config = test_config();
        let (user, plan_id) = seed(&store).await;

        // First attempt: retried back to pending.
        process_plan(&store, &executor, &config, 183, &metrics, plan_id).await;
        assert_eq!(store.queue_pending_count(plan_id).await.unwrap(), 1);
        assert_eq!(metrics.snapshot().items_retried, 1);

        // The failed proposed plan blocks the next run; discard it the way
        // a user would so retries can proceed.
        let failed = store
            .plan_list_by_status(user, tempo_core::PlanStatus::Failed, 10, 0)
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        crate::services::plan_service::discard_plan(&store, user, failed[0].id)
            .await
            .unwrap();

        // Make the retried item due again.
        let now = Utc::now();
        let items = store
            .queue_fetch_and_lock(plan_id, now + Duration::hours(1), now)
            .await
            .unwrap();
        store
            .queue_increment_retry(
                &items.iter().map(|i| i.id).collect::<Vec<_>>(),
                now - Duration::seconds(1),
            )
            .await
            .unwrap();

        // Second attempt exhausts the budget (max_retries = 2).
        process_plan(&store, &executor, &config, 183, &metrics, plan_id).await;
        assert_eq!(store.queue_pending_count(plan_id).await.unwrap(), 0);
        assert!(metrics.snapshot().items_failed >= 1);
    }

    #[tokio::test]
    async fn test_pending_proposal_defers_batch() {
        let store = MemoryStore::new();
        let executor = success_executor();
        let metrics = PollerMetrics::new();
        let config = test_config();
        let (user, plan_id) = seed(&store).await;

        // Pre-existing proposed plan awaiting review.
        let active = store.plan_get_active(user).await.unwrap().unwrap();
        crate::services::plan_service::clone_plan(
            &store,
            &active,
            tempo_core::Algorithm::Hybrid,
            183,
        )
        .await
        .unwrap();

        process_plan(&store, &executor, &config, 183, &metrics, plan_id).await;

        // Deferred: still pending and claimable, no retry budget consumed.
        assert_eq!(store.queue_pending_count(plan_id).await.unwrap(), 1);
        let now = Utc::now();
        let items = store
            .queue_fetch_and_lock(plan_id, now + Duration::hours(1), now)
            .await
            .unwrap();
        assert_eq!(items[0].retry_count, 0);
        assert_eq!(metrics.snapshot().items_failed, 0);
    }

    #[tokio::test]
    async fn test_empty_plan_is_noop() {
        let store = MemoryStore::new();
        let executor = success_executor();
        let metrics = PollerMetrics::new();

        process_plan(
            &store,
            &executor,
            &test_config(),
            183,
            &metrics,
            new_entity_id(),
        )
        .await;
        assert_eq!(metrics.snapshot().batches_completed, 0);
        assert_eq!(metrics.snapshot().poll_errors, 0);
    }
}
