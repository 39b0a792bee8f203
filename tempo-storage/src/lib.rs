//! Tempo Storage - Storage Trait and In-Memory Implementation
//!
//! Defines the storage abstraction for Tempo entities. The PostgreSQL
//! implementation lives in `tempo-api`; [`MemoryStore`] here backs tests
//! and development mode.
//!
//! Multi-row invariants (window replacement, plan cloning, event split
//! re-indexing, queue dequeue) are single trait methods so that every
//! backend implements them atomically: the transaction boundary is the
//! method, and no transaction handle leaks through the interface.

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use tempo_core::{
    AvailabilityRule, CalendarException, EntityId, EventStatus, PlanStatus, QueueStatus,
    RescheduleQueueItem, ScheduleEvent, SchedulePlan, ScheduleResult, ScheduleTask,
    ScheduleWindow, Timestamp,
};

/// Storage abstraction for all Tempo entities.
///
/// Method families are prefixed by entity. Unless documented otherwise a
/// method touches a single row; the composite methods at the end of each
/// family are atomic multi-row operations.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    // ========================================================================
    // AVAILABILITY RULES
    // ========================================================================

    /// All availability rules for a user, active and inactive.
    async fn availability_list(&self, user_id: EntityId) -> ScheduleResult<Vec<AvailabilityRule>>;

    /// Replace a user's rules wholesale (delete-then-insert, atomic).
    async fn availability_replace(
        &self,
        user_id: EntityId,
        rules: Vec<AvailabilityRule>,
    ) -> ScheduleResult<Vec<AvailabilityRule>>;

    // ========================================================================
    // CALENDAR EXCEPTIONS
    // ========================================================================

    async fn exception_list(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<CalendarException>>;

    async fn exception_insert(&self, exception: &CalendarException) -> ScheduleResult<()>;

    async fn exception_get(&self, id: EntityId) -> ScheduleResult<Option<CalendarException>>;

    /// Returns `false` when no row matched.
    async fn exception_delete(&self, id: EntityId, user_id: EntityId) -> ScheduleResult<bool>;

    // ========================================================================
    // SCHEDULE WINDOWS
    // ========================================================================

    async fn window_list(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<ScheduleWindow>>;

    /// Atomically delete every window of the user in `[from, to]` and
    /// insert the given replacement set.
    async fn window_replace_range(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
        windows: Vec<ScheduleWindow>,
    ) -> ScheduleResult<()>;

    // ========================================================================
    // SCHEDULE PLANS
    // ========================================================================

    async fn plan_insert(&self, plan: &SchedulePlan) -> ScheduleResult<()>;

    async fn plan_get(&self, id: EntityId) -> ScheduleResult<Option<SchedulePlan>>;

    async fn plan_update(&self, plan: &SchedulePlan) -> ScheduleResult<()>;

    /// Atomically persist several plan rows (apply = archive + activate).
    async fn plan_update_many(&self, plans: &[SchedulePlan]) -> ScheduleResult<()>;

    async fn plan_get_active(&self, user_id: EntityId) -> ScheduleResult<Option<SchedulePlan>>;

    /// Latest plan in `Proposed` or `Optimizing` state for the user,
    /// optionally restricted to one algorithm family.
    async fn plan_get_proposed(
        &self,
        user_id: EntityId,
        algorithm: Option<tempo_core::Algorithm>,
    ) -> ScheduleResult<Option<SchedulePlan>>;

    async fn plan_list_by_status(
        &self,
        user_id: EntityId,
        status: PlanStatus,
        limit: i64,
        offset: i64,
    ) -> ScheduleResult<Vec<SchedulePlan>>;

    async fn plan_count_by_status(
        &self,
        user_id: EntityId,
        status: PlanStatus,
    ) -> ScheduleResult<i64>;

    /// Atomic deep insert: the new plan plus its cloned tasks and events,
    /// and any plan rows that must change in the same transaction (e.g.
    /// archiving the previously active plan on revert). Failure leaves no
    /// partial state.
    async fn plan_insert_deep(
        &self,
        plan: &SchedulePlan,
        tasks: &[ScheduleTask],
        events: &[ScheduleEvent],
        plan_updates: &[SchedulePlan],
    ) -> ScheduleResult<()>;

    // ========================================================================
    // SCHEDULE TASKS
    // ========================================================================

    async fn task_insert(&self, task: &ScheduleTask) -> ScheduleResult<()>;

    async fn task_update(&self, task: &ScheduleTask) -> ScheduleResult<()>;

    async fn task_get(&self, id: EntityId) -> ScheduleResult<Option<ScheduleTask>>;

    /// Snapshot row for `(plan, external task)` if present.
    async fn task_get_by_plan_and_task(
        &self,
        plan_id: EntityId,
        task_id: EntityId,
    ) -> ScheduleResult<Option<ScheduleTask>>;

    async fn task_list_by_plan(&self, plan_id: EntityId) -> ScheduleResult<Vec<ScheduleTask>>;

    async fn task_list_by_ids(&self, ids: &[EntityId]) -> ScheduleResult<Vec<ScheduleTask>>;

    async fn task_delete(&self, id: EntityId) -> ScheduleResult<bool>;

    // ========================================================================
    // SCHEDULE EVENTS
    // ========================================================================

    /// Insert-or-update by id, atomic over the whole batch.
    async fn event_save_batch(&self, events: &[ScheduleEvent]) -> ScheduleResult<()>;

    async fn event_get(&self, id: EntityId) -> ScheduleResult<Option<ScheduleEvent>>;

    /// Events of a plan with `date_ms` in the inclusive day range.
    async fn event_list_by_plan_range(
        &self,
        plan_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<ScheduleEvent>>;

    async fn event_list_by_task(&self, task_id: EntityId) -> ScheduleResult<Vec<ScheduleEvent>>;

    async fn event_count_by_task_and_status(
        &self,
        task_id: EntityId,
        status: EventStatus,
    ) -> ScheduleResult<i64>;

    /// Atomic move: persist the relocated event, the re-pinned owning task,
    /// and (when the move collided) the reschedule trigger.
    async fn event_move_apply(
        &self,
        event: &ScheduleEvent,
        task: &ScheduleTask,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()>;

    /// Atomic completion: persist the done event, the task row when the
    /// last part completed, and the reschedule trigger.
    async fn event_complete_apply(
        &self,
        event: &ScheduleEvent,
        task: Option<&ScheduleTask>,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()>;

    /// Atomic split. `original` arrives already shrunk with `total_parts`
    /// bumped; `new_part` carries `part_index = original.part_index + 1`.
    /// The store shifts `part_index` of every later sibling part up by one,
    /// rewrites `total_parts` across the task, persists both events, and
    /// records the trigger.
    async fn event_split_apply(
        &self,
        original: &ScheduleEvent,
        new_part: &ScheduleEvent,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()>;

    async fn event_update(&self, event: &ScheduleEvent) -> ScheduleResult<()>;

    // ========================================================================
    // RESCHEDULE QUEUE
    // ========================================================================

    /// Insert-or-merge keyed by `(plan, entity, trigger)` over `Pending`
    /// rows: a repeat trigger refreshes `change_payload`, `debounce_until`,
    /// and `priority` on the existing row (`first_created_at` is kept).
    async fn queue_upsert(&self, item: RescheduleQueueItem) -> ScheduleResult<()>;

    /// Distinct plan ids with at least one `Pending` item that is due at
    /// `now`: quiet period elapsed, or first created before `stale_before`.
    async fn queue_dirty_plan_ids(
        &self,
        now: Timestamp,
        stale_before: Timestamp,
        limit: i64,
    ) -> ScheduleResult<Vec<EntityId>>;

    /// Atomically claim all due `Pending` items of one plan: select with
    /// skip-locked semantics, mark them `Processing`, and return them in
    /// `(priority ASC, created_at ASC)` order. A concurrent worker draining
    /// the same plan observes an empty batch instead of blocking.
    async fn queue_fetch_and_lock(
        &self,
        plan_id: EntityId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> ScheduleResult<Vec<RescheduleQueueItem>>;

    /// Terminal bookkeeping; sets `processed_at` for completed/failed rows.
    async fn queue_update_status(
        &self,
        ids: &[EntityId],
        status: QueueStatus,
        error_message: Option<String>,
        processing_duration_ms: Option<i64>,
    ) -> ScheduleResult<()>;

    /// Failed attempt that still has retry budget: bump `retry_count`,
    /// reset to `Pending` with a fresh quiet period.
    async fn queue_increment_retry(
        &self,
        ids: &[EntityId],
        new_debounce_until: Timestamp,
    ) -> ScheduleResult<()>;

    /// Drop `Completed` rows processed before the cutoff.
    async fn queue_purge_completed(&self, older_than: Timestamp) -> ScheduleResult<u64>;

    /// Pending item count for one plan (diagnostics and tests).
    async fn queue_pending_count(&self, plan_id: EntityId) -> ScheduleResult<i64>;

    // ========================================================================
    // PROCESSED EVENTS (inbound dedup)
    // ========================================================================

    /// Atomic check-and-record for an inbound event id. Returns `true` when
    /// the event was already processed (caller should skip), `false` when
    /// this call recorded it.
    async fn processed_event_check_and_record(
        &self,
        event_id: &str,
        event_type: &str,
        source: &str,
    ) -> ScheduleResult<bool>;

    /// Drop dedup records older than the TTL cutoff.
    async fn processed_event_purge(&self, older_than: Timestamp) -> ScheduleResult<u64>;

    // ========================================================================
    // HEALTH
    // ========================================================================

    async fn health_check(&self) -> ScheduleResult<bool>;
}
