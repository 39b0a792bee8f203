//! PostgreSQL Storage Backend
//!
//! Connection pooling via deadpool-postgres plus a `PgStore` implementing
//! the `ScheduleStore` trait. Every composite trait method runs inside one
//! transaction; the queue dequeue is the explicit skip-locked repository
//! method the rest of the system relies on for per-plan mutual exclusion.
//!
//! Schema lives in `migrations/schema.sql`. Enums are stored as TEXT in
//! their wire form; queue change payloads as JSONB.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tempo_core::{
    Algorithm, AvailabilityRule, CalendarException, EntityId, EventStatus, PlanStatus,
    QueueStatus, RescheduleQueueItem, ScheduleError, ScheduleEvent, SchedulePlan, ScheduleResult,
    ScheduleTask, ScheduleWindow, Timestamp,
};
use tempo_storage::ScheduleStore;
use tokio_postgres::{GenericClient, NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tempo".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TEMPO_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TEMPO_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("TEMPO_DB_NAME").unwrap_or_else(|_| "tempo".to_string()),
            user: std::env::var("TEMPO_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("TEMPO_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TEMPO_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("TEMPO_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ScheduleResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ScheduleError::storage(format!("failed to create pool: {}", e)))
    }
}

// ============================================================================
// PG STORE
// ============================================================================

/// PostgreSQL-backed `ScheduleStore`.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ScheduleResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> ScheduleResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ScheduleError::storage(format!("failed to acquire connection: {}", e)))
    }
}

fn pg_err(err: tokio_postgres::Error) -> ScheduleError {
    ScheduleError::storage(err.to_string())
}

fn col<'a, T>(row: &'a Row, name: &str) -> ScheduleResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(pg_err)
}

fn enum_col<T>(row: &Row, name: &str) -> ScheduleResult<T>
where
    T: std::str::FromStr<Err = ScheduleError>,
{
    let text: String = col(row, name)?;
    text.parse()
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const AVAILABILITY_COLS: &str =
    "id, user_id, day_of_week, start_min, end_min, status, created_at, updated_at";

fn row_to_availability(row: &Row) -> ScheduleResult<AvailabilityRule> {
    Ok(AvailabilityRule {
        id: col(row, "id")?,
        user_id: col(row, "user_id")?,
        day_of_week: col(row, "day_of_week")?,
        start_min: col(row, "start_min")?,
        end_min: col(row, "end_min")?,
        status: enum_col(row, "status")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

const EXCEPTION_COLS: &str =
    "id, user_id, date_ms, start_min, end_min, kind, created_at, updated_at";

fn row_to_exception(row: &Row) -> ScheduleResult<CalendarException> {
    Ok(CalendarException {
        id: col(row, "id")?,
        user_id: col(row, "user_id")?,
        date_ms: col(row, "date_ms")?,
        start_min: col(row, "start_min")?,
        end_min: col(row, "end_min")?,
        kind: enum_col(row, "kind")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn row_to_window(row: &Row) -> ScheduleResult<ScheduleWindow> {
    Ok(ScheduleWindow {
        user_id: col(row, "user_id")?,
        date_ms: col(row, "date_ms")?,
        start_min: col(row, "start_min")?,
        end_min: col(row, "end_min")?,
    })
}

const PLAN_COLS: &str = "id, user_id, tenant_id, start_date_ms, end_date_ms, plan_name, \
     plan_type, algorithm_used, optimization_score, optimization_timestamp, \
     optimization_duration_ms, optimization_error, version, parent_plan_id, status, \
     created_at, updated_at";

fn row_to_plan(row: &Row) -> ScheduleResult<SchedulePlan> {
    Ok(SchedulePlan {
        id: col(row, "id")?,
        user_id: col(row, "user_id")?,
        tenant_id: col(row, "tenant_id")?,
        start_date_ms: col(row, "start_date_ms")?,
        end_date_ms: col(row, "end_date_ms")?,
        plan_name: col(row, "plan_name")?,
        plan_type: enum_col(row, "plan_type")?,
        algorithm_used: enum_col(row, "algorithm_used")?,
        optimization_score: col(row, "optimization_score")?,
        optimization_timestamp: col(row, "optimization_timestamp")?,
        optimization_duration_ms: col(row, "optimization_duration_ms")?,
        optimization_error: col(row, "optimization_error")?,
        version: col(row, "version")?,
        parent_plan_id: col(row, "parent_plan_id")?,
        status: enum_col(row, "status")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

async fn insert_plan<C: GenericClient>(client: &C, plan: &SchedulePlan) -> ScheduleResult<()> {
    client
        .execute(
            "INSERT INTO schedule_plans (id, user_id, tenant_id, start_date_ms, end_date_ms, \
             plan_name, plan_type, algorithm_used, optimization_score, optimization_timestamp, \
             optimization_duration_ms, optimization_error, version, parent_plan_id, status, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            &[
                &plan.id,
                &plan.user_id,
                &plan.tenant_id,
                &plan.start_date_ms,
                &plan.end_date_ms,
                &plan.plan_name,
                &plan.plan_type.as_str(),
                &plan.algorithm_used.as_str(),
                &plan.optimization_score,
                &plan.optimization_timestamp,
                &plan.optimization_duration_ms,
                &plan.optimization_error,
                &plan.version,
                &plan.parent_plan_id,
                &plan.status.as_str(),
                &plan.created_at,
                &plan.updated_at,
            ],
        )
        .await
        .map_err(pg_err)?;
    Ok(())
}

async fn update_plan<C: GenericClient>(client: &C, plan: &SchedulePlan) -> ScheduleResult<()> {
    let updated = client
        .execute(
            "UPDATE schedule_plans SET start_date_ms = $2, end_date_ms = $3, plan_name = $4, \
             plan_type = $5, algorithm_used = $6, optimization_score = $7, \
             optimization_timestamp = $8, optimization_duration_ms = $9, \
             optimization_error = $10, version = $11, parent_plan_id = $12, status = $13, \
             updated_at = $14 WHERE id = $1",
            &[
                &plan.id,
                &plan.start_date_ms,
                &plan.end_date_ms,
                &plan.plan_name,
                &plan.plan_type.as_str(),
                &plan.algorithm_used.as_str(),
                &plan.optimization_score,
                &plan.optimization_timestamp,
                &plan.optimization_duration_ms,
                &plan.optimization_error,
                &plan.version,
                &plan.parent_plan_id,
                &plan.status.as_str(),
                &plan.updated_at,
            ],
        )
        .await
        .map_err(pg_err)?;
    if updated == 0 {
        return Err(ScheduleError::not_found("schedule plan"));
    }
    Ok(())
}

const TASK_COLS: &str = "id, user_id, tenant_id, schedule_plan_id, task_id, task_snapshot_hash, \
     title, duration_min, priority, priority_score, category, is_deep_work, earliest_start_ms, \
     deadline_ms, preferred_start_ms, allow_split, min_split_duration_min, max_split_count, \
     is_pinned, pinned_start_ms, pinned_end_ms, dependent_task_ids, buffer_before_min, \
     buffer_after_min, schedule_status, unscheduled_reason, created_at, updated_at";

fn row_to_task(row: &Row) -> ScheduleResult<ScheduleTask> {
    Ok(ScheduleTask {
        id: col(row, "id")?,
        user_id: col(row, "user_id")?,
        tenant_id: col(row, "tenant_id")?,
        schedule_plan_id: col(row, "schedule_plan_id")?,
        task_id: col(row, "task_id")?,
        task_snapshot_hash: col(row, "task_snapshot_hash")?,
        title: col(row, "title")?,
        duration_min: col(row, "duration_min")?,
        priority: enum_col(row, "priority")?,
        priority_score: col(row, "priority_score")?,
        category: col(row, "category")?,
        is_deep_work: col(row, "is_deep_work")?,
        earliest_start_ms: col(row, "earliest_start_ms")?,
        deadline_ms: col(row, "deadline_ms")?,
        preferred_start_ms: col(row, "preferred_start_ms")?,
        allow_split: col(row, "allow_split")?,
        min_split_duration_min: col(row, "min_split_duration_min")?,
        max_split_count: col(row, "max_split_count")?,
        is_pinned: col(row, "is_pinned")?,
        pinned_start_ms: col(row, "pinned_start_ms")?,
        pinned_end_ms: col(row, "pinned_end_ms")?,
        dependent_task_ids: col(row, "dependent_task_ids")?,
        buffer_before_min: col(row, "buffer_before_min")?,
        buffer_after_min: col(row, "buffer_after_min")?,
        schedule_status: enum_col(row, "schedule_status")?,
        unscheduled_reason: col(row, "unscheduled_reason")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

async fn upsert_task<C: GenericClient>(client: &C, task: &ScheduleTask) -> ScheduleResult<()> {
    client
        .execute(
            "INSERT INTO schedule_tasks (id, user_id, tenant_id, schedule_plan_id, task_id, \
             task_snapshot_hash, title, duration_min, priority, priority_score, category, \
             is_deep_work, earliest_start_ms, deadline_ms, preferred_start_ms, allow_split, \
             min_split_duration_min, max_split_count, is_pinned, pinned_start_ms, pinned_end_ms, \
             dependent_task_ids, buffer_before_min, buffer_after_min, schedule_status, \
             unscheduled_reason, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28) \
             ON CONFLICT (id) DO UPDATE SET task_snapshot_hash = EXCLUDED.task_snapshot_hash, \
             title = EXCLUDED.title, duration_min = EXCLUDED.duration_min, \
             priority = EXCLUDED.priority, priority_score = EXCLUDED.priority_score, \
             category = EXCLUDED.category, is_deep_work = EXCLUDED.is_deep_work, \
             earliest_start_ms = EXCLUDED.earliest_start_ms, deadline_ms = EXCLUDED.deadline_ms, \
             preferred_start_ms = EXCLUDED.preferred_start_ms, allow_split = EXCLUDED.allow_split, \
             min_split_duration_min = EXCLUDED.min_split_duration_min, \
             max_split_count = EXCLUDED.max_split_count, is_pinned = EXCLUDED.is_pinned, \
             pinned_start_ms = EXCLUDED.pinned_start_ms, pinned_end_ms = EXCLUDED.pinned_end_ms, \
             dependent_task_ids = EXCLUDED.dependent_task_ids, \
             buffer_before_min = EXCLUDED.buffer_before_min, \
             buffer_after_min = EXCLUDED.buffer_after_min, \
             schedule_status = EXCLUDED.schedule_status, \
             unscheduled_reason = EXCLUDED.unscheduled_reason, updated_at = EXCLUDED.updated_at",
            &[
                &task.id,
                &task.user_id,
                &task.tenant_id,
                &task.schedule_plan_id,
                &task.task_id,
                &task.task_snapshot_hash,
                &task.title,
                &task.duration_min,
                &task.priority.as_str(),
                &task.priority_score,
                &task.category,
                &task.is_deep_work,
                &task.earliest_start_ms,
                &task.deadline_ms,
                &task.preferred_start_ms,
                &task.allow_split,
                &task.min_split_duration_min,
                &task.max_split_count,
                &task.is_pinned,
                &task.pinned_start_ms,
                &task.pinned_end_ms,
                &task.dependent_task_ids,
                &task.buffer_before_min,
                &task.buffer_after_min,
                &task.schedule_status.as_str(),
                &task.unscheduled_reason,
                &task.created_at,
                &task.updated_at,
            ],
        )
        .await
        .map_err(pg_err)?;
    Ok(())
}

const EVENT_COLS: &str = "id, schedule_plan_id, schedule_task_id, date_ms, start_min, end_min, \
     title, part_index, total_parts, linked_event_id, status, is_pinned, utility_score, \
     actual_start_min, actual_end_min, created_at, updated_at";

fn row_to_event(row: &Row) -> ScheduleResult<ScheduleEvent> {
    Ok(ScheduleEvent {
        id: col(row, "id")?,
        schedule_plan_id: col(row, "schedule_plan_id")?,
        schedule_task_id: col(row, "schedule_task_id")?,
        date_ms: col(row, "date_ms")?,
        start_min: col(row, "start_min")?,
        end_min: col(row, "end_min")?,
        title: col(row, "title")?,
        part_index: col(row, "part_index")?,
        total_parts: col(row, "total_parts")?,
        linked_event_id: col(row, "linked_event_id")?,
        status: enum_col(row, "status")?,
        is_pinned: col(row, "is_pinned")?,
        utility_score: col(row, "utility_score")?,
        actual_start_min: col(row, "actual_start_min")?,
        actual_end_min: col(row, "actual_end_min")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

async fn upsert_event<C: GenericClient>(client: &C, event: &ScheduleEvent) -> ScheduleResult<()> {
    client
        .execute(
            "INSERT INTO schedule_events (id, schedule_plan_id, schedule_task_id, date_ms, \
             start_min, end_min, title, part_index, total_parts, linked_event_id, status, \
             is_pinned, utility_score, actual_start_min, actual_end_min, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             ON CONFLICT (id) DO UPDATE SET date_ms = EXCLUDED.date_ms, \
             start_min = EXCLUDED.start_min, end_min = EXCLUDED.end_min, \
             title = EXCLUDED.title, part_index = EXCLUDED.part_index, \
             total_parts = EXCLUDED.total_parts, linked_event_id = EXCLUDED.linked_event_id, \
             status = EXCLUDED.status, is_pinned = EXCLUDED.is_pinned, \
             utility_score = EXCLUDED.utility_score, \
             actual_start_min = EXCLUDED.actual_start_min, \
             actual_end_min = EXCLUDED.actual_end_min, updated_at = EXCLUDED.updated_at",
            &[
                &event.id,
                &event.schedule_plan_id,
                &event.schedule_task_id,
                &event.date_ms,
                &event.start_min,
                &event.end_min,
                &event.title,
                &event.part_index,
                &event.total_parts,
                &event.linked_event_id,
                &event.status.as_str(),
                &event.is_pinned,
                &event.utility_score,
                &event.actual_start_min,
                &event.actual_end_min,
                &event.created_at,
                &event.updated_at,
            ],
        )
        .await
        .map_err(pg_err)?;
    Ok(())
}

const QUEUE_COLS: &str = "id, user_id, schedule_plan_id, trigger_type, entity_id, entity_kind, \
     change_payload, status, priority, debounce_until, first_created_at, created_at, updated_at, \
     processed_at, processing_duration_ms, error_message, retry_count";

fn row_to_queue_item(row: &Row) -> ScheduleResult<RescheduleQueueItem> {
    let payload: serde_json::Value = col(row, "change_payload")?;
    Ok(RescheduleQueueItem {
        id: col(row, "id")?,
        user_id: col(row, "user_id")?,
        schedule_plan_id: col(row, "schedule_plan_id")?,
        trigger_type: enum_col(row, "trigger_type")?,
        entity_id: col(row, "entity_id")?,
        entity_kind: enum_col(row, "entity_kind")?,
        change_payload: serde_json::from_value(payload)
            .map_err(|e| ScheduleError::storage(format!("invalid change payload: {}", e)))?,
        status: enum_col(row, "status")?,
        priority: col(row, "priority")?,
        debounce_until: col(row, "debounce_until")?,
        first_created_at: col(row, "first_created_at")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        processed_at: col(row, "processed_at")?,
        processing_duration_ms: col(row, "processing_duration_ms")?,
        error_message: col(row, "error_message")?,
        retry_count: col(row, "retry_count")?,
    })
}

async fn upsert_queue_item<C: GenericClient>(
    client: &C,
    item: &RescheduleQueueItem,
) -> ScheduleResult<()> {
    let payload = serde_json::to_value(&item.change_payload)
        .map_err(|e| ScheduleError::storage(format!("failed to encode change payload: {}", e)))?;
    // The partial unique index on pending rows makes this the debounce
    // merge: a repeated trigger refreshes payload, deadline, and priority.
    client
        .execute(
            "INSERT INTO reschedule_queue (id, user_id, schedule_plan_id, trigger_type, \
             entity_id, entity_kind, change_payload, status, priority, debounce_until, \
             first_created_at, created_at, updated_at, processed_at, processing_duration_ms, \
             error_message, retry_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             ON CONFLICT (schedule_plan_id, entity_id, trigger_type) WHERE status = 'PENDING' \
             DO UPDATE SET change_payload = EXCLUDED.change_payload, \
             debounce_until = EXCLUDED.debounce_until, priority = EXCLUDED.priority, \
             updated_at = now()",
            &[
                &item.id,
                &item.user_id,
                &item.schedule_plan_id,
                &item.trigger_type.as_str(),
                &item.entity_id,
                &item.entity_kind.as_str(),
                &payload,
                &item.status.as_str(),
                &item.priority,
                &item.debounce_until,
                &item.first_created_at,
                &item.created_at,
                &item.updated_at,
                &item.processed_at,
                &item.processing_duration_ms,
                &item.error_message,
                &item.retry_count,
            ],
        )
        .await
        .map_err(pg_err)?;
    Ok(())
}

// ============================================================================
// TRAIT IMPLEMENTATION
// ============================================================================

#[async_trait]
impl ScheduleStore for PgStore {
    // === Availability ===

    async fn availability_list(&self, user_id: EntityId) -> ScheduleResult<Vec<AvailabilityRule>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM availability_rules WHERE user_id = $1 \
                     ORDER BY day_of_week, start_min",
                    AVAILABILITY_COLS
                ),
                &[&user_id],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_availability).collect()
    }

    async fn availability_replace(
        &self,
        user_id: EntityId,
        rules: Vec<AvailabilityRule>,
    ) -> ScheduleResult<Vec<AvailabilityRule>> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        tx.execute("DELETE FROM availability_rules WHERE user_id = $1", &[&user_id])
            .await
            .map_err(pg_err)?;
        for rule in &rules {
            tx.execute(
                "INSERT INTO availability_rules (id, user_id, day_of_week, start_min, end_min, \
                 status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &rule.id,
                    &rule.user_id,
                    &rule.day_of_week,
                    &rule.start_min,
                    &rule.end_min,
                    &rule.status.as_str(),
                    &rule.created_at,
                    &rule.updated_at,
                ],
            )
            .await
            .map_err(pg_err)?;
        }

        tx.commit().await.map_err(pg_err)?;
        Ok(rules)
    }

    // === Exceptions ===

    async fn exception_list(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<CalendarException>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM calendar_exceptions WHERE user_id = $1 \
                     AND date_ms >= $2 AND date_ms <= $3 ORDER BY date_ms, start_min",
                    EXCEPTION_COLS
                ),
                &[&user_id, &from_date_ms, &to_date_ms],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_exception).collect()
    }

    async fn exception_insert(&self, exception: &CalendarException) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO calendar_exceptions (id, user_id, date_ms, start_min, end_min, kind, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &exception.id,
                &exception.user_id,
                &exception.date_ms,
                &exception.start_min,
                &exception.end_min,
                &exception.kind.as_str(),
                &exception.created_at,
                &exception.updated_at,
            ],
        )
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn exception_get(&self, id: EntityId) -> ScheduleResult<Option<CalendarException>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM calendar_exceptions WHERE id = $1", EXCEPTION_COLS),
                &[&id],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_exception).transpose()
    }

    async fn exception_delete(&self, id: EntityId, user_id: EntityId) -> ScheduleResult<bool> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute(
                "DELETE FROM calendar_exceptions WHERE id = $1 AND user_id = $2",
                &[&id, &user_id],
            )
            .await
            .map_err(pg_err)?;
        Ok(deleted > 0)
    }

    // === Windows ===

    async fn window_list(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<ScheduleWindow>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT user_id, date_ms, start_min, end_min FROM schedule_windows \
                 WHERE user_id = $1 AND date_ms >= $2 AND date_ms <= $3 \
                 ORDER BY date_ms, start_min",
                &[&user_id, &from_date_ms, &to_date_ms],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_window).collect()
    }

    async fn window_replace_range(
        &self,
        user_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
        windows: Vec<ScheduleWindow>,
    ) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        tx.execute(
            "DELETE FROM schedule_windows WHERE user_id = $1 AND date_ms >= $2 AND date_ms <= $3",
            &[&user_id, &from_date_ms, &to_date_ms],
        )
        .await
        .map_err(pg_err)?;
        for window in &windows {
            tx.execute(
                "INSERT INTO schedule_windows (user_id, date_ms, start_min, end_min) \
                 VALUES ($1, $2, $3, $4)",
                &[
                    &window.user_id,
                    &window.date_ms,
                    &window.start_min,
                    &window.end_min,
                ],
            )
            .await
            .map_err(pg_err)?;
        }

        tx.commit().await.map_err(pg_err)
    }

    // === Plans ===

    async fn plan_insert(&self, plan: &SchedulePlan) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        insert_plan(client, plan).await
    }

    async fn plan_get(&self, id: EntityId) -> ScheduleResult<Option<SchedulePlan>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM schedule_plans WHERE id = $1", PLAN_COLS),
                &[&id],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_plan).transpose()
    }

    async fn plan_update(&self, plan: &SchedulePlan) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        update_plan(client, plan).await
    }

    async fn plan_update_many(&self, plans: &[SchedulePlan]) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;
        for plan in plans {
            update_plan(&tx, plan).await?;
        }
        tx.commit().await.map_err(pg_err)
    }

    async fn plan_get_active(&self, user_id: EntityId) -> ScheduleResult<Option<SchedulePlan>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM schedule_plans WHERE user_id = $1 AND status = 'ACTIVE' \
                     ORDER BY version DESC LIMIT 1",
                    PLAN_COLS
                ),
                &[&user_id],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_plan).transpose()
    }

    async fn plan_get_proposed(
        &self,
        user_id: EntityId,
        algorithm: Option<Algorithm>,
    ) -> ScheduleResult<Option<SchedulePlan>> {
        let conn = self.conn().await?;
        let row = match algorithm {
            Some(algo) => {
                conn.query_opt(
                    &format!(
                        "SELECT {} FROM schedule_plans WHERE user_id = $1 \
                         AND status IN ('PROPOSED', 'OPTIMIZING') AND algorithm_used = $2 \
                         ORDER BY created_at DESC LIMIT 1",
                        PLAN_COLS
                    ),
                    &[&user_id, &algo.as_str()],
                )
                .await
            }
            None => {
                conn.query_opt(
                    &format!(
                        "SELECT {} FROM schedule_plans WHERE user_id = $1 \
                         AND status IN ('PROPOSED', 'OPTIMIZING') \
                         ORDER BY created_at DESC LIMIT 1",
                        PLAN_COLS
                    ),
                    &[&user_id],
                )
                .await
            }
        }
        .map_err(pg_err)?;
        row.as_ref().map(row_to_plan).transpose()
    }

    async fn plan_list_by_status(
        &self,
        user_id: EntityId,
        status: PlanStatus,
        limit: i64,
        offset: i64,
    ) -> ScheduleResult<Vec<SchedulePlan>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM schedule_plans WHERE user_id = $1 AND status = $2 \
                     ORDER BY updated_at DESC LIMIT $3 OFFSET $4",
                    PLAN_COLS
                ),
                &[&user_id, &status.as_str(), &limit, &offset],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_plan).collect()
    }

    async fn plan_count_by_status(
        &self,
        user_id: EntityId,
        status: PlanStatus,
    ) -> ScheduleResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM schedule_plans WHERE user_id = $1 AND status = $2",
                &[&user_id, &status.as_str()],
            )
            .await
            .map_err(pg_err)?;
        col(&row, "count")
    }

    async fn plan_insert_deep(
        &self,
        plan: &SchedulePlan,
        tasks: &[ScheduleTask],
        events: &[ScheduleEvent],
        plan_updates: &[SchedulePlan],
    ) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        insert_plan(&tx, plan).await?;
        for update in plan_updates {
            update_plan(&tx, update).await?;
        }
        for task in tasks {
            upsert_task(&tx, task).await?;
        }
        for event in events {
            upsert_event(&tx, event).await?;
        }

        tx.commit().await.map_err(pg_err)
    }

    // === Tasks ===

    async fn task_insert(&self, task: &ScheduleTask) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        upsert_task(client, task).await
    }

    async fn task_update(&self, task: &ScheduleTask) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        upsert_task(client, task).await
    }

    async fn task_get(&self, id: EntityId) -> ScheduleResult<Option<ScheduleTask>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM schedule_tasks WHERE id = $1", TASK_COLS),
                &[&id],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn task_get_by_plan_and_task(
        &self,
        plan_id: EntityId,
        task_id: EntityId,
    ) -> ScheduleResult<Option<ScheduleTask>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM schedule_tasks WHERE schedule_plan_id = $1 AND task_id = $2",
                    TASK_COLS
                ),
                &[&plan_id, &task_id],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn task_list_by_plan(&self, plan_id: EntityId) -> ScheduleResult<Vec<ScheduleTask>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM schedule_tasks WHERE schedule_plan_id = $1 \
                     ORDER BY created_at",
                    TASK_COLS
                ),
                &[&plan_id],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn task_list_by_ids(&self, ids: &[EntityId]) -> ScheduleResult<Vec<ScheduleTask>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {} FROM schedule_tasks WHERE id = ANY($1)", TASK_COLS),
                &[&ids],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn task_delete(&self, id: EntityId) -> ScheduleResult<bool> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute("DELETE FROM schedule_tasks WHERE id = $1", &[&id])
            .await
            .map_err(pg_err)?;
        Ok(deleted > 0)
    }

    // === Events ===

    async fn event_save_batch(&self, events: &[ScheduleEvent]) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;
        for event in events {
            upsert_event(&tx, event).await?;
        }
        tx.commit().await.map_err(pg_err)
    }

    async fn event_get(&self, id: EntityId) -> ScheduleResult<Option<ScheduleEvent>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM schedule_events WHERE id = $1", EVENT_COLS),
                &[&id],
            )
            .await
            .map_err(pg_err)?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn event_list_by_plan_range(
        &self,
        plan_id: EntityId,
        from_date_ms: i64,
        to_date_ms: i64,
    ) -> ScheduleResult<Vec<ScheduleEvent>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM schedule_events WHERE schedule_plan_id = $1 \
                     AND date_ms >= $2 AND date_ms <= $3 ORDER BY date_ms, start_min",
                    EVENT_COLS
                ),
                &[&plan_id, &from_date_ms, &to_date_ms],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn event_list_by_task(&self, task_id: EntityId) -> ScheduleResult<Vec<ScheduleEvent>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM schedule_events WHERE schedule_task_id = $1 \
                     ORDER BY part_index",
                    EVENT_COLS
                ),
                &[&task_id],
            )
            .await
            .map_err(pg_err)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn event_count_by_task_and_status(
        &self,
        task_id: EntityId,
        status: EventStatus,
    ) -> ScheduleResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM schedule_events WHERE schedule_task_id = $1 AND status = $2",
                &[&task_id, &status.as_str()],
            )
            .await
            .map_err(pg_err)?;
        col(&row, "count")
    }

    async fn event_move_apply(
        &self,
        event: &ScheduleEvent,
        task: &ScheduleTask,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        upsert_event(&tx, event).await?;
        upsert_task(&tx, task).await?;
        if let Some(item) = enqueue {
            upsert_queue_item(&tx, &item).await?;
        }

        tx.commit().await.map_err(pg_err)
    }

    async fn event_complete_apply(
        &self,
        event: &ScheduleEvent,
        task: Option<&ScheduleTask>,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        upsert_event(&tx, event).await?;
        if let Some(task) = task {
            upsert_task(&tx, task).await?;
        }
        if let Some(item) = enqueue {
            upsert_queue_item(&tx, &item).await?;
        }

        tx.commit().await.map_err(pg_err)
    }

    async fn event_split_apply(
        &self,
        original: &ScheduleEvent,
        new_part: &ScheduleEvent,
        enqueue: Option<RescheduleQueueItem>,
    ) -> ScheduleResult<()> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        // Shift later sibling parts up before the new part takes its index.
        tx.execute(
            "UPDATE schedule_events SET part_index = part_index + 1, updated_at = now() \
             WHERE schedule_task_id = $1 AND id <> $2 AND part_index >= $3",
            &[
                &original.schedule_task_id,
                &original.id,
                &new_part.part_index,
            ],
        )
        .await
        .map_err(pg_err)?;
        tx.execute(
            "UPDATE schedule_events SET total_parts = $2, updated_at = now() \
             WHERE schedule_task_id = $1",
            &[&original.schedule_task_id, &original.total_parts],
        )
        .await
        .map_err(pg_err)?;

        upsert_event(&tx, original).await?;
        upsert_event(&tx, new_part).await?;
        if let Some(item) = enqueue {
            upsert_queue_item(&tx, &item).await?;
        }

        tx.commit().await.map_err(pg_err)
    }

    async fn event_update(&self, event: &ScheduleEvent) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        upsert_event(client, event).await
    }

    // === Queue ===

    async fn queue_upsert(&self, item: RescheduleQueueItem) -> ScheduleResult<()> {
        let conn = self.conn().await?;
        let client: &tokio_postgres::Client = &conn;
        upsert_queue_item(client, &item).await
    }

    async fn queue_dirty_plan_ids(
        &self,
        now: Timestamp,
        stale_before: Timestamp,
        limit: i64,
    ) -> ScheduleResult<Vec<EntityId>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT DISTINCT schedule_plan_id FROM reschedule_queue \
                 WHERE status = 'PENDING' AND (debounce_until <= $1 OR first_created_at <= $2) \
                 LIMIT $3",
                &[&now, &stale_before, &limit],
            )
            .await
            .map_err(pg_err)?;
        rows.iter()
            .map(|row| col(row, "schedule_plan_id"))
            .collect()
    }

    async fn queue_fetch_and_lock(
        &self,
        plan_id: EntityId,
        now: Timestamp,
        stale_before: Timestamp,
    ) -> ScheduleResult<Vec<RescheduleQueueItem>> {
        let mut conn = self.conn().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client.transaction().await.map_err(pg_err)?;

        // Skip-locked claim: a concurrent worker draining the same plan
        // sees these rows as locked and gets an empty batch.
        let rows = tx
            .query(
                &format!(
                    "SELECT {} FROM reschedule_queue WHERE schedule_plan_id = $1 \
                     AND status = 'PENDING' \
                     AND (debounce_until <= $2 OR first_created_at <= $3) \
                     ORDER BY priority ASC, created_at ASC \
                     FOR UPDATE SKIP LOCKED",
                    QUEUE_COLS
                ),
                &[&plan_id, &now, &stale_before],
            )
            .await
            .map_err(pg_err)?;

        let mut items: Vec<RescheduleQueueItem> = rows
            .iter()
            .map(row_to_queue_item)
            .collect::<ScheduleResult<_>>()?;
        if items.is_empty() {
            tx.commit().await.map_err(pg_err)?;
            return Ok(items);
        }

        let ids: Vec<EntityId> = items.iter().map(|item| item.id).collect();
        tx.execute(
            "UPDATE reschedule_queue SET status = 'PROCESSING', updated_at = now() \
             WHERE id = ANY($1)",
            &[&ids],
        )
        .await
        .map_err(pg_err)?;
        tx.commit().await.map_err(pg_err)?;

        for item in &mut items {
            item.status = QueueStatus::Processing;
        }
        Ok(items)
    }

    async fn queue_update_status(
        &self,
        ids: &[EntityId],
        status: QueueStatus,
        error_message: Option<String>,
        processing_duration_ms: Option<i64>,
    ) -> ScheduleResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn().await?;
        let terminal = matches!(status, QueueStatus::Completed | QueueStatus::Failed);
        conn.execute(
            "UPDATE reschedule_queue SET status = $2, \
             error_message = COALESCE($3, error_message), \
             processed_at = CASE WHEN $4 THEN now() ELSE processed_at END, \
             processing_duration_ms = CASE WHEN $4 THEN $5 ELSE processing_duration_ms END, \
             updated_at = now() WHERE id = ANY($1)",
            &[
                &ids,
                &status.as_str(),
                &error_message,
                &terminal,
                &processing_duration_ms,
            ],
        )
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn queue_increment_retry(
        &self,
        ids: &[EntityId],
        new_debounce_until: Timestamp,
    ) -> ScheduleResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE reschedule_queue SET retry_count = retry_count + 1, status = 'PENDING', \
             debounce_until = $2, updated_at = now() WHERE id = ANY($1)",
            &[&ids, &new_debounce_until],
        )
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn queue_purge_completed(&self, older_than: Timestamp) -> ScheduleResult<u64> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM reschedule_queue WHERE status = 'COMPLETED' AND processed_at < $1",
            &[&older_than],
        )
        .await
        .map_err(pg_err)
    }

    async fn queue_pending_count(&self, plan_id: EntityId) -> ScheduleResult<i64> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM reschedule_queue \
                 WHERE schedule_plan_id = $1 AND status = 'PENDING'",
                &[&plan_id],
            )
            .await
            .map_err(pg_err)?;
        col(&row, "count")
    }

    // === Processed events ===

    async fn processed_event_check_and_record(
        &self,
        event_id: &str,
        event_type: &str,
        source: &str,
    ) -> ScheduleResult<bool> {
        let conn = self.conn().await?;
        let inserted = conn
            .execute(
                "INSERT INTO processed_events (event_id, event_type, source, processed_at) \
                 VALUES ($1, $2, $3, now()) ON CONFLICT (event_id) DO NOTHING",
                &[&event_id, &event_type, &source],
            )
            .await
            .map_err(pg_err)?;
        Ok(inserted == 0)
    }

    async fn processed_event_purge(&self, older_than: Timestamp) -> ScheduleResult<u64> {
        let conn = self.conn().await?;
        conn.execute(
            "DELETE FROM processed_events WHERE processed_at < $1",
            &[&older_than],
        )
        .await
        .map_err(pg_err)
    }

    // === Health ===

    async fn health_check(&self) -> ScheduleResult<bool> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1 AS one", &[])
            .await
            .map_err(pg_err)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "tempo");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_pool_creation_from_default_config() {
        // Pool creation is lazy; no server is contacted here.
        let store = PgStore::from_config(&DbConfig::default());
        assert!(store.is_ok());
    }
}
