//! Window materialization pipeline.
//!
//! Expands availability rules into concrete per-day windows, applies
//! calendar exceptions, and replaces the materialized range atomically.
//! Availability and exception edits re-run the pipeline for the affected
//! range, so materialized windows always track their inputs.

use chrono::Utc;
use tempo_core::{
    day_start_utc, window, AvailabilityRule, CalendarException, EntityId, ScheduleError,
    ScheduleResult, ScheduleWindow, DAY_MS,
};
use tempo_storage::ScheduleStore;

/// Materialize windows for `[from_date_ms, to_date_ms]`.
///
/// Pure function of the user's current rules and exceptions: re-running
/// with unchanged inputs produces an identical window set. Fails with
/// `NotFound` when the user has no availability rules at all.
pub async fn materialize(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    from_date_ms: i64,
    to_date_ms: i64,
) -> ScheduleResult<Vec<ScheduleWindow>> {
    if from_date_ms > to_date_ms {
        return Err(ScheduleError::validation("fromDateMs is after toDateMs"));
    }
    let from = day_start_utc(from_date_ms);
    let to = day_start_utc(to_date_ms);

    let rules = store.availability_list(user_id).await?;
    if rules.is_empty() {
        return Err(ScheduleError::not_found("availability"));
    }

    let exceptions = store.exception_list(user_id, from, to).await?;
    let windows = window::materialize_windows(user_id, &rules, &exceptions, from, to);

    store
        .window_replace_range(user_id, from, to, windows.clone())
        .await?;

    tracing::debug!(
        %user_id,
        from_date_ms = from,
        to_date_ms = to,
        windows = windows.len(),
        "materialized schedule windows"
    );

    Ok(windows)
}

/// List materialized windows for a range.
pub async fn list_windows(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    from_date_ms: i64,
    to_date_ms: i64,
) -> ScheduleResult<Vec<ScheduleWindow>> {
    if from_date_ms > to_date_ms {
        return Err(ScheduleError::validation("fromDateMs is after toDateMs"));
    }
    store.window_list(user_id, from_date_ms, to_date_ms).await
}

/// Replace a user's availability rules wholesale and re-materialize the
/// forward horizon.
pub async fn replace_availability(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    rules: Vec<AvailabilityRule>,
    horizon_days: i64,
) -> ScheduleResult<Vec<AvailabilityRule>> {
    for rule in &rules {
        if !rule.is_valid() {
            return Err(ScheduleError::validation(format!(
                "invalid availability rule: day {} {}-{}",
                rule.day_of_week, rule.start_min, rule.end_min
            )));
        }
    }

    let stored = store.availability_replace(user_id, rules).await?;
    rematerialize_horizon(store, user_id, horizon_days).await?;
    Ok(stored)
}

/// Record a one-off exception and re-materialize its date.
pub async fn add_exception(
    store: &dyn ScheduleStore,
    exception: CalendarException,
    horizon_days: i64,
) -> ScheduleResult<CalendarException> {
    if !exception.is_valid() {
        return Err(ScheduleError::validation(format!(
            "invalid exception interval {}-{}",
            exception.start_min, exception.end_min
        )));
    }

    store.exception_insert(&exception).await?;
    // Only the exception's own day changes; outside the horizon it will be
    // picked up by the next full materialization.
    if within_horizon(exception.date_ms, horizon_days) {
        materialize(store, exception.user_id, exception.date_ms, exception.date_ms).await?;
    }
    Ok(exception)
}

/// Remove an exception and re-materialize its date.
pub async fn remove_exception(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    exception_id: EntityId,
    horizon_days: i64,
) -> ScheduleResult<()> {
    let exception = store
        .exception_get(exception_id)
        .await?
        .filter(|ex| ex.user_id == user_id)
        .ok_or_else(|| ScheduleError::not_found("calendar exception"))?;

    store.exception_delete(exception_id, user_id).await?;
    if within_horizon(exception.date_ms, horizon_days) {
        materialize(store, user_id, exception.date_ms, exception.date_ms).await?;
    }
    Ok(())
}

async fn rematerialize_horizon(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    horizon_days: i64,
) -> ScheduleResult<()> {
    let today = day_start_utc(Utc::now().timestamp_millis());
    let rules = store.availability_list(user_id).await?;
    if rules.is_empty() {
        // Wholesale replace with an empty set: clear the derived windows too.
        store
            .window_replace_range(user_id, today, today + horizon_days * DAY_MS, Vec::new())
            .await?;
        return Ok(());
    }
    materialize(store, user_id, today, today + horizon_days * DAY_MS).await?;
    Ok(())
}

fn within_horizon(date_ms: i64, horizon_days: i64) -> bool {
    let today = day_start_utc(Utc::now().timestamp_millis());
    let date = day_start_utc(date_ms);
    date >= today && date <= today + horizon_days * DAY_MS
}

// ============================================================================
// TESTS
// ============================================================================
