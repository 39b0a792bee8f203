//! Reschedule queue enqueue helpers.
//!
//! Builders translate change signals into queue items with the right
//! priority and quiet period; the store's upsert does the debounce merge.

use chrono::Duration;
use tempo_core::{ChangePayload, EntityId, RescheduleQueueItem, ScheduleResult};
use tempo_storage::ScheduleStore;

/// Build a queue item for a change signal.
pub fn build_item(
    user_id: EntityId,
    plan_id: EntityId,
    entity_id: EntityId,
    payload: ChangePayload,
    debounce: Duration,
) -> RescheduleQueueItem {
    RescheduleQueueItem::new(user_id, plan_id, entity_id, payload, debounce)
}

/// Enqueue a change signal; a repeated signal for the same
/// `(plan, entity, trigger)` key merges into the pending row.
pub async fn enqueue(
    store: &dyn ScheduleStore,
    user_id: EntityId,
    plan_id: EntityId,
    entity_id: EntityId,
    payload: ChangePayload,
    debounce: Duration,
) -> ScheduleResult<()> {
    let trigger = payload.trigger_type();
    store
        .queue_upsert(build_item(user_id, plan_id, entity_id, payload, debounce))
        .await?;
    tracing::debug!(%user_id, %plan_id, %entity_id, ?trigger, "enqueued reschedule trigger");
    Ok(())
}
