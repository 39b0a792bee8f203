//! Tempo Core - Entity Types and Domain Logic
//!
//! Pure data structures and scheduling math with no I/O. All other crates
//! depend on this. Persistence and transport live in `tempo-storage` and
//! `tempo-api`.

use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod entities;
pub mod enums;
pub mod error;
pub mod executor;
pub mod queue;
pub mod window;

pub use entities::{
    AvailabilityRule, CalendarException, ScheduleEvent, SchedulePlan, ScheduleTask,
    ScheduleWindow,
};
pub use enums::{
    Algorithm, AvailabilityStatus, ChangeKind, EntityKind, EventStatus, ExceptionKind,
    PlanStatus, PlanType, Priority, QueueStatus, RescheduleStrategy, StrategyKind,
    TaskScheduleStatus, TriggerType,
};
pub use error::{ScheduleError, ScheduleResult};
pub use executor::{algorithm_for_strategy, Executor, ExecutorOutcome};
pub use queue::{ChangePayload, RescheduleBatch, RescheduleQueueItem};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Minutes in one day; interval fields live in `[0, 1440]`.
pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// One day in epoch milliseconds.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Default minimum duration of a split part, in minutes.
pub const DEFAULT_MIN_SPLIT_DURATION_MIN: i32 = 30;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Truncate an epoch-millisecond timestamp to UTC midnight of its day.
pub fn day_start_utc(ms: i64) -> i64 {
    ms.div_euclid(DAY_MS) * DAY_MS
}

/// Day of week for a day-truncated epoch-millisecond date, Sunday = 0.
pub fn day_of_week(date_ms: i64) -> i16 {
    DateTime::from_timestamp_millis(date_ms)
        .map(|dt| dt.weekday().num_days_from_sunday() as i16)
        .unwrap_or(0)
}

/// Epoch milliseconds for `date_ms` + `minute_of_day`.
pub fn absolute_ms(date_ms: i64, minute_of_day: i32) -> i64 {
    day_start_utc(date_ms) + i64::from(minute_of_day) * 60_000
}

/// Compute a SHA-256 hex digest over an ordered list of field renderings.
///
/// Used for task snapshot hashes: two snapshots with the same
/// constraint-relevant fields hash identically.
pub fn compute_snapshot_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }
    format!("{:x}", hasher.finalize())
}

/// Validate a minute interval: `0 <= start < end <= 1440`.
pub fn is_valid_interval(start_min: i32, end_min: i32) -> bool {
    start_min >= 0 && end_min <= MINUTES_PER_DAY && start_min < end_min
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_id_is_v7() {
        let id = new_entity_id();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_entity_ids_are_sortable() {
        let id1 = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_entity_id();
        assert!(id1.to_string() < id2.to_string());
    }

    #[test]
    fn test_day_start_utc_truncates() {
        // 2024-01-15T13:45:00Z
        let ms = 1_705_326_300_000;
        let midnight = day_start_utc(ms);
        assert_eq!(midnight % DAY_MS, 0);
        assert!(midnight <= ms && ms - midnight < DAY_MS);
        // Already-truncated values are fixed points.
        assert_eq!(day_start_utc(midnight), midnight);
    }

    #[test]
    fn test_day_of_week_epoch_is_thursday() {
        assert_eq!(day_of_week(0), 4);
        // 1970-01-04 was a Sunday.
        assert_eq!(day_of_week(3 * DAY_MS), 0);
    }

    #[test]
    fn test_absolute_ms() {
        let date = day_start_utc(1_705_326_300_000);
        assert_eq!(absolute_ms(date, 0), date);
        assert_eq!(absolute_ms(date, 90), date + 90 * 60_000);
    }

    #[test]
    fn test_snapshot_hash_stable_and_order_sensitive() {
        let a = compute_snapshot_hash(&["write report", "60", "HIGH"]);
        let b = compute_snapshot_hash(&["write report", "60", "HIGH"]);
        let c = compute_snapshot_hash(&["60", "write report", "HIGH"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_interval_validation() {
        assert!(is_valid_interval(0, 1440));
        assert!(is_valid_interval(540, 1020));
        assert!(!is_valid_interval(540, 540));
        assert!(!is_valid_interval(600, 540));
        assert!(!is_valid_interval(-1, 60));
        assert!(!is_valid_interval(0, 1441));
    }
}
