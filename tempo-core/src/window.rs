//! Window materialization math.
//!
//! Pure functions that expand recurring availability rules into concrete
//! per-day windows and apply one-off calendar exceptions. The output is a
//! deterministic function of its inputs, so re-materializing the same range
//! twice yields an identical window set.

use crate::entities::{AvailabilityRule, CalendarException, ScheduleWindow};
use crate::enums::ExceptionKind;
use crate::{day_of_week, day_start_utc, EntityId, DAY_MS};
use std::collections::HashMap;

/// Expand every active rule whose weekday matches into candidate windows
/// for each calendar day in `[from_date_ms, to_date_ms]` (inclusive,
/// day-truncated).
pub fn expand_rules(
    rules: &[AvailabilityRule],
    from_date_ms: i64,
    to_date_ms: i64,
) -> Vec<ScheduleWindow> {
    let mut by_day_of_week: HashMap<i16, Vec<&AvailabilityRule>> = HashMap::new();
    for rule in rules.iter().filter(|r| r.is_active()) {
        by_day_of_week.entry(rule.day_of_week).or_default().push(rule);
    }

    let mut windows = Vec::new();
    let mut current = day_start_utc(from_date_ms);
    let end = day_start_utc(to_date_ms);

    while current <= end {
        if let Some(day_rules) = by_day_of_week.get(&day_of_week(current)) {
            for rule in day_rules {
                windows.push(ScheduleWindow {
                    user_id: rule.user_id,
                    date_ms: current,
                    start_min: rule.start_min,
                    end_min: rule.end_min,
                });
            }
        }
        current += DAY_MS;
    }

    windows
}

/// Apply exceptions to candidate windows: `Extra` exceptions contribute
/// additional windows on their date, `Blocked` exceptions carve out the
/// overlapping sub-intervals, splitting a window when the block falls
/// strictly inside it.
pub fn apply_exceptions(
    user_id: EntityId,
    windows: Vec<ScheduleWindow>,
    exceptions: &[CalendarException],
) -> Vec<ScheduleWindow> {
    if exceptions.is_empty() {
        return normalized(windows);
    }

    let mut blocked_by_date: HashMap<i64, Vec<&CalendarException>> = HashMap::new();
    let mut candidates = windows;

    for ex in exceptions {
        let date_key = day_start_utc(ex.date_ms);
        match ex.kind {
            ExceptionKind::Blocked => {
                blocked_by_date.entry(date_key).or_default().push(ex);
            }
            ExceptionKind::Extra => candidates.push(ScheduleWindow {
                user_id,
                date_ms: date_key,
                start_min: ex.start_min,
                end_min: ex.end_min,
            }),
        }
    }
    for blocks in blocked_by_date.values_mut() {
        blocks.sort_by_key(|ex| ex.start_min);
    }

    let mut result = Vec::with_capacity(candidates.len());
    for window in candidates {
        match blocked_by_date.get(&window.date_ms) {
            Some(blocks) => result.extend(subtract_from_window(&window, blocks)),
            None => result.push(window),
        }
    }

    normalized(result)
}

/// Full materialization pipeline: expand, add extras, subtract blocks.
pub fn materialize_windows(
    user_id: EntityId,
    rules: &[AvailabilityRule],
    exceptions: &[CalendarException],
    from_date_ms: i64,
    to_date_ms: i64,
) -> Vec<ScheduleWindow> {
    let candidates = expand_rules(rules, from_date_ms, to_date_ms);
    apply_exceptions(user_id, candidates, exceptions)
}

/// Subtract a sorted list of blocked intervals from one window. Returns the
/// remaining sub-windows in ascending order.
fn subtract_from_window(
    window: &ScheduleWindow,
    blocks: &[&CalendarException],
) -> Vec<ScheduleWindow> {
    let mut result = Vec::new();
    let mut current_start = window.start_min;
    let current_end = window.end_min;

    for block in blocks {
        if block.end_min <= current_start || block.start_min >= current_end {
            continue;
        }

        if block.start_min > current_start {
            result.push(ScheduleWindow {
                user_id: window.user_id,
                date_ms: window.date_ms,
                start_min: current_start,
                end_min: block.start_min.min(current_end),
            });
        }

        if block.end_min < current_end {
            current_start = current_start.max(block.end_min);
        } else {
            current_start = current_end;
            break;
        }
    }

    if current_start < current_end {
        result.push(ScheduleWindow {
            user_id: window.user_id,
            date_ms: window.date_ms,
            start_min: current_start,
            end_min: current_end,
        });
    }

    result
}

/// Sort into a canonical order and drop degenerate intervals.
fn normalized(mut windows: Vec<ScheduleWindow>) -> Vec<ScheduleWindow> {
    windows.retain(|w| w.start_min < w.end_min);
    windows.sort_by(|a, b| {
        (a.date_ms, a.start_min, a.end_min).cmp(&(b.date_ms, b.start_min, b.end_min))
    });
    windows
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    // 1970-01-05 was a Monday.
    const MONDAY_MS: i64 = 4 * DAY_MS;

    fn rule(user: EntityId, dow: i16, start: i32, end: i32) -> AvailabilityRule {
        AvailabilityRule::new(user, dow, start, end)
    }

    fn blocked(user: EntityId, date_ms: i64, start: i32, end: i32) -> CalendarException {
        CalendarException::new(user, date_ms, start, end, ExceptionKind::Blocked)
    }

    #[test]
    fn test_expand_matches_weekday_across_range() {
        let user = new_entity_id();
        let rules = vec![rule(user, 1, 540, 1020)];

        // Two weeks starting at the Monday: exactly two Monday windows.
        let windows = expand_rules(&rules, MONDAY_MS, MONDAY_MS + 13 * DAY_MS);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].date_ms, MONDAY_MS);
        assert_eq!(windows[1].date_ms, MONDAY_MS + 7 * DAY_MS);
    }

    #[test]
    fn test_inactive_rules_are_skipped() {
        let user = new_entity_id();
        let mut inactive = rule(user, 1, 540, 1020);
        inactive.status = crate::AvailabilityStatus::Inactive;

        let windows = expand_rules(&[inactive], MONDAY_MS, MONDAY_MS);
        assert!(windows.is_empty());
    }

    #[test]
    fn test_lunch_block_splits_working_day() {
        // Availability Monday 9:00-17:00 plus a 12:00-13:00 block
        // materializes to exactly two windows: 540-720 and 780-1020.
        let user = new_entity_id();
        let rules = vec![rule(user, 1, 540, 1020)];
        let exceptions = vec![blocked(user, MONDAY_MS, 720, 780)];

        let windows = materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
        assert_eq!(windows.len(), 2);
        assert_eq!((windows[0].start_min, windows[0].end_min), (540, 720));
        assert_eq!((windows[1].start_min, windows[1].end_min), (780, 1020));
    }

    #[test]
    fn test_block_clipping_at_edges() {
        let user = new_entity_id();
        let rules = vec![rule(user, 1, 540, 1020)];

        // Block covering the window start shrinks it.
        let exceptions = vec![blocked(user, MONDAY_MS, 480, 600)];
        let windows = materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
        assert_eq!(windows.len(), 1);
        assert_eq!((windows[0].start_min, windows[0].end_min), (600, 1020));

        // Block covering the whole window removes it.
        let exceptions = vec![blocked(user, MONDAY_MS, 500, 1100)];
        let windows = materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
        assert!(windows.is_empty());

        // Block on another date is ignored.
        let exceptions = vec![blocked(user, MONDAY_MS + DAY_MS, 720, 780)];
        let windows = materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
        assert_eq!(windows.len(), 1);
    }

    #[test]
    fn test_extra_exception_adds_window() {
        let user = new_entity_id();
        let rules = vec![rule(user, 1, 540, 1020)];
        let extra = CalendarException::new(
            user,
            MONDAY_MS + DAY_MS,
            600,
            720,
            ExceptionKind::Extra,
        );

        let windows =
            materialize_windows(user, &rules, &[extra], MONDAY_MS, MONDAY_MS + DAY_MS);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].date_ms, MONDAY_MS + DAY_MS);
        assert_eq!((windows[1].start_min, windows[1].end_min), (600, 720));
    }

    #[test]
    fn test_multiple_blocks_sorted_application() {
        let user = new_entity_id();
        let rules = vec![rule(user, 1, 480, 1080)];
        // Deliberately out of order.
        let exceptions = vec![
            blocked(user, MONDAY_MS, 900, 960),
            blocked(user, MONDAY_MS, 600, 660),
        ];

        let windows = materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
        let spans: Vec<(i32, i32)> = windows.iter().map(|w| (w.start_min, w.end_min)).collect();
        assert_eq!(spans, vec![(480, 600), (660, 900), (960, 1080)]);
    }

    #[test]
    fn test_materialization_is_idempotent() {
        let user = new_entity_id();
        let rules = vec![rule(user, 1, 540, 1020), rule(user, 3, 600, 900)];
        let exceptions = vec![blocked(user, MONDAY_MS, 720, 780)];

        let first =
            materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS + 6 * DAY_MS);
        let second =
            materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS + 6 * DAY_MS);
        assert_eq!(first, second);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::{new_entity_id, MINUTES_PER_DAY};
    use proptest::prelude::*;

    const MONDAY_MS: i64 = 4 * DAY_MS;

    prop_compose! {
        fn interval()(start in 0i32..MINUTES_PER_DAY)(
            start in Just(start),
            end in (start + 1)..=MINUTES_PER_DAY,
        ) -> (i32, i32) {
            (start, end)
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Every materialized window satisfies the interval invariant and
        /// never exceeds its source rule's span.
        #[test]
        fn prop_windows_satisfy_interval_invariant(
            (rule_start, rule_end) in interval(),
            blocks in prop::collection::vec(interval(), 0..4),
        ) {
            let user = new_entity_id();
            let rules = vec![AvailabilityRule::new(user, 1, rule_start, rule_end)];
            let exceptions: Vec<_> = blocks
                .iter()
                .map(|(s, e)| CalendarException::new(
                    user, MONDAY_MS, *s, *e, ExceptionKind::Blocked,
                ))
                .collect();

            let windows =
                materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
            for w in &windows {
                prop_assert!(w.start_min < w.end_min);
                prop_assert!(w.start_min >= rule_start);
                prop_assert!(w.end_min <= rule_end);
            }
        }

        /// Remaining windows are pairwise disjoint and never intersect any
        /// blocked interval.
        #[test]
        fn prop_windows_disjoint_and_outside_blocks(
            (rule_start, rule_end) in interval(),
            blocks in prop::collection::vec(interval(), 0..4),
        ) {
            let user = new_entity_id();
            let rules = vec![AvailabilityRule::new(user, 1, rule_start, rule_end)];
            let exceptions: Vec<_> = blocks
                .iter()
                .map(|(s, e)| CalendarException::new(
                    user, MONDAY_MS, *s, *e, ExceptionKind::Blocked,
                ))
                .collect();

            let windows =
                materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);

            for pair in windows.windows(2) {
                prop_assert!(pair[0].end_min <= pair[1].start_min);
            }
            for w in &windows {
                for (bs, be) in &blocks {
                    prop_assert!(w.start_min.max(*bs) >= w.end_min.min(*be));
                }
            }
        }

        /// Subtracting blocks removes exactly the covered minutes: the
        /// remaining total equals the rule span minus the union of the
        /// clipped blocks.
        #[test]
        fn prop_subtraction_conserves_minutes(
            (rule_start, rule_end) in interval(),
            blocks in prop::collection::vec(interval(), 0..4),
        ) {
            let user = new_entity_id();
            let rules = vec![AvailabilityRule::new(user, 1, rule_start, rule_end)];
            let exceptions: Vec<_> = blocks
                .iter()
                .map(|(s, e)| CalendarException::new(
                    user, MONDAY_MS, *s, *e, ExceptionKind::Blocked,
                ))
                .collect();

            let windows =
                materialize_windows(user, &rules, &exceptions, MONDAY_MS, MONDAY_MS);
            let remaining: i32 = windows.iter().map(|w| w.duration_minutes()).sum();

            let mut covered = 0;
            for minute in rule_start..rule_end {
                if blocks.iter().any(|(s, e)| *s <= minute && minute < *e) {
                    covered += 1;
                }
            }
            prop_assert_eq!(remaining, rule_end - rule_start - covered);
        }
    }
}
