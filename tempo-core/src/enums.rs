//! Domain enums and their state-transition tables.
//!
//! Wire format is SCREAMING_SNAKE_CASE to match the task service's JSON
//! contract. `as_str`/`FromStr` give the storage layer a stable TEXT
//! representation identical to the wire form.

use crate::error::ScheduleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! text_repr {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable TEXT representation used by the wire format and storage.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ScheduleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ScheduleError::validation(format!(
                        concat!("unknown ", stringify!($ty), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

// ============================================================================
// AVAILABILITY
// ============================================================================

/// Lifecycle status of a recurring availability rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    Active,
    Inactive,
}

text_repr!(AvailabilityStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

/// Kind of one-off calendar exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionKind {
    /// Removes the overlapping sub-interval from that date's availability.
    Blocked,
    /// Adds a one-off window on that date.
    Extra,
}

text_repr!(ExceptionKind {
    Blocked => "BLOCKED",
    Extra => "EXTRA",
});

// ============================================================================
// PLANS
// ============================================================================

/// Shape of a schedule plan's date horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    /// Open-ended plan that rolls forward from its start date.
    Rolling,
    /// Fixed `[start, end]` horizon.
    Fixed,
}

text_repr!(PlanType {
    Rolling => "ROLLING",
    Fixed => "FIXED",
});

/// Lifecycle status of a schedule plan.
///
/// Exactly one plan per user may be `Active` at a time. A `Proposed` plan is
/// a candidate cloned from the active plan; it never governs the live
/// schedule until applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Draft,
    Active,
    Proposed,
    Optimizing,
    Archived,
    Failed,
}

text_repr!(PlanStatus {
    Draft => "DRAFT",
    Active => "ACTIVE",
    Proposed => "PROPOSED",
    Optimizing => "OPTIMIZING",
    Archived => "ARCHIVED",
    Failed => "FAILED",
});

impl PlanStatus {
    /// Allowed transitions. Reverting an archived plan creates a new
    /// version instead of flipping the archived row, so `Archived` has no
    /// outgoing arrows.
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Archived)
                | (Proposed, Optimizing)
                | (Proposed, Active)
                | (Proposed, Archived)
                | (Optimizing, Proposed)
                | (Optimizing, Failed)
                | (Failed, Archived)
        )
    }
}

// ============================================================================
// TASKS
// ============================================================================

/// Priority of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
}

text_repr!(Priority {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
});

/// Scheduling status of a per-plan task snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskScheduleStatus {
    /// Not yet placed into any window.
    Pending,
    /// Has at least one planned event.
    Scheduled,
    /// The optimizer could not place it; see `unscheduled_reason`.
    Unschedulable,
    /// Every part has been completed.
    Completed,
}

text_repr!(TaskScheduleStatus {
    Pending => "PENDING",
    Scheduled => "SCHEDULED",
    Unschedulable => "UNSCHEDULABLE",
    Completed => "COMPLETED",
});

/// Classification of an incoming task update against the stored snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    /// Nothing observable changed.
    None,
    /// Display-only change (title, category); no rescheduling needed.
    Cosmetic,
    /// A scheduling constraint changed; the plan must be re-optimized.
    Constraint,
}

// ============================================================================
// EVENTS
// ============================================================================

/// Lifecycle status of a placed schedule event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Planned,
    Done,
    Skipped,
}

text_repr!(EventStatus {
    Planned => "PLANNED",
    Done => "DONE",
    Skipped => "SKIPPED",
});

impl EventStatus {
    /// `Done` and `Skipped` are terminal.
    pub fn can_transition_to(&self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!((self, next), (Planned, Done) | (Planned, Skipped))
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Planned)
    }
}

// ============================================================================
// RESCHEDULE QUEUE
// ============================================================================

/// What kind of change produced a reschedule trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    TaskAdded,
    TaskUpdated,
    TaskDeleted,
    ConstraintChange,
    EventMove,
    EventSplit,
    EventComplete,
    WindowChange,
}

text_repr!(TriggerType {
    TaskAdded => "TASK_ADDED",
    TaskUpdated => "TASK_UPDATED",
    TaskDeleted => "TASK_DELETED",
    ConstraintChange => "CONSTRAINT_CHANGE",
    EventMove => "EVENT_MOVE",
    EventSplit => "EVENT_SPLIT",
    EventComplete => "EVENT_COMPLETE",
    WindowChange => "WINDOW_CHANGE",
});

impl TriggerType {
    /// Drain priority within a plan's batch; lower is more urgent.
    pub fn default_priority(&self) -> i32 {
        match self {
            TriggerType::TaskDeleted => 1,
            TriggerType::ConstraintChange | TriggerType::WindowChange => 2,
            TriggerType::TaskAdded | TriggerType::TaskUpdated => 3,
            TriggerType::EventMove | TriggerType::EventSplit => 4,
            TriggerType::EventComplete => 5,
        }
    }
}

/// Lifecycle status of a reschedule queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

text_repr!(QueueStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

/// Entity kind a queue item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Task,
    Event,
    Window,
}

text_repr!(EntityKind {
    Task => "TASK",
    Event => "EVENT",
    Window => "WINDOW",
});

// ============================================================================
// OPTIMIZATION
// ============================================================================

/// Reschedule strategy applied by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescheduleStrategy {
    /// Greedy insertion plus ripple effect for critical tasks.
    Ripple,
    /// Greedy insertion only.
    Insertion,
    /// Re-schedule everything from scratch.
    FullReplan,
    /// Deep optimization through the external solver.
    OptimalReplan,
}

text_repr!(RescheduleStrategy {
    Ripple => "RIPPLE",
    Insertion => "INSERTION",
    FullReplan => "FULL_REPLAN",
    OptimalReplan => "OPTIMAL_REPLAN",
});

/// Algorithm recorded on a plan after optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    Hybrid,
    CpSat,
    Milp,
    LocalSearch,
    Heuristic,
    FallbackChain,
}

text_repr!(Algorithm {
    Hybrid => "HYBRID",
    CpSat => "CP_SAT",
    Milp => "MILP",
    LocalSearch => "LOCAL_SEARCH",
    Heuristic => "HEURISTIC",
    FallbackChain => "FALLBACK_CHAIN",
});

/// Solver strategy requested by a deep-optimize caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    CpSat,
    Milp,
    LocalSearch,
    Heuristic,
    Auto,
}

text_repr!(StrategyKind {
    CpSat => "CP_SAT",
    Milp => "MILP",
    LocalSearch => "LOCAL_SEARCH",
    Heuristic => "HEURISTIC",
    Auto => "AUTO",
});
