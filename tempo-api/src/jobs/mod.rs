//! Background tasks.

pub mod reschedule_poller;

pub use reschedule_poller::{reschedule_poller_task, PollerMetrics, PollerSnapshot};
