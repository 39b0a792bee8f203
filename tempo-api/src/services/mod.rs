//! Business logic services.
//!
//! Services are free async functions over the storage abstraction; routes
//! and the background poller call into them. Multi-row invariants are
//! delegated to the store's atomic composite methods.

pub mod event_service;
pub mod optimizer_service;
pub mod plan_service;
pub mod queue_service;
pub mod window_service;
