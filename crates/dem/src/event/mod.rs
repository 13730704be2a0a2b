//! Event status engine
//!
//! [`effects`] holds the pure `(old status, trigger) -> (new status,
//! effects)` transitions; [`engine`] applies them to the status store and
//! runs the side effects (storage, counters, notifications).

pub mod availability;
pub mod effects;
pub mod engine;

pub use effects::{effect, EventEffects, FailedContext, Transition};
