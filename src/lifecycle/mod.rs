//! Lifecycle management module.
//!
//! This module owns the per-network-function state machine, the automatic
//! naming and layout rules, and the simulated-clock scheduler every delayed
//! transition runs on.

pub mod scheduler;
pub mod rules;
pub mod engine;

// Re-export commonly used types
pub use scheduler::{ScheduledTask, TaskKey, TaskKind, TaskScheduler};
pub use rules::{auto_connect_targets, grid_position, NamingCounters};
pub use engine::{AutoConnectOutcome, LifecycleEngine};
