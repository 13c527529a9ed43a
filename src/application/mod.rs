use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod actions;
pub mod bootstrap;
pub mod conflicts;
pub mod delivery;
pub mod pause_watcher;
pub mod queue;
pub mod scheduler_runner;
pub mod scheduling;
pub mod service;

/// Injected clock, so tests can pin time.
pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
