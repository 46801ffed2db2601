//! Background work
//!
//! - `ReloadScheduler` - Periodic OpenAPI re-fetch and tool snapshot swap
//! - `SchedulerHandle` - Stops the running loop

pub mod scheduler;

pub use scheduler::{load_initial, ReloadOutcome, ReloadScheduler, SchedulerHandle};
