//! The Scheduler (spec §4.7): cron/interval/once triggers driving
//! workflow executions, with queued-not-parallel firing semantics.

pub mod scheduler;
pub mod types;

pub use scheduler::Scheduler;
pub use types::{next_fire_after, FiringRecord, FiringStatus, Recurrence, Schedule, ScheduleStatus};
