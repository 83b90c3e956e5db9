//! Cron scheduling
//!
//! `CronRunner` fires a callback on a 5-field cron schedule; the registry loop
//! owns one runner per scheduled pipeline and applies register/unregister
//! requests in order.

pub mod registry;
pub mod runner;

pub use registry::{Registry, SchedulerCommand, SchedulerHandle};
pub use runner::{CronRunner, CronTimezone, RunnerStats, ScheduleError, next_run_time, next_run_time_at};

use async_trait::async_trait;
use uuid::Uuid;

/// Invoked each time a pipeline's schedule is due
#[async_trait]
pub trait FireHandler: Send + Sync {
    async fn fire(&self, pipeline_id: Uuid);
}
