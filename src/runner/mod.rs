//! Scheduler core: the poll-driven task runner, its shared context, the
//! periodic-task registry, and the watchdog.

mod context;
pub mod registry;
#[allow(clippy::module_inception)]
mod runner;
mod watchdog;

pub use context::SchedulerContext;
pub use registry::{JobFuture, PeriodicJob, PeriodicSpec, PeriodicTasks, TimerRegistry};
pub use runner::TaskRunner;
pub use watchdog::{install_runner, install_watchdog, Watchdog, TASK_RUNNER_JOB, WATCHDOG_JOB};
