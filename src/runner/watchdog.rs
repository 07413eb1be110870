//! Watchdog: keeps the task runner installed.
//!
//! The poll loop lives in the host's periodic-task registry and can vanish
//! there (host restart edge cases, registration eviction, a panicked
//! loop). The watchdog runs on a longer period, checks for the runner's
//! registration, and re-installs it when missing. It is the backstop for
//! total loss of the runner, not for per-task errors.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::runner::context::SchedulerContext;
use crate::runner::registry::{PeriodicJob, PeriodicSpec, PeriodicTasks};
use crate::runner::runner::TaskRunner;

/// Registry name of the poll loop.
pub const TASK_RUNNER_JOB: &str = "tempo.task-runner";

/// Registry name of the watchdog itself.
pub const WATCHDOG_JOB: &str = "tempo.watchdog";

/// Install the poll loop into the periodic registry.
pub fn install_runner(registry: &Arc<dyn PeriodicTasks>, runner: Arc<TaskRunner>) {
    let config = runner.context().config.clone();
    let spec = PeriodicSpec {
        name: TASK_RUNNER_JOB.to_string(),
        every: config.poll_interval(),
        initial_delay: config.startup_offset(),
    };
    let job: PeriodicJob = Arc::new(move || {
        let runner = Arc::clone(&runner);
        Box::pin(async move {
            runner.poll_once().await;
        })
    });
    registry.register(spec, job);
}

/// Periodic self-check that re-installs a vanished task runner.
pub struct Watchdog {
    registry: Arc<dyn PeriodicTasks>,
    runner: Arc<TaskRunner>,
}

impl Watchdog {
    /// Create a watchdog over the registry and runner.
    pub fn new(registry: Arc<dyn PeriodicTasks>, runner: Arc<TaskRunner>) -> Self {
        Self { registry, runner }
    }

    /// One watchdog pass: re-register the runner if its registration is gone.
    pub fn check(&self) {
        if self.registry.get(TASK_RUNNER_JOB).is_some() {
            debug!("task runner registration healthy");
            return;
        }
        warn!("task runner missing from periodic registry, re-installing");
        install_runner(&self.registry, Arc::clone(&self.runner));
    }

    /// The scheduler context shared with the runner.
    pub fn context(&self) -> &SchedulerContext {
        self.runner.context()
    }
}

/// Install the watchdog into the periodic registry.
///
/// The first check is deferred by a full period: right after startup the
/// runner was just installed by the same code path.
pub fn install_watchdog(registry: &Arc<dyn PeriodicTasks>, watchdog: Arc<Watchdog>) {
    let interval = watchdog.context().config.watchdog_interval();
    let spec = PeriodicSpec {
        name: WATCHDOG_JOB.to_string(),
        every: interval,
        initial_delay: interval,
    };
    let job: PeriodicJob = Arc::new(move || {
        let watchdog = Arc::clone(&watchdog);
        Box::pin(async move {
            watchdog.check();
        })
    });
    registry.register(spec, job);
}
