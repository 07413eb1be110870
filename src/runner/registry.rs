//! Periodic-task registry.
//!
//! The scheduler's poll loop and watchdog are short-lived functions invoked
//! on a timer by a host facility, expressed here as the [`PeriodicTasks`]
//! trait. [`TimerRegistry`] is the tokio implementation: one background
//! interval loop per registered entry. A loop whose tokio task has died is
//! reported as absent, which is exactly what the watchdog looks for.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Future returned by a periodic job invocation.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A periodic job: a factory producing one invocation future per firing.
pub type PeriodicJob = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Registration details for a periodic job.
#[derive(Debug, Clone)]
pub struct PeriodicSpec {
    /// Unique registration name.
    pub name: String,
    /// Interval between invocations.
    pub every: Duration,
    /// Delay before the first invocation.
    pub initial_delay: Duration,
}

/// Host facility for running functions on a timer.
pub trait PeriodicTasks: Send + Sync {
    /// Register a job, replacing any existing registration with the same name.
    fn register(&self, spec: PeriodicSpec, job: PeriodicJob);

    /// Look up a live registration. Dead registrations report as absent.
    fn get(&self, name: &str) -> Option<PeriodicSpec>;

    /// Remove a registration, stopping its loop. Returns whether it existed.
    fn unregister(&self, name: &str) -> bool;
}

struct RegisteredJob {
    spec: PeriodicSpec,
    handle: JoinHandle<()>,
}

/// Tokio-based periodic-task registry.
pub struct TimerRegistry {
    entries: Mutex<HashMap<String, RegisteredJob>>,
}

impl TimerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_loop(spec: PeriodicSpec, job: PeriodicJob) {
    tokio::time::sleep(spec.initial_delay).await;
    let mut interval = tokio::time::interval(spec.every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        debug!(job = %spec.name, "periodic job firing");
        job().await;
    }
}

impl PeriodicTasks for TimerRegistry {
    fn register(&self, spec: PeriodicSpec, job: PeriodicJob) {
        let handle = tokio::spawn(run_loop(spec.clone(), job));
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = entries.insert(
            spec.name.clone(),
            RegisteredJob { spec, handle },
        ) {
            previous.handle.abort();
        }
    }

    fn get(&self, name: &str) -> Option<PeriodicSpec> {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.get(name) {
            Some(entry) if !entry.handle.is_finished() => Some(entry.spec.clone()),
            Some(_) => {
                // The loop died; prune it so callers see an empty slot.
                entries.remove(name);
                None
            }
            None => None,
        }
    }

    fn unregister(&self, name: &str) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match entries.remove(name) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        if let Ok(entries) = self.entries.lock() {
            for entry in entries.values() {
                entry.handle.abort();
            }
        }
    }
}
