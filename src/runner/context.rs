//! Shared scheduler dependencies.
//!
//! [`SchedulerContext`] is built once at startup and handed to every
//! component that needs the store, the dispatcher, or the recorder:
//! explicit wiring instead of ambient module state.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::dispatch::Dispatcher;
use crate::history::ExecutionRecorder;
use crate::storage::TaskStore;

/// Dependencies shared by the task runner and watchdog.
#[derive(Clone)]
pub struct SchedulerContext {
    /// The persistent task store (single source of truth).
    pub store: Arc<dyn TaskStore>,
    /// Type-dispatched execution strategies.
    pub dispatcher: Arc<Dispatcher>,
    /// Execution-history recorder.
    pub recorder: ExecutionRecorder,
    /// Scheduler timing knobs.
    pub config: SchedulerConfig,
}

impl SchedulerContext {
    /// Assemble a context; the recorder is derived from the store.
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<Dispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        let recorder = ExecutionRecorder::new(Arc::clone(&store));
        Self {
            store,
            dispatcher,
            recorder,
            config,
        }
    }
}
