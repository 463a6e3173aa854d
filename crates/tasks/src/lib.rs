//! Task spawning for tether services.
//!
//! Link advances, bonding races, deduplication exchanges and transport services all run as
//! independent tasks on one shared tokio runtime. [`TaskExecutor`] names each task, wraps it in a
//! tracing span and counts spawns and completions.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span};

mod metrics;
use crate::metrics::{TaskCounters, TaskKind};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Spawns named tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    handle: Handle,
}

impl TaskExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Executor on the runtime the caller is running in.
    pub fn try_current() -> Result<Self, TaskError> {
        Ok(Self::new(Handle::try_current()?))
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawns a regular task. Dropping the returned handle detaches the task.
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let finished = TaskCounters::new(name, TaskKind::Regular).spawned();
        let task = async move {
            let _finished = finished;
            fut.await;
        }
        .instrument(info_span!("task", name));

        TaskHandle {
            name,
            inner: self.handle.spawn(task),
        }
    }

    /// Spawns a task whose panic is caught and reported instead of silently lost.
    pub fn spawn_critical<F>(&self, name: &'static str, fut: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let counters = TaskCounters::new(name, TaskKind::Critical);
        let finished = counters.spawned();
        let task = async move {
            let _finished = finished;
            if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
                counters.panicked();
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown".to_string());
                error!(task = name, %reason, "Critical task panicked");
            }
        }
        .instrument(info_span!("task", name));

        TaskHandle {
            name,
            inner: self.handle.spawn(task),
        }
    }
}

/// Handle to a spawned task.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    inner: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancels the task at its next suspension point.
    pub fn abort(&self) {
        self.inner.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Waits for the task to finish. Returns `false` if it was aborted or panicked.
    pub async fn join(self) -> bool {
        self.inner.await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawn_runs_to_completion() {
        let executor = TaskExecutor::try_current().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        let handle = executor.spawn("test", async move {
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(handle.name(), "test");
        assert!(handle.join().await);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_abort_cancels_task() {
        let executor = TaskExecutor::try_current().unwrap();
        let handle = executor.spawn("sleeper", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        handle.abort();
        assert!(!handle.join().await);
    }

    #[tokio::test]
    async fn test_critical_panic_is_caught() {
        let executor = TaskExecutor::try_current().unwrap();
        let handle = executor.spawn_critical("boom", async {
            panic!("boom");
        });

        // The panic is swallowed by the wrapper so the join succeeds.
        assert!(handle.join().await);
    }

    #[test]
    fn test_no_runtime() {
        assert!(TaskExecutor::try_current().is_err());
    }
}
