//! Task counters, labelled by task name and kind.

use core::fmt;

use metrics::Counter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Regular,
    Critical,
}

impl TaskKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Critical => "critical",
        }
    }
}

/// Counters for one named task.
#[derive(Clone)]
pub(crate) struct TaskCounters {
    spawned: Counter,
    finished: Counter,
    panicked: Counter,
}

impl TaskCounters {
    pub(crate) fn new(name: &'static str, kind: TaskKind) -> Self {
        let kind = kind.as_str();
        Self {
            spawned: metrics::counter!("tasks.spawned_total", "task" => name, "kind" => kind),
            finished: metrics::counter!("tasks.finished_total", "task" => name, "kind" => kind),
            panicked: metrics::counter!("tasks.panicked_total", "task" => name, "kind" => kind),
        }
    }

    /// Counts a spawn. The returned guard counts the finish when dropped.
    pub(crate) fn spawned(&self) -> FinishGuard {
        self.spawned.increment(1);
        FinishGuard(self.finished.clone())
    }

    pub(crate) fn panicked(&self) {
        self.panicked.increment(1);
    }
}

impl fmt::Debug for TaskCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCounters").finish_non_exhaustive()
    }
}

/// Increments the finished counter on drop, so aborted and panicked tasks are counted too.
pub(crate) struct FinishGuard(Counter);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.increment(1);
    }
}
