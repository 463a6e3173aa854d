use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_tasks::{TaskExecutor, TaskHandle};
use tracing::{debug, info};

use crate::{ServiceSignals, should_run};

/// A long-running service, started and cancelled by a [`ServiceController`].
///
/// `run` is cancelled by dropping its future at any suspension point.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait LifecycleService: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self);
}

#[derive(Default)]
struct Tasks {
    detector: Option<TaskHandle>,
    service: Option<TaskHandle>,
}

struct Shared {
    service: Arc<dyn LifecycleService>,
    executor: TaskExecutor,
    tasks: Mutex<Tasks>,
}

impl Shared {
    /// Starts or cancels the service on an edge of the run decision.
    fn toggle(self: &Arc<Self>, run: bool) {
        let mut tasks = self.tasks.lock();
        let running = tasks.service.as_ref().is_some_and(|task| !task.is_finished());
        let name = self.service.name();

        if run && !running {
            info!(service = name, "Starting service");
            let service = self.service.clone();
            let task = self.executor.spawn_critical("service", async move {
                service.run().await;
                debug!(service = service.name(), "Service exited");
            });
            tasks.service = Some(task);
        } else if !run && running {
            info!(service = name, "Stopping service");
            if let Some(task) = tasks.service.take() {
                task.abort();
            }
        }
    }
}

/// Keeps one service task running while its signals say so.
pub struct ServiceController {
    signals: ServiceSignals,
    shared: Arc<Shared>,
}

impl ServiceController {
    pub fn new(
        service: Arc<dyn LifecycleService>,
        signals: ServiceSignals,
        executor: TaskExecutor,
    ) -> Self {
        Self {
            signals,
            shared: Arc::new(Shared {
                service,
                executor,
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn signals(&self) -> &ServiceSignals {
        &self.signals
    }

    pub fn is_observing(&self) -> bool {
        self.shared
            .tasks
            .lock()
            .detector
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .tasks
            .lock()
            .service
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Starts reacting to the signals. Idempotent.
    pub fn observe(&self) {
        let mut tasks = self.shared.tasks.lock();
        if tasks.detector.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        debug!(service = self.shared.service.name(), "Observing service signals");

        let shared = self.shared.clone();
        let signals = self.signals.clone();
        let detector = self.shared.executor.spawn_critical("service-signals", async move {
            detect_edges(shared, signals).await;
        });
        tasks.detector = Some(detector);
    }

    /// Stops reacting and cancels the running service, if any.
    pub fn stop_observing(&self) {
        let mut tasks = self.shared.tasks.lock();
        if let Some(task) = tasks.detector.take() {
            task.abort();
        }
        if let Some(task) = tasks.service.take() {
            debug!(service = self.shared.service.name(), "Cancelling service");
            task.abort();
        }
    }
}

impl Drop for ServiceController {
    fn drop(&mut self) {
        self.stop_observing();
    }
}

async fn detect_edges(shared: Arc<Shared>, signals: ServiceSignals) {
    let mut preference = signals.preference.subscribe();
    let mut permission = signals.permission.subscribe();
    let mut availability = signals.availability.subscribe();
    let mut retry = signals.retry.subscribe();
    let mut last = None;

    loop {
        let run = should_run(
            *preference.borrow_and_update(),
            *permission.borrow_and_update(),
            *availability.borrow_and_update(),
            *retry.borrow_and_update(),
        );
        if last != Some(run) {
            debug!(service = shared.service.name(), run, "Run decision changed");
            shared.toggle(run);
            last = Some(run);
        }

        let changed = tokio::select! {
            res = preference.changed() => res,
            res = permission.changed() => res,
            res = availability.changed() => res,
            res = retry.changed() => res,
        };
        if changed.is_err() {
            return;
        }
    }
}
