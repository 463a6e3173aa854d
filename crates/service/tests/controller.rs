use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tether_service::{
    Availability, LifecycleService, Permission, Preference, ServiceController, ServiceSignals,
    Signal,
};
use tether_tasks::TaskExecutor;

#[derive(Default)]
struct CountingService {
    started: AtomicUsize,
    stopped: Arc<AtomicUsize>,
    /// When set, the run returns immediately and closes this preference.
    exits_into: Option<Signal<Preference>>,
}

struct OnDrop(Arc<AtomicUsize>);

impl Drop for OnDrop {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LifecycleService for CountingService {
    fn name(&self) -> &str {
        "counting"
    }

    async fn run(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _stopped = OnDrop(self.stopped.clone());
        match &self.exits_into {
            Some(preference) => {
                preference.set(Preference::Closed);
            }
            None => std::future::pending::<()>().await,
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_rising_edge_starts_one_task() {
    init_tracing();
    let service = Arc::new(CountingService::default());
    let signals = ServiceSignals::default();
    let controller = ServiceController::new(
        service.clone(),
        signals.clone(),
        TaskExecutor::try_current().unwrap(),
    );
    controller.observe();
    controller.observe();
    assert!(controller.is_observing());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!controller.is_running());

    signals.preference.set(Preference::Open);
    wait_until(|| controller.is_running()).await;

    // Another change that keeps the decision true is not an edge.
    signals.permission.set(Permission::Granted);
    signals.availability.set(Availability::Available);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_falling_edge_cancels_task() {
    init_tracing();
    let service = Arc::new(CountingService::default());
    let signals = ServiceSignals::default();
    signals.preference.set(Preference::Open);
    let controller = ServiceController::new(
        service.clone(),
        signals.clone(),
        TaskExecutor::try_current().unwrap(),
    );
    controller.observe();
    wait_until(|| service.started.load(Ordering::SeqCst) == 1).await;

    signals.availability.set(Availability::Unavailable);
    wait_until(|| service.stopped.load(Ordering::SeqCst) == 1).await;
    assert!(!controller.is_running());

    signals.availability.set(Availability::Available);
    wait_until(|| service.started.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test]
async fn test_stop_observing_cancels_everything() {
    init_tracing();
    let service = Arc::new(CountingService::default());
    let signals = ServiceSignals::default();
    signals.preference.set(Preference::Open);
    let controller = ServiceController::new(
        service.clone(),
        signals.clone(),
        TaskExecutor::try_current().unwrap(),
    );
    controller.observe();
    wait_until(|| controller.is_running()).await;

    controller.stop_observing();
    wait_until(|| service.stopped.load(Ordering::SeqCst) == 1).await;
    assert!(!controller.is_observing());

    // No longer reacting.
    signals.preference.set(Preference::Closed);
    signals.preference.set(Preference::Open);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_self_terminating_service_can_restart() {
    init_tracing();
    let signals = ServiceSignals::default();
    let service = Arc::new(CountingService {
        exits_into: Some(signals.preference.clone()),
        ..Default::default()
    });
    let controller = ServiceController::new(
        service.clone(),
        signals.clone(),
        TaskExecutor::try_current().unwrap(),
    );
    controller.observe();

    signals.preference.set(Preference::Open);
    wait_until(|| signals.preference.get() == Preference::Closed).await;
    assert_eq!(service.started.load(Ordering::SeqCst), 1);
    // Let the controller observe the falling edge before raising it again.
    tokio::time::sleep(Duration::from_millis(20)).await;

    signals.preference.set(Preference::Open);
    wait_until(|| service.started.load(Ordering::SeqCst) == 2).await;
}

struct PanickingService {
    started: AtomicUsize,
}

#[async_trait]
impl LifecycleService for PanickingService {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn run(&self) {
        if self.started.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("transport crashed");
        }
        std::future::pending::<()>().await
    }
}

#[tokio::test]
async fn test_panicking_service_keeps_controller_alive() {
    init_tracing();
    let service = Arc::new(PanickingService {
        started: AtomicUsize::new(0),
    });
    let signals = ServiceSignals::default();
    let controller = ServiceController::new(
        service.clone(),
        signals.clone(),
        TaskExecutor::try_current().unwrap(),
    );
    controller.observe();

    signals.preference.set(Preference::Open);
    wait_until(|| service.started.load(Ordering::SeqCst) == 1 && !controller.is_running()).await;
    assert!(controller.is_observing());

    signals.preference.set(Preference::Closed);
    tokio::time::sleep(Duration::from_millis(20)).await;
    signals.preference.set(Preference::Open);
    wait_until(|| controller.is_running()).await;
    assert_eq!(service.started.load(Ordering::SeqCst), 2);
}
