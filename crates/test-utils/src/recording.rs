use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_connection::{Connection, ConnectionObserver, Link, LinkKind};
use tether_manager::{AdvanceReason, ConnectionInformation, ManagedConnectionListener};
use tether_primitives::{ChainId, ConnectionState};
use tokio::sync::watch;

/// A connection event as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Opened(ChainId),
    State(ChainId, ConnectionState),
    Link(ChainId, LinkKind),
    Identity(ChainId),
}

/// Records every connection event in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// States reported for `chain_id`, in order.
    pub fn states(&self, chain_id: ChainId) -> Vec<ConnectionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::State(id, state) if *id == chain_id => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_connection(&self, connection: &Connection) {
        self.events.lock().push(ObservedEvent::Opened(connection.chain_id()));
    }

    fn on_connection_state_changed(&self, connection: &Connection, state: ConnectionState) {
        self.events
            .lock()
            .push(ObservedEvent::State(connection.chain_id(), state));
    }

    fn on_link_changed(&self, connection: &Connection, link: &Link) {
        self.events
            .lock()
            .push(ObservedEvent::Link(connection.chain_id(), link.kind()));
    }

    fn on_link_identity_changed(&self, connection: &Connection, _link: &Link) {
        self.events
            .lock()
            .push(ObservedEvent::Identity(connection.chain_id()));
    }
}

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps every published connection list.
pub struct RecordingListener {
    latest: watch::Sender<Vec<ConnectionInformation>>,
    publications: Mutex<usize>,
}

impl Default for RecordingListener {
    fn default() -> Self {
        let (latest, _) = watch::channel(Vec::new());
        Self {
            latest,
            publications: Mutex::new(0),
        }
    }
}

impl RecordingListener {
    pub fn latest(&self) -> Vec<ConnectionInformation> {
        self.latest.borrow().clone()
    }

    pub fn publications(&self) -> usize {
        *self.publications.lock()
    }

    /// Waits until a published list satisfies `condition`. Returns `None` after a few seconds.
    pub async fn wait_for(
        &self,
        mut condition: impl FnMut(&[ConnectionInformation]) -> bool,
    ) -> Option<Vec<ConnectionInformation>> {
        let mut rx = self.latest.subscribe();
        let found = tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|list| condition(list))).await;
        match found {
            Ok(Ok(list)) => Some(list.clone()),
            _ => None,
        }
    }
}

impl ManagedConnectionListener for RecordingListener {
    fn on_connections(&self, connections: &[ConnectionInformation]) {
        *self.publications.lock() += 1;
        self.latest.send_replace(connections.to_vec());
    }
}

/// Accepts every advance once, then forwards the list to a [`RecordingListener`].
pub struct AcceptingListener {
    recorder: Arc<RecordingListener>,
    accepted: Mutex<HashSet<(ChainId, AdvanceReason)>>,
}

impl AcceptingListener {
    pub fn new(recorder: Arc<RecordingListener>) -> Self {
        Self {
            recorder,
            accepted: Mutex::new(HashSet::new()),
        }
    }
}

impl ManagedConnectionListener for AcceptingListener {
    fn on_connections(&self, connections: &[ConnectionInformation]) {
        for info in connections {
            if let Some(advance) = &info.advance {
                if self.accepted.lock().insert((info.chain_id, advance.reason())) {
                    advance.accept();
                }
            }
        }
        self.recorder.on_connections(connections);
    }
}
