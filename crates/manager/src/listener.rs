//! Listener surfaces between the orchestrator, the merging layer and the application.

use hashlink::LinkedHashMap;
use tether_connection::Link;
use tether_primitives::{ChainId, ConnectionState};
use tokio::sync::broadcast;

use crate::ConnectionInformation;

/// Receives per-connection changes from the orchestrator.
#[auto_impl::auto_impl(&, Arc)]
pub trait ConnectionEventSink: Send + Sync {
    fn added(&self, info: ConnectionInformation);

    /// `link` is set when the change came from the link rather than the connection state.
    fn updated(&self, info: ConnectionInformation, link: Option<Link>);

    fn removed(&self, chain_id: ChainId);
}

/// The application's view: the full ordered list of live connections after every change.
///
/// Called synchronously from inside the publishing layer. Implementations must not block, and
/// must not call back into the session from the same thread.
#[auto_impl::auto_impl(&, Arc)]
pub trait ManagedConnectionListener: Send + Sync {
    fn on_connections(&self, connections: &[ConnectionInformation]);
}

/// Replaces an entry in place, or appends it.
pub(crate) fn upsert(
    entries: &mut LinkedHashMap<ChainId, ConnectionInformation>,
    info: ConnectionInformation,
) {
    match entries.get_mut(&info.chain_id) {
        Some(entry) => *entry = info,
        None => {
            entries.insert(info.chain_id, info);
        }
    }
}

/// Entries the application sees: everything not closed, in insertion order.
pub(crate) fn visible(
    entries: &LinkedHashMap<ChainId, ConnectionInformation>,
) -> Vec<ConnectionInformation> {
    entries
        .values()
        .filter(|info| info.state != ConnectionState::Closed)
        .cloned()
        .collect()
}

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Turns the listener callback into a broadcast stream of connection lists.
///
/// Slow subscribers lag and skip lists independently.
#[derive(Debug, Clone)]
pub struct ConnectionsPublisher {
    tx: broadcast::Sender<Vec<ConnectionInformation>>,
}

impl Default for ConnectionsPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ConnectionsPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<ConnectionInformation>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl ManagedConnectionListener for ConnectionsPublisher {
    fn on_connections(&self, connections: &[ConnectionInformation]) {
        let _ = self.tx.send(connections.to_vec());
    }
}
