//! A connection and its observers.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_primitives::{ChainId, ConnectionState, Identity};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::link::{ConnectedLink, Link};
use crate::LinkError;

/// Receives connection events.
///
/// Events are delivered after the connection's lock is released, in order per connection.
/// Events of different connections are not ordered relative to each other.
#[auto_impl::auto_impl(&, Arc)]
pub trait ConnectionObserver: Send + Sync {
    /// A new connection was opened by a transport.
    fn on_connection(&self, _connection: &Connection) {}

    fn on_connection_state_changed(&self, _connection: &Connection, _state: ConnectionState) {}

    /// The active link was replaced.
    fn on_link_changed(&self, _connection: &Connection, _link: &Link) {}

    /// The active link learned more about the peer.
    fn on_link_identity_changed(&self, _connection: &Connection, _link: &Link) {}
}

/// Resolution of the wait for the first connected link.
#[derive(Clone)]
enum Connected {
    Pending,
    Fulfilled(Arc<ConnectedLink>),
    Cancelled,
}

struct Slot {
    closed: bool,
    link: Option<Link>,
}

struct ConnectionInner {
    chain_id: ChainId,
    slot: Mutex<Slot>,
    state: Mutex<ConnectionState>,
    connected: watch::Sender<Connected>,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

/// One logical connection to a peer.
///
/// Holds exactly one active [`Link`] at a time and upgrades it in place. Once the state is
/// terminal the connection is closed for good.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Creates a connection in the `Opening` state without notifying anyone.
    pub fn new(observers: Vec<Arc<dyn ConnectionObserver>>) -> Self {
        let (connected, _) = watch::channel(Connected::Pending);
        Self {
            inner: Arc::new(ConnectionInner {
                chain_id: ChainId::next(),
                slot: Mutex::new(Slot {
                    closed: false,
                    link: None,
                }),
                state: Mutex::new(ConnectionState::Opening),
                connected,
                observers,
            }),
        }
    }

    /// Creates a connection and announces it to the observers.
    pub fn open(observers: Vec<Arc<dyn ConnectionObserver>>) -> Self {
        let connection = Self::new(observers);
        debug!(chain_id = %connection.chain_id(), "Connection opened");
        for observer in &connection.inner.observers {
            observer.on_connection(&connection);
        }
        connection
    }

    pub fn chain_id(&self) -> ChainId {
        self.inner.chain_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.slot.lock().closed
    }

    /// The active link, if one was installed.
    pub fn link(&self) -> Option<Link> {
        self.inner.slot.lock().link.clone()
    }

    /// Best known identity of the peer.
    pub fn identity(&self) -> Option<Identity> {
        self.link().map(|link| link.identity())
    }

    /// User-facing name of the peer.
    pub fn name(&self) -> String {
        self.identity().unwrap_or_default().display_name()
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Replaces the active link and moves to `state`.
    ///
    /// The first connected link installed fulfills the wait of [`Connection::send`] and
    /// [`Connection::receive`]. A link offered to a closed connection is closed instead.
    pub fn set_link(&self, link: Link, state: ConnectionState) {
        {
            let mut slot = self.inner.slot.lock();
            if slot.closed {
                drop(slot);
                debug!(chain_id = %self.chain_id(), kind = %link.kind(), "Link offered to closed connection");
                link.close_channel();
                return;
            }
            slot.link = Some(link.clone());
            if let Link::Connected(connected) = &link {
                self.inner.connected.send_if_modified(|current| {
                    if matches!(current, Connected::Pending) {
                        *current = Connected::Fulfilled(connected.clone());
                        true
                    } else {
                        false
                    }
                });
            }
        }
        debug!(chain_id = %self.chain_id(), kind = %link.kind(), %state, "Link installed");

        self.set_state(state);
        // An observer of the state change may have closed the connection.
        if self.is_closed() {
            return;
        }
        for observer in &self.inner.observers {
            observer.on_link_changed(self, &link);
        }
    }

    /// Moves to `state` unless the current state is terminal or already `state`.
    ///
    /// Entering a terminal state closes the connection.
    pub fn set_state(&self, state: ConnectionState) {
        {
            let mut current = self.inner.state.lock();
            if current.is_terminal() || *current == state {
                trace!(chain_id = %self.chain_id(), current = %*current, requested = %state, "State change ignored");
                return;
            }
            *current = state;
        }
        debug!(chain_id = %self.chain_id(), %state, "Connection state changed");

        for observer in &self.inner.observers {
            observer.on_connection_state_changed(self, state);
        }
        if state.is_terminal() {
            self.close();
        }
    }

    /// Tells observers that `link` refined its identity.
    pub fn notify_link_identity_changed(&self, link: &Link) {
        for observer in &self.inner.observers {
            observer.on_link_identity_changed(self, link);
        }
    }

    /// Closes the connection and its active link. Idempotent.
    pub fn close(&self) {
        let link = {
            let mut slot = self.inner.slot.lock();
            if slot.closed {
                return;
            }
            slot.closed = true;
            self.inner.connected.send_if_modified(|current| {
                if matches!(current, Connected::Pending) {
                    *current = Connected::Cancelled;
                    true
                } else {
                    false
                }
            });
            slot.link.clone()
        };
        debug!(chain_id = %self.chain_id(), "Closing connection");

        self.set_state(ConnectionState::Closed);
        if let Some(link) = link {
            link.close_channel();
        }
    }

    /// Sends bytes once the connection is connected.
    ///
    /// Waits for the first connected link. Fails fast if the connection is closed.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.connected_link().await?.send(bytes).await
    }

    /// Receives some bytes once the connection is connected. Returns 0 at end of stream.
    pub async fn receive(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.connected_link().await?.receive(buf).await
    }

    /// Fills `buf` completely.
    pub async fn receive_exact(&self, buf: &mut [u8]) -> Result<(), LinkError> {
        let link = self.connected_link().await?;
        let mut filled = 0;
        while let Some(rest) = buf.get_mut(filled..).filter(|rest| !rest.is_empty()) {
            match link.receive(rest).await? {
                0 => {
                    return Err(LinkError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
                n => filled += n,
            }
        }
        Ok(())
    }

    async fn connected_link(&self) -> Result<Arc<ConnectedLink>, LinkError> {
        self.check_open()?;
        let mut rx = self.inner.connected.subscribe();
        let resolved = rx
            .wait_for(|connected| !matches!(connected, Connected::Pending))
            .await
            .map_err(|_| LinkError::ConnectionClosed)?
            .clone();
        self.check_open()?;
        match resolved {
            Connected::Fulfilled(link) => Ok(link),
            Connected::Pending | Connected::Cancelled => Err(LinkError::ConnectionClosed),
        }
    }

    fn check_open(&self) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::ConnectionClosed);
        }
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("chain_id", &self.chain_id())
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Non-owning handle held by links, so a connection and its link do not keep each other alive.
#[derive(Clone)]
pub struct WeakConnection(Weak<ConnectionInner>);

impl WeakConnection {
    pub fn upgrade(&self) -> Option<Connection> {
        self.0.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakConnection").finish()
    }
}
