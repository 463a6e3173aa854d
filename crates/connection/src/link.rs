//! Link stages: unidentified, identified and connected.
//!
//! Each stage consumes the one before it. A successful advance installs the next stage on the
//! owning [`Connection`]; a failed advance closes the raw channel and moves the connection to a
//! terminal state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tether_net_handshake::Role;
use tether_primitives::{ChainId, ConnectionState, ConnectionType, Identity, Join};
use tracing::{debug, warn};

use crate::backend::PairingSignal;
use crate::connection::{Connection, WeakConnection};
use crate::{LinkBackend, LinkConfig, LinkError, RawChannel};

/// Stage of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkKind {
    Unidentified,
    Identified,
    Connected,
}

/// Per-transport parameters every link of a session shares.
#[derive(Debug, Clone)]
pub struct LinkSetup {
    pub role: Role,
    /// Identity presented to peers during identify.
    pub local: Identity,
    pub config: LinkConfig,
}

struct LinkContext {
    chain_id: ChainId,
    connection: WeakConnection,
    setup: LinkSetup,
}

impl LinkContext {
    /// Closes `channel` and moves the owning connection to `state`.
    fn fail(&self, channel: Option<&RawChannel>, state: ConnectionState) {
        if let Some(channel) = channel {
            channel.close();
        }
        if let Some(connection) = self.connection.upgrade() {
            connection.set_state(state);
        }
    }

    fn connection(&self) -> Result<Connection, LinkError> {
        self.connection.upgrade().ok_or(LinkError::ConnectionClosed)
    }
}

/// The active stage of a connection.
#[derive(Clone)]
pub enum Link {
    Unidentified(Arc<UnidentifiedLink>),
    Identified(Arc<IdentifiedLink>),
    Connected(Arc<ConnectedLink>),
}

impl Link {
    pub fn chain_id(&self) -> ChainId {
        self.ctx().chain_id
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            Self::Unidentified(_) => LinkKind::Unidentified,
            Self::Identified(_) => LinkKind::Identified,
            Self::Connected(_) => LinkKind::Connected,
        }
    }

    /// Best known identity of the peer.
    pub fn identity(&self) -> Identity {
        match self {
            Self::Unidentified(link) => link.identity(),
            Self::Identified(link) => link.identity().clone(),
            Self::Connected(link) => link.identity().clone(),
        }
    }

    pub fn connection_type(&self) -> Option<ConnectionType> {
        self.identity().connection_type
    }

    /// Closes the raw channel and moves the owning connection to `Closed`.
    pub fn close(&self) {
        self.close_channel();
        if let Some(connection) = self.ctx().connection.upgrade() {
            connection.set_state(ConnectionState::Closed);
        }
    }

    pub fn ptr_eq(&self, other: &Link) -> bool {
        match (self, other) {
            (Self::Unidentified(a), Self::Unidentified(b)) => Arc::ptr_eq(a, b),
            (Self::Identified(a), Self::Identified(b)) => Arc::ptr_eq(a, b),
            (Self::Connected(a), Self::Connected(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub(crate) fn close_channel(&self) {
        match self {
            Self::Unidentified(link) => match link.channel.lock().as_ref() {
                Some(channel) => channel.close(),
                None => link.backend.close(),
            },
            Self::Identified(link) => link.channel.close(),
            Self::Connected(link) => link.channel.close(),
        }
    }

    fn ctx(&self) -> &LinkContext {
        match self {
            Self::Unidentified(link) => &link.ctx,
            Self::Identified(link) => &link.ctx,
            Self::Connected(link) => &link.ctx,
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("kind", &self.kind())
            .field("chain_id", &self.chain_id())
            .field("identity", &self.identity())
            .finish()
    }
}

/// A peer known only by what the transport reported.
pub struct UnidentifiedLink {
    ctx: Arc<LinkContext>,
    backend: Arc<dyn LinkBackend>,
    identity: RwLock<Identity>,
    channel: Mutex<Option<Arc<RawChannel>>>,
}

impl UnidentifiedLink {
    /// Creates the first stage of `connection`'s chain. The caller installs it.
    pub fn new(
        connection: &Connection,
        backend: Arc<dyn LinkBackend>,
        identity: Identity,
        setup: LinkSetup,
    ) -> Link {
        Link::Unidentified(Arc::new(Self {
            ctx: Arc::new(LinkContext {
                chain_id: connection.chain_id(),
                connection: connection.downgrade(),
                setup,
            }),
            backend,
            identity: RwLock::new(identity),
            channel: Mutex::new(None),
        }))
    }

    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub fn is_paired(&self) -> bool {
        self.backend.is_paired()
    }

    /// Identifies the peer, pairing first if needed and allowed.
    ///
    /// Returns [`LinkError::PairingNotAllowed`] without touching the connection when the peer
    /// is unpaired and `allow_pairing` is false.
    pub async fn advance(
        self: &Arc<Self>,
        allow_pairing: bool,
    ) -> Result<Arc<IdentifiedLink>, LinkError> {
        if !self.is_paired() {
            if !allow_pairing {
                return Err(LinkError::PairingNotAllowed);
            }
            self.pair().await?;
        }
        self.identify().await
    }

    async fn pair(&self) -> Result<(), LinkError> {
        let config = &self.ctx.setup.config;
        debug!(chain_id = %self.ctx.chain_id, "Requesting pairing");

        let signal = match self.backend.request_pairing().await {
            Ok(signal) => signal,
            Err(e) => {
                warn!(chain_id = %self.ctx.chain_id, error = %e, "Pairing request failed");
                self.ctx.fail(None, ConnectionState::Error);
                return Err(LinkError::PairingFailed(e.to_string()));
            }
        };

        let paired = await_pairing(
            self.backend.as_ref(),
            signal,
            config.bonding_timeout(),
            config.bonding_poll_interval(),
        )
        .await;
        if !paired {
            self.ctx.fail(None, ConnectionState::Error);
            return Err(LinkError::PairingFailed("peer did not pair in time".into()));
        }
        debug!(chain_id = %self.ctx.chain_id, "Paired");
        Ok(())
    }

    async fn identify(self: &Arc<Self>) -> Result<Arc<IdentifiedLink>, LinkError> {
        let channel = match self.backend.open_channel().await {
            Ok(channel) => Arc::new(channel),
            Err(e) => {
                self.ctx.fail(None, ConnectionState::Error);
                return Err(e.into());
            }
        };
        *self.channel.lock() = Some(channel.clone());
        if self.ctx.connection().is_ok_and(|connection| connection.is_closed()) {
            channel.close();
            return Err(LinkError::ConnectionClosed);
        }

        let setup = &self.ctx.setup;
        let exchange = async {
            let mut io = channel.io().await?;
            let (reader, writer) = io.split()?;
            let remote = tether_net_handshake::identify(
                setup.role,
                reader,
                writer,
                &setup.local,
                setup.config.max_payload_len,
            )
            .await?;
            Ok::<_, LinkError>(remote)
        };
        let result = tokio::select! {
            res = exchange => res,
            _ = channel.closed() => Err(LinkError::ConnectionClosed),
        };
        let remote = match result {
            Ok(remote) => remote,
            Err(e) => {
                debug!(chain_id = %self.ctx.chain_id, error = %e, "Identify failed");
                self.ctx.fail(Some(channel.as_ref()), ConnectionState::Error);
                return Err(e);
            }
        };

        let connection = match self.ctx.connection() {
            Ok(connection) => connection,
            Err(e) => {
                channel.close();
                return Err(e);
            }
        };
        *self.identity.write() = remote.clone();
        connection.notify_link_identity_changed(&Link::Unidentified(self.clone()));

        let next = Arc::new(IdentifiedLink {
            ctx: self.ctx.clone(),
            channel,
            identity: remote,
        });
        connection.set_link(Link::Identified(next.clone()), ConnectionState::Opening);
        Ok(next)
    }
}

/// Races the transport's pairing signal against polling, bounded by `timeout`.
///
/// The outcome is always the paired status read once more after the race ends, so pairing
/// that lands just before the deadline still counts.
pub(crate) async fn await_pairing(
    backend: &dyn LinkBackend,
    signal: PairingSignal,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let notified = async {
        // A dropped sender leaves the race to polling.
        if signal.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let polled = async {
        while !backend.is_paired() {
            tokio::time::sleep(poll_interval).await;
        }
    };
    let raced = tokio::time::timeout(timeout, async {
        tokio::select! {
            _ = notified => debug!("Pairing signalled"),
            _ = polled => debug!("Pairing observed by polling"),
        }
    })
    .await;

    if raced.is_err() {
        debug!(?timeout, "Pairing timed out");
    }
    backend.is_paired()
}

/// A peer whose identity is known, awaiting the join decision.
pub struct IdentifiedLink {
    ctx: Arc<LinkContext>,
    channel: Arc<RawChannel>,
    identity: Identity,
}

impl IdentifiedLink {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Exchanges join decisions with the peer.
    ///
    /// The link connects only if both sides accept; otherwise the connection is `Rejected`.
    pub async fn advance(&self, join: Join) -> Result<Arc<ConnectedLink>, LinkError> {
        let role = self.ctx.setup.role;
        let exchange = async {
            let mut io = self.channel.io().await?;
            let (reader, writer) = io.split()?;
            Ok::<_, LinkError>(tether_net_handshake::join(role, reader, writer, join).await?)
        };
        let result = tokio::select! {
            res = exchange => res,
            _ = self.channel.closed() => Err(LinkError::ConnectionClosed),
        };

        match result {
            Ok(Join::Accept) => {
                let connection = match self.ctx.connection() {
                    Ok(connection) => connection,
                    Err(e) => {
                        self.channel.close();
                        return Err(e);
                    }
                };
                let next = Arc::new(ConnectedLink {
                    ctx: self.ctx.clone(),
                    channel: self.channel.clone(),
                    identity: self.identity.clone(),
                });
                connection.set_link(Link::Connected(next.clone()), ConnectionState::Connected);
                Ok(next)
            }
            Ok(Join::Reject) => {
                debug!(chain_id = %self.ctx.chain_id, local = ?join, "Join rejected");
                self.ctx.fail(Some(self.channel.as_ref()), ConnectionState::Rejected);
                Err(LinkError::Rejected)
            }
            Err(e) => {
                debug!(chain_id = %self.ctx.chain_id, error = %e, "Join failed");
                self.ctx.fail(Some(self.channel.as_ref()), ConnectionState::Error);
                Err(e)
            }
        }
    }
}

/// A joined peer carrying application bytes.
pub struct ConnectedLink {
    ctx: Arc<LinkContext>,
    channel: Arc<RawChannel>,
    identity: Identity,
}

impl ConnectedLink {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn chain_id(&self) -> ChainId {
        self.ctx.chain_id
    }

    /// Writes all of `bytes`. A failure closes the connection with `Error`.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        self.channel.write_all(bytes).await.map_err(|e| self.io_failed(e))
    }

    /// Reads some bytes. Returns 0 at end of stream. A failure closes the connection with
    /// `Error`.
    pub async fn receive(&self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.channel.read(buf).await.map_err(|e| self.io_failed(e))
    }

    fn io_failed(&self, e: std::io::Error) -> LinkError {
        if self.channel.is_closed() {
            return LinkError::ConnectionClosed;
        }
        debug!(chain_id = %self.ctx.chain_id, error = %e, "Connected link failed");
        self.ctx.fail(Some(self.channel.as_ref()), ConnectionState::Error);
        LinkError::Io(e)
    }
}

macro_rules! impl_link_debug {
    ($($ty:ty),*) => {$(
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("chain_id", &self.ctx.chain_id)
                    .finish_non_exhaustive()
            }
        }
    )*};
}

impl_link_debug!(UnidentifiedLink, IdentifiedLink, ConnectedLink);

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// How the backend responds to a pairing request.
    #[derive(Clone, Copy)]
    enum OnPairing {
        Never,
        Signal,
        SilentlyPair,
        Fail,
    }

    struct TestBackend {
        paired: AtomicBool,
        channel: Mutex<Option<RawChannel>>,
        on_pairing: OnPairing,
        signal: Mutex<Option<oneshot::Sender<()>>>,
        pairing_requests: AtomicUsize,
    }

    impl TestBackend {
        fn new(paired: bool, channel: RawChannel, on_pairing: OnPairing) -> Self {
            Self {
                paired: AtomicBool::new(paired),
                channel: Mutex::new(Some(channel)),
                on_pairing,
                signal: Mutex::new(None),
                pairing_requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LinkBackend for TestBackend {
        async fn open_channel(&self) -> io::Result<RawChannel> {
            self.channel
                .lock()
                .take()
                .ok_or_else(|| io::Error::other("channel already taken"))
        }

        fn is_paired(&self) -> bool {
            self.paired.load(Ordering::SeqCst)
        }

        async fn request_pairing(&self) -> io::Result<PairingSignal> {
            self.pairing_requests.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            match self.on_pairing {
                OnPairing::Never => *self.signal.lock() = Some(tx),
                OnPairing::Signal => {
                    self.paired.store(true, Ordering::SeqCst);
                    let _ = tx.send(());
                }
                OnPairing::SilentlyPair => self.paired.store(true, Ordering::SeqCst),
                OnPairing::Fail => return Err(io::Error::other("radio off")),
            }
            Ok(rx)
        }
    }

    fn setup(role: Role, name: &str) -> LinkSetup {
        LinkSetup {
            role,
            local: Identity::partial(name, ConnectionType::Nsd),
            config: LinkConfig::default(),
        }
    }

    fn open(backend: TestBackend, setup: LinkSetup) -> (Connection, Arc<UnidentifiedLink>) {
        open_shared(Arc::new(backend), setup)
    }

    fn open_shared(
        backend: Arc<TestBackend>,
        setup: LinkSetup,
    ) -> (Connection, Arc<UnidentifiedLink>) {
        let connection = Connection::new(vec![]);
        let link = UnidentifiedLink::new(
            &connection,
            backend,
            Identity::partial("peer", ConnectionType::Nsd),
            setup,
        );
        connection.set_link(link.clone(), ConnectionState::Opening);
        let Link::Unidentified(link) = link else {
            unreachable!()
        };
        (connection, link)
    }

    fn open_pair(
        client_paired: bool,
        on_pairing: OnPairing,
    ) -> (
        (Connection, Arc<UnidentifiedLink>),
        (Connection, Arc<UnidentifiedLink>),
    ) {
        let (a, b) = tokio::io::duplex(1024);
        let client = open(
            TestBackend::new(client_paired, RawChannel::from_duplex("client", a), on_pairing),
            setup(Role::Client, "client"),
        );
        let server = open(
            TestBackend::new(true, RawChannel::from_duplex("server", b), OnPairing::Never),
            setup(Role::Server, "server"),
        );
        (client, server)
    }

    #[tokio::test]
    async fn test_advance_to_connected() {
        let ((client, client_link), (server, server_link)) = open_pair(true, OnPairing::Never);

        let (c, s) = tokio::join!(client_link.advance(false), server_link.advance(false));
        let (c, s) = (c.unwrap(), s.unwrap());
        assert_eq!(c.identity().name.as_deref(), Some("server"));
        assert_eq!(s.identity().name.as_deref(), Some("client"));
        assert_eq!(client_link.identity().name.as_deref(), Some("server"));
        assert_matches!(client.link(), Some(Link::Identified(_)));
        assert_eq!(client.state(), ConnectionState::Opening);
        assert_eq!(server.name(), "client");

        let (c, s) = tokio::join!(c.advance(Join::Accept), s.advance(Join::Accept));
        c.unwrap();
        s.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(server.state(), ConnectionState::Connected);
        assert_matches!(client.link(), Some(Link::Connected(_)));

        client.send(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.receive_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_send_waits_for_connected() {
        let ((client, client_link), (server, server_link)) = open_pair(true, OnPairing::Never);

        let sender = client.clone();
        let pending = tokio::spawn(async move { sender.send(b"early").await });

        let (c, s) = tokio::join!(client_link.advance(false), server_link.advance(false));
        assert!(!pending.is_finished());
        let (c, s) = (c.unwrap(), s.unwrap());
        let (c, s) = tokio::join!(c.advance(Join::Accept), s.advance(Join::Accept));
        c.unwrap();
        s.unwrap();

        pending.await.unwrap().unwrap();
        let mut buf = [0u8; 5];
        server.receive_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"early");
    }

    #[tokio::test]
    async fn test_join_reject() {
        let ((client, client_link), (server, server_link)) = open_pair(true, OnPairing::Never);

        let (c, s) = tokio::join!(client_link.advance(false), server_link.advance(false));
        let (c, s) = (c.unwrap(), s.unwrap());
        let (c, s) = tokio::join!(c.advance(Join::Accept), s.advance(Join::Reject));
        assert_matches!(c, Err(LinkError::Rejected));
        assert_matches!(s, Err(LinkError::Rejected));
        assert_eq!(client.state(), ConnectionState::Rejected);
        assert_eq!(server.state(), ConnectionState::Rejected);
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_unpaired_without_permission() {
        let ((client, client_link), _server) = open_pair(false, OnPairing::Never);

        assert_matches!(client_link.advance(false).await, Err(LinkError::PairingNotAllowed));
        assert_eq!(client.state(), ConnectionState::Opening);
        assert!(!client.is_closed());
        assert_matches!(client.link(), Some(Link::Unidentified(_)));
    }

    #[tokio::test]
    async fn test_paired_link_skips_pairing() {
        let (a, b) = tokio::io::duplex(1024);
        let backend = Arc::new(TestBackend::new(
            true,
            RawChannel::from_duplex("client", a),
            OnPairing::Fail,
        ));
        let (client, client_link) = open_shared(backend.clone(), setup(Role::Client, "client"));
        let (_server, server_link) = open(
            TestBackend::new(true, RawChannel::from_duplex("server", b), OnPairing::Never),
            setup(Role::Server, "server"),
        );

        let (c, s) = tokio::join!(client_link.advance(true), server_link.advance(false));
        c.unwrap();
        s.unwrap();
        assert_eq!(backend.pairing_requests.load(Ordering::SeqCst), 0);
        assert_matches!(client.link(), Some(Link::Identified(_)));
    }

    #[tokio::test]
    async fn test_pairing_by_signal() {
        let ((client, client_link), (_server, server_link)) = open_pair(false, OnPairing::Signal);

        let (c, s) = tokio::join!(client_link.advance(true), server_link.advance(false));
        c.unwrap();
        s.unwrap();
        assert!(client_link.is_paired());
        assert_matches!(client.link(), Some(Link::Identified(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_by_polling() {
        let ((client, client_link), (_server, server_link)) =
            open_pair(false, OnPairing::SilentlyPair);

        let (c, s) = tokio::join!(client_link.advance(true), server_link.advance(false));
        c.unwrap();
        s.unwrap();
        assert_matches!(client.link(), Some(Link::Identified(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_timeout() {
        let ((client, client_link), _server) = open_pair(false, OnPairing::Never);

        assert_matches!(client_link.advance(true).await, Err(LinkError::PairingFailed(_)));
        assert_eq!(client.state(), ConnectionState::Error);
        assert!(client.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_rechecked_at_deadline() {
        let (a, _b) = tokio::io::duplex(64);
        let backend = Arc::new(TestBackend::new(
            false,
            RawChannel::from_duplex("late", a),
            OnPairing::Never,
        ));
        let (_tx, signal) = oneshot::channel();
        let late = backend.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            late.paired.store(true, Ordering::SeqCst);
        });

        let paired = await_pairing(
            &*backend,
            signal,
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
        .await;
        assert!(paired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pairing_checked_before_first_poll() {
        let (a, _b) = tokio::io::duplex(64);
        let backend = TestBackend::new(true, RawChannel::from_duplex("ready", a), OnPairing::Never);
        let (_tx, signal) = oneshot::channel();

        let start = tokio::time::Instant::now();
        let paired =
            await_pairing(&backend, signal, Duration::from_secs(10), Duration::from_secs(1)).await;
        assert!(paired);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_pairing_request_failure() {
        let ((client, client_link), _server) = open_pair(false, OnPairing::Fail);

        assert_matches!(client_link.advance(true).await, Err(LinkError::PairingFailed(_)));
        assert_eq!(client.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_identify_against_closed_peer() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let (connection, link) = open(
            TestBackend::new(true, RawChannel::from_duplex("lonely", a), OnPairing::Never),
            setup(Role::Client, "lonely"),
        );

        assert_matches!(link.advance(false).await, Err(LinkError::Handshake(_)));
        assert_eq!(connection.state(), ConnectionState::Error);
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_closed_connection_drops_offered_link() {
        let ((client, client_link), (_server, server_link)) = open_pair(true, OnPairing::Never);
        client.close();

        let (c, _s) = tokio::join!(client_link.advance(false), async {
            tokio::time::timeout(std::time::Duration::from_millis(200), server_link.advance(false))
                .await
        });
        assert!(c.is_err());
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_matches!(client.link(), Some(Link::Unidentified(_)));
    }
}
