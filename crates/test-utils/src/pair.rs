use std::sync::Arc;

use tether_connection::{
    Connection, ConnectionObserver, Link, LinkConfig, LinkError, LinkSetup, Role,
    TransportContext,
};
use tether_primitives::{ConnectionType, Identity, Join};

use crate::{MemoryBackend, memory_channels};

/// One side of a pair built by [`connect_pair`].
#[derive(Clone, Default)]
pub struct PeerSetup {
    pub local: Identity,
    pub observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl PeerSetup {
    pub fn new(name: &str, connection_type: Option<ConnectionType>) -> Self {
        Self {
            local: Identity {
                name: Some(name.to_string()),
                connection_type,
                ..Default::default()
            },
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

/// Opens two connections over an in-memory channel and advances both to connected.
///
/// Returns `(client, server)`.
pub async fn connect_pair(
    client: PeerSetup,
    server: PeerSetup,
) -> Result<(Connection, Connection), LinkError> {
    let (a, b) = memory_channels("pair");
    let client_identity = Identity::partial("server", ConnectionType::Nsd);
    let server_identity = Identity::partial("client", ConnectionType::Nsd);

    let client = open(Role::Client, client, a, client_identity);
    let server = open(Role::Server, server, b, server_identity);

    let (Some(Link::Unidentified(c)), Some(Link::Unidentified(s))) = (client.link(), server.link())
    else {
        return Err(LinkError::ConnectionClosed);
    };
    let (c, s) = tokio::join!(c.advance(false), s.advance(false));
    let (c, s) = (c?, s?);
    let (c, s) = tokio::join!(c.advance(Join::Accept), s.advance(Join::Accept));
    c?;
    s?;
    Ok((client, server))
}

fn open(
    role: Role,
    peer: PeerSetup,
    channel: tether_connection::RawChannel,
    remote: Identity,
) -> Connection {
    let ctx = TransportContext::new(
        LinkSetup {
            role,
            local: peer.local,
            config: LinkConfig::default(),
        },
        peer.observers,
    );
    ctx.open_connection(Arc::new(MemoryBackend::paired(channel)), remote)
}
