use std::sync::Arc;

use assert_matches::assert_matches;
use tether_connection::{
    Connection, Link, LinkConfig, LinkError, LinkKind, LinkSetup, Role, TransportContext,
};
use tether_primitives::{ConnectionState, ConnectionType, Identity};
use tether_test_utils::{
    MemoryBackend, ObservedEvent, PeerSetup, RecordingObserver, connect_pair, init_tracing,
    memory_channels,
};

#[tokio::test]
async fn test_event_order_through_connected() {
    init_tracing();
    let observer = Arc::new(RecordingObserver::default());
    let (client, server) = connect_pair(
        PeerSetup::new("client", Some(ConnectionType::Nsd)).with_observer(observer.clone()),
        PeerSetup::new("server", Some(ConnectionType::Nsd)),
    )
    .await
    .unwrap();

    let id = client.chain_id();
    assert_eq!(
        observer.events(),
        vec![
            ObservedEvent::Opened(id),
            ObservedEvent::Link(id, LinkKind::Unidentified),
            ObservedEvent::Identity(id),
            ObservedEvent::Link(id, LinkKind::Identified),
            ObservedEvent::State(id, ConnectionState::Connected),
            ObservedEvent::Link(id, LinkKind::Connected),
        ]
    );
    assert_eq!(client.name(), "server");
    assert_eq!(server.name(), "client");

    client.close();
    client.close();
    assert_eq!(
        observer.states(id),
        vec![ConnectionState::Connected, ConnectionState::Closed]
    );
}

#[tokio::test]
async fn test_chain_id_shared_across_links() {
    let (client, _server) = connect_pair(
        PeerSetup::new("client", None),
        PeerSetup::new("server", None),
    )
    .await
    .unwrap();

    let link = client.link().unwrap();
    assert_eq!(link.kind(), LinkKind::Connected);
    assert_eq!(link.chain_id(), client.chain_id());
    assert_eq!(link.connection_type(), None);
}

#[tokio::test]
async fn test_bytes_flow_both_ways() {
    let (client, server) = connect_pair(
        PeerSetup::new("client", Some(ConnectionType::Bluetooth)),
        PeerSetup::new("server", Some(ConnectionType::Bluetooth)),
    )
    .await
    .unwrap();

    client.send(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    server.receive_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    server.send(b"pong").await.unwrap();
    client.receive_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
}

#[tokio::test]
async fn test_peer_close_surfaces_end_of_stream() {
    let (client, server) = connect_pair(
        PeerSetup::new("client", None),
        PeerSetup::new("server", None),
    )
    .await
    .unwrap();

    server.close();
    let mut buf = [0u8; 8];
    assert_eq!(client.receive(&mut buf).await.unwrap(), 0);
    assert_matches!(
        client.receive_exact(&mut buf).await,
        Err(LinkError::Io(_))
    );
}

#[tokio::test]
async fn test_closed_link_closes_connection() {
    let (client, _server) = connect_pair(
        PeerSetup::new("client", None),
        PeerSetup::new("server", None),
    )
    .await
    .unwrap();

    let link = client.link().unwrap();
    assert_matches!(link, Link::Connected(_));
    link.close();
    assert_eq!(client.state(), ConnectionState::Closed);
    assert_matches!(client.send(b"x").await, Err(LinkError::ConnectionClosed));
}

fn open_with(role: Role, backend: Arc<MemoryBackend>) -> Connection {
    let setup = LinkSetup {
        role,
        local: Identity::partial(role.to_string(), ConnectionType::Bluetooth),
        config: LinkConfig::default(),
    };
    TransportContext::new(setup, vec![])
        .open_connection(backend, Identity::partial("peer", ConnectionType::Bluetooth))
}

#[tokio::test]
async fn test_paired_backend_is_never_asked_to_pair() {
    let (a, b) = memory_channels("bonded");
    let client_backend = Arc::new(MemoryBackend::paired(a));
    let server_backend = Arc::new(MemoryBackend::paired(b));
    let client = open_with(Role::Client, client_backend.clone());
    let server = open_with(Role::Server, server_backend.clone());

    let (Some(Link::Unidentified(c)), Some(Link::Unidentified(s))) = (client.link(), server.link())
    else {
        panic!("expected unidentified links");
    };
    let (c, s) = tokio::join!(c.advance(true), s.advance(true));
    c.unwrap();
    s.unwrap();

    assert_eq!(client_backend.pairing_requests(), 0);
    assert_eq!(server_backend.pairing_requests(), 0);
    assert_eq!(client.name(), "server");
}
