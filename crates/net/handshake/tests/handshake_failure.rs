use assert_matches::assert_matches;
use tether_net_codec::DEFAULT_MAX_ARRAY_LEN;
use tether_net_handshake::{HandshakeError, Role, identify, join};
use tether_primitives::{Identity, Join};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};

#[tokio::test]
async fn client_fails_on_wrong_hello() {
    let (client_io, mut server_io) = duplex(64);
    let (mut client_r, mut client_w) = split(client_io);

    let peer = async move {
        let mut hello = [0u8; 1];
        server_io.read_exact(&mut hello).await.unwrap();
        assert_eq!(hello, [3]);
        // Answer with a join byte instead of HELLO.
        server_io.write_all(&[42]).await.unwrap();
        server_io
    };

    let identity = Identity::default();
    let (result, _server_io) = tokio::join!(
        identify(
            Role::Client,
            &mut client_r,
            &mut client_w,
            &identity,
            DEFAULT_MAX_ARRAY_LEN
        ),
        peer
    );

    assert_matches!(result, Err(HandshakeError::Protocol(_)));
}

#[tokio::test]
async fn server_fails_on_closed_stream() {
    let (client_io, server_io) = duplex(64);
    drop(client_io);
    let (mut server_r, mut server_w) = split(server_io);

    let result = identify(
        Role::Server,
        &mut server_r,
        &mut server_w,
        &Identity::default(),
        DEFAULT_MAX_ARRAY_LEN,
    )
    .await;

    assert_matches!(result, Err(HandshakeError::Io(_)));
}

#[tokio::test]
async fn join_fails_on_unexpected_byte() {
    let (client_io, mut server_io) = duplex(64);
    let (mut client_r, mut client_w) = split(client_io);

    server_io.write_all(&[11]).await.unwrap();

    let result = join(Role::Client, &mut client_r, &mut client_w, Join::Accept).await;
    assert_matches!(result, Err(HandshakeError::Protocol(_)));
}
