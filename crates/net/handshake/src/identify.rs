use tether_net_codec::{read_length_prefixed, write_length_prefixed};
use tether_primitives::{ConnectionType, DeviceType, Identity};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{HandshakeError, Role, message};

/// Runs the identify exchange and returns the peer's identity.
///
/// `max_len` caps each length-prefixed field in both directions.
pub async fn identify<R, W>(
    role: Role,
    reader: &mut R,
    writer: &mut W,
    local: &Identity,
    max_len: usize,
) -> Result<Identity, HandshakeError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let remote = match role {
        Role::Client => {
            write_hello(writer).await?;
            read_hello(reader).await?;
            write_identity(writer, local, max_len).await?;
            read_identity(reader, max_len).await?
        }
        Role::Server => {
            read_hello(reader).await?;
            write_hello(writer).await?;
            let remote = read_identity(reader, max_len).await?;
            write_identity(writer, local, max_len).await?;
            remote
        }
    };
    debug!(%role, name = ?remote.name, connection_type = ?remote.connection_type, "Identify complete");
    Ok(remote)
}

async fn write_hello<W>(writer: &mut W) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_u8(message::HELLO).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_hello<R>(reader: &mut R) -> Result<(), HandshakeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_u8().await? {
        message::HELLO => Ok(()),
        other => Err(HandshakeError::unexpected("HELLO", other)),
    }
}

/// Writes `[FULL_IDENTITY][conn type][device type][name][app bytes]`.
pub async fn write_identity<W>(
    writer: &mut W,
    identity: &Identity,
    max_len: usize,
) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer
        .write_all(&[
            message::FULL_IDENTITY,
            ConnectionType::to_byte(identity.connection_type),
            DeviceType::to_byte(identity.device_type),
        ])
        .await?;
    write_length_prefixed(writer, identity.name.as_deref().map(str::as_bytes), max_len).await?;
    write_length_prefixed(writer, identity.app_bytes.as_deref(), max_len).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_identity<R>(reader: &mut R, max_len: usize) -> Result<Identity, HandshakeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let marker = reader.read_u8().await?;
    if marker != message::FULL_IDENTITY {
        return Err(HandshakeError::unexpected("FULL_IDENTITY", marker));
    }
    let connection_type = ConnectionType::from_byte(reader.read_u8().await?);
    let device_type = DeviceType::from_byte(reader.read_u8().await?);
    // Malformed sequences become U+FFFD rather than failing the handshake.
    let name = read_length_prefixed(reader, max_len)
        .await?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
    let app_bytes = read_length_prefixed(reader, max_len).await?;

    Ok(Identity {
        name,
        device_type,
        connection_type,
        app_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tether_net_codec::DEFAULT_MAX_ARRAY_LEN;

    #[tokio::test]
    async fn test_identity_record_layout() {
        let identity = Identity {
            name: Some("tv".into()),
            device_type: Some(DeviceType::Tv),
            connection_type: Some(ConnectionType::Bluetooth),
            app_bytes: None,
        };
        let mut out = Vec::new();
        write_identity(&mut out, &identity, DEFAULT_MAX_ARRAY_LEN).await.unwrap();
        assert_eq!(out, vec![11, 2, 3, 2, b't', b'v', 0]);
    }

    #[tokio::test]
    async fn test_identity_unknown_tags() {
        let mut reader = &[11u8, 0, 0, 0, 0][..];
        let identity = read_identity(&mut reader, DEFAULT_MAX_ARRAY_LEN).await.unwrap();
        assert_eq!(identity, Identity::default());
    }

    #[tokio::test]
    async fn test_identity_wrong_marker() {
        let mut reader = &[3u8, 0, 0, 0, 0][..];
        assert_matches!(
            read_identity(&mut reader, DEFAULT_MAX_ARRAY_LEN).await,
            Err(HandshakeError::Protocol(_))
        );
    }

    #[tokio::test]
    async fn test_identity_invalid_utf8_is_replaced() {
        let mut reader = &[11u8, 1, 1, 3, b'a', 0xff, 0xfe, 0][..];
        let identity = read_identity(&mut reader, DEFAULT_MAX_ARRAY_LEN).await.unwrap();
        assert_eq!(identity.name.as_deref(), Some("a\u{fffd}\u{fffd}"));
        assert_eq!(identity.app_bytes, None);
    }

    #[tokio::test]
    async fn test_identity_name_too_long() {
        let identity = Identity {
            name: Some("x".repeat(33)),
            ..Default::default()
        };
        let mut out = Vec::new();
        assert_matches!(
            write_identity(&mut out, &identity, 32).await,
            Err(HandshakeError::Codec(_))
        );
    }
}
