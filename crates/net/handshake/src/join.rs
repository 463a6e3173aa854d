use tether_primitives::Join;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::{HandshakeError, Role, message};

/// Runs the join exchange and returns the negotiated outcome.
///
/// The local decision is always sent, even when rejecting, so the peer learns the outcome.
pub async fn join<R, W>(
    role: Role,
    reader: &mut R,
    writer: &mut W,
    local: Join,
) -> Result<Join, HandshakeError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
    W: AsyncWrite + Unpin + Send + ?Sized,
{
    let remote = match role {
        Role::Client => {
            let remote = read_join(reader).await?;
            write_join(writer, local).await?;
            remote
        }
        Role::Server => {
            write_join(writer, local).await?;
            read_join(reader).await?
        }
    };
    let outcome = local.negotiate(remote);
    debug!(%role, %local, %remote, %outcome, "Join negotiated");
    Ok(outcome)
}

pub async fn write_join<W>(writer: &mut W, join: Join) -> Result<(), HandshakeError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let byte = match join {
        Join::Accept => message::JOIN,
        Join::Reject => message::REJECTED,
    };
    writer.write_u8(byte).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_join<R>(reader: &mut R) -> Result<Join, HandshakeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_u8().await? {
        message::JOIN => Ok(Join::Accept),
        message::REJECTED => Ok(Join::Reject),
        other => Err(HandshakeError::unexpected("JOIN or REJECTED", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_join_bytes() {
        let mut out = Vec::new();
        write_join(&mut out, Join::Accept).await.unwrap();
        write_join(&mut out, Join::Reject).await.unwrap();
        assert_eq!(out, vec![42, 13]);

        let mut reader = &out[..];
        assert_eq!(read_join(&mut reader).await.unwrap(), Join::Accept);
        assert_eq!(read_join(&mut reader).await.unwrap(), Join::Reject);
    }

    #[tokio::test]
    async fn test_join_unknown_byte() {
        let mut reader = &[77u8][..];
        assert_matches!(read_join(&mut reader).await, Err(HandshakeError::Protocol(_)));
    }
}
