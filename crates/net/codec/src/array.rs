use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{CodecError, decode_varint, encode_varint, read_varint};

/// Default cap on a length-prefixed array, enforced on both ends.
pub const DEFAULT_MAX_ARRAY_LEN: usize = 10_240;

fn check_len(len: usize, max: usize) -> Result<(), CodecError> {
    if len > max {
        return Err(CodecError::PayloadTooLarge { len, max });
    }
    Ok(())
}

fn to_len(value: i32, max: usize) -> Result<usize, CodecError> {
    // Varint decoding never yields a negative value.
    let len = usize::try_from(value).map_err(|_| CodecError::MalformedEncoding("negative length"))?;
    check_len(len, max)?;
    Ok(len)
}

/// Appends an optional array with its varint length. `None` and empty arrays encode as length 0.
pub fn encode_length_prefixed(
    bytes: Option<&[u8]>,
    max: usize,
    dst: &mut BytesMut,
) -> Result<(), CodecError> {
    let bytes = bytes.unwrap_or_default();
    check_len(bytes.len(), max)?;
    let len = i32::try_from(bytes.len())
        .map_err(|_| CodecError::PayloadTooLarge { len: bytes.len(), max })?;
    encode_varint(len, dst)?;
    dst.extend_from_slice(bytes);
    Ok(())
}

/// Decodes an optional array. Length 0 decodes as `None`.
pub fn decode_length_prefixed(src: &mut impl Buf, max: usize) -> Result<Option<Bytes>, CodecError> {
    let len = to_len(decode_varint(src)?, max)?;
    if len == 0 {
        return Ok(None);
    }
    if src.remaining() < len {
        return Err(CodecError::MalformedEncoding("array truncated"));
    }
    Ok(Some(src.copy_to_bytes(len)))
}

pub async fn write_length_prefixed<W>(
    writer: &mut W,
    bytes: Option<&[u8]>,
    max: usize,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = BytesMut::new();
    encode_length_prefixed(bytes, max, &mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}

/// Reads an optional array, always consuming the full declared length.
pub async fn read_length_prefixed<R>(reader: &mut R, max: usize) -> Result<Option<Bytes>, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = to_len(read_varint(reader).await?, max)?;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(Some(Bytes::from(buf))),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(CodecError::MalformedEncoding("stream ended inside array"))
        }
        Err(e) => Err(e.into()),
    }
}
