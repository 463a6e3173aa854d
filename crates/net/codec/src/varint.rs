use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::CodecError;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7f;

/// Incremental decoder shared by the buffered and streaming readers.
struct VarintDecoder {
    value: u128,
    shift: u32,
    max_bits: u32,
}

impl VarintDecoder {
    fn new(max_bits: u32) -> Self {
        Self {
            value: 0,
            shift: 0,
            max_bits,
        }
    }

    /// Feeds one byte, returning the value once the terminating byte is seen.
    fn push(&mut self, byte: u8) -> Result<Option<u128>, CodecError> {
        if self.shift >= self.max_bits {
            return Err(CodecError::MalformedEncoding("varint too long"));
        }
        self.value |= u128::from(byte & PAYLOAD) << self.shift;
        if byte & CONTINUATION == 0 {
            return Ok(Some(self.value));
        }
        self.shift += 7;
        Ok(None)
    }
}

fn put_varint(mut value: u64, dst: &mut BytesMut) {
    while value >= u64::from(CONTINUATION) {
        dst.put_u8((value as u8 & PAYLOAD) | CONTINUATION);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Appends `value` as a varint. Negative values are rejected.
pub fn encode_varint(value: i32, dst: &mut BytesMut) -> Result<(), CodecError> {
    let value = u32::try_from(value).map_err(|_| CodecError::NegativeValue(value.into()))?;
    put_varint(value.into(), dst);
    Ok(())
}

/// Appends `value` as a varint. Negative values are rejected.
pub fn encode_varint_long(value: i64, dst: &mut BytesMut) -> Result<(), CodecError> {
    let value = u64::try_from(value).map_err(|_| CodecError::NegativeValue(value))?;
    put_varint(value, dst);
    Ok(())
}

fn decode_buf(src: &mut impl Buf, max_bits: u32) -> Result<u128, CodecError> {
    let mut decoder = VarintDecoder::new(max_bits);
    loop {
        if !src.has_remaining() {
            return Err(CodecError::MalformedEncoding("varint truncated"));
        }
        if let Some(value) = decoder.push(src.get_u8())? {
            return Ok(value);
        }
    }
}

/// Decodes a 32-bit varint from a buffer.
pub fn decode_varint(src: &mut impl Buf) -> Result<i32, CodecError> {
    i32::try_from(decode_buf(src, 32)?)
        .map_err(|_| CodecError::MalformedEncoding("varint exceeds 32 bits"))
}

/// Decodes a 64-bit varint from a buffer.
pub fn decode_varint_long(src: &mut impl Buf) -> Result<i64, CodecError> {
    i64::try_from(decode_buf(src, 64)?)
        .map_err(|_| CodecError::MalformedEncoding("varint exceeds 64 bits"))
}

async fn read_stream<R>(reader: &mut R, max_bits: u32) -> Result<u128, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut decoder = VarintDecoder::new(max_bits);
    loop {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(CodecError::MalformedEncoding("stream ended inside varint"));
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(value) = decoder.push(byte)? {
            return Ok(value);
        }
    }
}

/// Reads a 32-bit varint from a stream.
pub async fn read_varint<R>(reader: &mut R) -> Result<i32, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    i32::try_from(read_stream(reader, 32).await?)
        .map_err(|_| CodecError::MalformedEncoding("varint exceeds 32 bits"))
}

/// Reads a 64-bit varint from a stream.
pub async fn read_varint_long<R>(reader: &mut R) -> Result<i64, CodecError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    i64::try_from(read_stream(reader, 64).await?)
        .map_err(|_| CodecError::MalformedEncoding("varint exceeds 64 bits"))
}

pub async fn write_varint<W>(writer: &mut W, value: i32) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(5);
    encode_varint(value, &mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}

pub async fn write_varint_long<W>(writer: &mut W, value: i64) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = BytesMut::with_capacity(10);
    encode_varint_long(value, &mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}
