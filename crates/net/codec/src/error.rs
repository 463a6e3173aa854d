use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(&'static str),

    #[error("Payload of {len} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Negative value {0} cannot be encoded as a varint")]
    NegativeValue(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
