use tether_net_codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Stream error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    ConnectionClosed,
}

impl HandshakeError {
    pub(crate) fn unexpected(expected: &str, got: u8) -> Self {
        Self::Protocol(format!("expected {expected}, received byte {got}"))
    }
}
