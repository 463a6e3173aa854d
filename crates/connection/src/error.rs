use tether_net_handshake::HandshakeError;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Device not allowed to pair")]
    PairingNotAllowed,
    #[error("Pairing failed: {0}")]
    PairingFailed(String),
    #[error("Connection rejected by peer")]
    Rejected,
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
