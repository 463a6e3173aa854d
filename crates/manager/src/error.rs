use tether_connection::LinkError;
use tether_net_handshake::HandshakeError;

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),
}
