//! Core primitive types for tether peer links.
//!
//! This crate provides the identifiers, identity metadata and small enums used across the
//! codec, connection and manager layers, kept separate to avoid circular dependencies.

mod chain;
pub use chain::ChainId;

mod identity;
pub use identity::{ConnectionType, DeviceType, Identity, UserInfo};

mod service;
pub use service::{MAX_FRIENDLY_NAME_BYTES, ServiceInfo, truncate_utf8};

mod state;
pub use state::ConnectionState;

/// Random per-session token used to recognise the same peer reached over several transports.
///
/// Generated once per managed session and exchanged over every connected link. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupNonce(pub u64);

impl DedupNonce {
    /// Draws a fresh nonce from the thread-local RNG.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl std::fmt::Display for DedupNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Local decision in the join negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Join {
    Accept,
    Reject,
}

impl Join {
    /// Combines the local and remote decisions. Only a double accept is an accept.
    pub fn negotiate(self, remote: Join) -> Join {
        match (self, remote) {
            (Join::Accept, Join::Accept) => Join::Accept,
            _ => Join::Reject,
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, Join::Accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_negotiation() {
        assert_eq!(Join::Accept.negotiate(Join::Accept), Join::Accept);
        assert_eq!(Join::Accept.negotiate(Join::Reject), Join::Reject);
        assert_eq!(Join::Reject.negotiate(Join::Accept), Join::Reject);
        assert_eq!(Join::Reject.negotiate(Join::Reject), Join::Reject);
    }

    #[test]
    fn test_nonce_big_endian() {
        let nonce = DedupNonce(0x0102_0304_0506_0708);
        assert_eq!(nonce.to_be_bytes(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(DedupNonce::from_be_bytes(nonce.to_be_bytes()), nonce);
        assert_eq!(nonce.to_string(), "0102030405060708");
    }
}
