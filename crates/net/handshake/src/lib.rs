//! Handshake exchanges of the tether link protocol.
//!
//! A link advances through three byte-level exchanges, each with a fixed read/write order per
//! [`Role`]:
//!
//! | exchange | client | server |
//! |---|---|---|
//! | identify | write HELLO, read HELLO, write identity, read identity | read HELLO, write HELLO, read identity, write identity |
//! | join | read decision, write decision | write decision, read decision |
//! | dedup | write nonce, read nonce | read nonce, write nonce |

mod error;
pub use error::HandshakeError;

mod identify;
pub use identify::{identify, read_identity, write_identity};

mod join;
pub use join::{join, read_join, write_join};

mod dedup;
pub use dedup::{DEDUP_RECORD_LEN, decode_dedup, encode_dedup};

/// Message type bytes.
pub mod message {
    pub const HELLO: u8 = 3;
    pub const FULL_IDENTITY: u8 = 11;
    pub const JOIN: u8 = 42;
    pub const REJECTED: u8 = 13;
    pub const DEDUP: u8 = 77;
}

/// Side of the exchange. The client initiates, the server responds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}
