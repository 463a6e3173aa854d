//! Connections to tether peers and the link state machine beneath them.
//!
//! A transport opens a [`Connection`] holding an unidentified [`Link`]. Advancing the link runs
//! the identify and join handshakes over its [`RawChannel`]; each stage replaces the previous one
//! on the connection and observers hear about every step.

mod backend;
pub use backend::{LinkBackend, PairingSignal};

mod channel;
pub use channel::{ChannelIo, ChannelReader, ChannelWriter, RawChannel};

mod config;
pub use config::{DEFAULT_BONDING_POLL_INTERVAL_MS, DEFAULT_BONDING_TIMEOUT_MS, LinkConfig};

mod connection;
pub use connection::{Connection, ConnectionObserver, WeakConnection};

mod error;
pub use error::LinkError;

mod link;
pub use link::{ConnectedLink, IdentifiedLink, Link, LinkKind, LinkSetup, UnidentifiedLink};

mod transport;
pub use transport::{Transport, TransportContext, TransportError};

pub use tether_net_handshake::Role;
