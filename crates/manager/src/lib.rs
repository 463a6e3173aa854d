//! Managed tether sessions.
//!
//! An [`AdvanceOrchestrator`] observes every connection of a session and advances its links
//! according to the session role, turning decisions that need the user into [`Advance`]s. Its
//! snapshots flow into either a [`DeduplicatingListener`], which merges connections that reach
//! the same peer over several transports, or a [`ForwardingListener`]. Both publish the ordered
//! list of live connections to a [`ManagedConnectionListener`].
//!
//! [`ManagedServer`] and [`ManagedClient`] wire all of this to a set of transports.

mod config;
pub use config::SessionConfig;

mod dedup;
pub use dedup::{DeduplicatingListener, exchange_nonce, is_current_better_than_new};

mod error;
pub use error::ManagerError;

mod forwarding;
pub use forwarding::ForwardingListener;

mod info;
pub use info::{Advance, AdvanceReason, ConnectionInformation};

mod listener;
pub use listener::{ConnectionEventSink, ConnectionsPublisher, ManagedConnectionListener};

mod orchestrator;
pub use orchestrator::{AdvanceOrchestrator, RolePolicy};

mod session;
pub use session::{ManagedClient, ManagedServer};
