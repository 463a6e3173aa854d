//! Transport abstraction: how peers are found and raw channels produced.

use std::sync::Arc;

use async_trait::async_trait;
use tether_primitives::{ConnectionState, ConnectionType, Identity};

use crate::{Connection, ConnectionObserver, LinkBackend, LinkSetup, UnidentifiedLink};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Link error: {0}")]
    Link(#[from] crate::LinkError),
}

/// What a running transport needs to turn discovered peers into connections.
#[derive(Clone)]
pub struct TransportContext {
    setup: LinkSetup,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl TransportContext {
    pub fn new(setup: LinkSetup, observers: Vec<Arc<dyn ConnectionObserver>>) -> Self {
        Self { setup, observers }
    }

    pub fn setup(&self) -> &LinkSetup {
        &self.setup
    }

    /// Opens a connection for a discovered peer and installs its unidentified link.
    pub fn open_connection(&self, backend: Arc<dyn LinkBackend>, identity: Identity) -> Connection {
        let connection = Connection::open(self.observers.clone());
        let link = UnidentifiedLink::new(&connection, backend, identity, self.setup.clone());
        connection.set_link(link, ConnectionState::Opening);
        connection
    }
}

/// A source of peer connections over one medium.
///
/// `run` advertises or discovers until cancelled by dropping the future. Returning ends the
/// transport's service run.
#[async_trait]
#[auto_impl::auto_impl(&, Arc)]
pub trait Transport: Send + Sync {
    fn connection_type(&self) -> ConnectionType;

    async fn run(&self, ctx: TransportContext) -> Result<(), TransportError>;
}
