use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tether_connection::{LinkBackend, RawChannel, Transport, TransportContext, TransportError};
use tether_primitives::{ConnectionType, Identity};
use tokio::sync::{Mutex, mpsc};

use crate::{MemoryBackend, Pairing, memory_channels};

enum Side {
    Server(Mutex<mpsc::UnboundedReceiver<RawChannel>>),
    Client(mpsc::UnboundedSender<RawChannel>),
}

/// One end of an in-memory medium.
///
/// Every run of the client end dials the server end once and then idles until cancelled. The
/// server end turns every dial into a connection, queueing dials made while it is not running.
pub struct MemoryTransport {
    connection_type: ConnectionType,
    side: Side,
    pairing: Option<Pairing>,
    opened: AtomicUsize,
}

/// A connected server and client transport pair.
pub fn memory_transports(connection_type: ConnectionType) -> (MemoryTransport, MemoryTransport) {
    let (tx, rx) = mpsc::unbounded_channel();
    let server = MemoryTransport::new(connection_type, Side::Server(Mutex::new(rx)));
    let client = MemoryTransport::new(connection_type, Side::Client(tx));
    (server, client)
}

impl MemoryTransport {
    fn new(connection_type: ConnectionType, side: Side) -> Self {
        Self {
            connection_type,
            side,
            pairing: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// Peers reached through this end start unpaired and pair as scripted.
    pub fn with_pairing(mut self, pairing: Pairing) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Number of connections this end has opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn backend(&self, channel: RawChannel) -> Arc<dyn LinkBackend> {
        Arc::new(match self.pairing {
            Some(pairing) => MemoryBackend::unpaired(channel, pairing),
            None => MemoryBackend::paired(channel),
        })
    }

    fn open(&self, ctx: &TransportContext, channel: RawChannel, peer: &str) {
        let n = self.opened.fetch_add(1, Ordering::SeqCst);
        let identity = Identity::partial(format!("{peer}-{n}"), self.connection_type);
        ctx.open_connection(self.backend(channel), identity);
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    async fn run(&self, ctx: TransportContext) -> Result<(), TransportError> {
        match &self.side {
            Side::Server(incoming) => {
                let mut incoming = incoming.lock().await;
                while let Some(channel) = incoming.recv().await {
                    self.open(&ctx, channel, "memory-client");
                }
                Ok(())
            }
            Side::Client(outgoing) => {
                let (local, remote) = memory_channels(&self.connection_type.to_string());
                outgoing.send(remote).map_err(|_| {
                    io::Error::new(io::ErrorKind::ConnectionRefused, "memory server is gone")
                })?;
                self.open(&ctx, local, "memory-server");
                std::future::pending().await
            }
        }
    }
}
