//! TCP transport.
//!
//! A TCP peer is trusted as soon as its socket is accepted or connected, so links over TCP are
//! always paired and cannot bond out of band.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_connection::{
    LinkBackend, PairingSignal, RawChannel, Transport, TransportContext, TransportError,
};
use tether_primitives::{ConnectionType, Identity, ServiceInfo};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

mod config;
pub use config::{DEFAULT_PORT, TcpConfig};

/// Hands over an accepted or connected socket.
pub struct TcpBackend {
    channel: Mutex<Option<RawChannel>>,
}

impl TcpBackend {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to disable Nagle");
        }
        Self {
            channel: Mutex::new(Some(RawChannel::from_duplex(peer.to_string(), stream))),
        }
    }
}

#[async_trait]
impl LinkBackend for TcpBackend {
    async fn open_channel(&self) -> io::Result<RawChannel> {
        self.channel
            .lock()
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket already in use"))
    }

    fn is_paired(&self) -> bool {
        true
    }

    async fn request_pairing(&self) -> io::Result<PairingSignal> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Device not allowed to bond",
        ))
    }

    fn close(&self) {
        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }
    }
}

fn open(ctx: &TransportContext, stream: TcpStream, peer: SocketAddr) {
    let identity = Identity::partial(peer.to_string(), ConnectionType::Nsd);
    ctx.open_connection(Arc::new(TcpBackend::new(stream, peer)), identity);
}

/// Accepts clients on a listening socket.
pub struct TcpServerTransport {
    listen_addr: SocketAddr,
    service: ServiceInfo,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl TcpServerTransport {
    pub fn new(listen_addr: SocketAddr, service: ServiceInfo) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            listen_addr,
            service,
            bound,
        }
    }

    /// Address of the listening socket while the transport runs.
    pub fn local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound.subscribe()
    }
}

#[async_trait]
impl Transport for TcpServerTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Nsd
    }

    async fn run(&self, ctx: TransportContext) -> Result<(), TransportError> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        self.bound.send_replace(Some(local_addr));
        let _unbind = Unbind(&self.bound);
        info!(
            %local_addr,
            service_name = self.service.service_name(),
            service_type = %self.service.service_type(),
            "Listening"
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "Accepted client");
            open(&ctx, stream, peer);
        }
    }
}

struct Unbind<'a>(&'a watch::Sender<Option<SocketAddr>>);

impl Drop for Unbind<'_> {
    fn drop(&mut self) {
        self.0.send_replace(None);
    }
}

/// Connects to a fixed list of servers.
pub struct TcpClientTransport {
    peers: Vec<SocketAddr>,
}

impl TcpClientTransport {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl Transport for TcpClientTransport {
    fn connection_type(&self) -> ConnectionType {
        ConnectionType::Nsd
    }

    /// Connects once to every peer, then idles until cancelled. Fails if no peer was reached.
    async fn run(&self, ctx: TransportContext) -> Result<(), TransportError> {
        let mut last_error = None;
        let mut connected = 0;
        for peer in &self.peers {
            match TcpStream::connect(peer).await {
                Ok(stream) => {
                    debug!(%peer, "Connected to server");
                    open(&ctx, stream, *peer);
                    connected += 1;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "Failed to connect");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if connected == 0 => Err(e.into()),
            _ => std::future::pending().await,
        }
    }
}
