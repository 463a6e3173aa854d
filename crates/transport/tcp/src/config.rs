use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Default port a server listens on.
pub const DEFAULT_PORT: u16 = 7411;

/// TCP endpoints, TOML-serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Address a server accepts clients on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Servers a client connects to.
    #[serde(default)]
    pub peers: Vec<SocketAddr>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            peers: Vec::new(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}
