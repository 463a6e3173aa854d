//! Node configuration file.

use std::path::Path;

use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use tether_connection::LinkConfig;
use tether_manager::SessionConfig;
use tether_transport_tcp::TcpConfig;

use crate::cli::{FindArgs, ServeArgs, SessionArgs};

/// Everything a node can be configured with, one table per concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct TetherConfig {
    pub(crate) link: LinkConfig,
    pub(crate) tcp: TcpConfig,
    pub(crate) session: SessionConfig,
}

impl TetherConfig {
    /// Reads `path`, or returns the defaults when none is given.
    pub(crate) fn load(path: Option<&Path>) -> eyre::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse config file {}", path.display()))
    }

    pub(crate) fn apply_serve(&mut self, args: &ServeArgs) {
        self.apply_session(&args.session);
        if let Some(listen) = args.listen {
            self.tcp.listen_addr = listen;
        }
    }

    pub(crate) fn apply_find(&mut self, args: &FindArgs) {
        self.apply_session(&args.session);
        if !args.peers.is_empty() {
            self.tcp.peers = args.peers.clone();
        }
        if args.eager {
            self.session.eager = true;
        }
    }

    fn apply_session(&mut self, args: &SessionArgs) {
        if let Some(name) = &args.name {
            self.session.user_name = Some(name.clone());
        }
        if args.no_dedup {
            self.session.deduplicate = false;
        }
    }
}
