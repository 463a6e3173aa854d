use std::collections::HashSet;

use parking_lot::Mutex;
use tether_manager::{AdvanceReason, ConnectionInformation, ManagedConnectionListener};
use tether_primitives::ChainId;
use tracing::{debug, info};

/// Logs every published connection list, optionally accepting pending advances.
pub(crate) struct LoggingListener {
    auto_accept: bool,
    seen: Mutex<HashSet<(ChainId, AdvanceReason)>>,
}

impl LoggingListener {
    pub(crate) fn new(auto_accept: bool) -> Self {
        Self {
            auto_accept,
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl ManagedConnectionListener for LoggingListener {
    fn on_connections(&self, connections: &[ConnectionInformation]) {
        debug!(count = connections.len(), "Connections updated");

        let live: HashSet<ChainId> = connections.iter().map(|info| info.chain_id).collect();
        self.seen.lock().retain(|(chain_id, _)| live.contains(chain_id));

        for info in connections {
            info!(
                chain = ?info.chain_id,
                name = %info.name,
                state = %info.state,
                connection_type = ?info.identity.as_ref().and_then(|i| i.connection_type),
                "Connection"
            );

            let Some(advance) = &info.advance else {
                continue;
            };
            // Each decision is handled once per connection.
            if !self.seen.lock().insert((info.chain_id, advance.reason())) {
                continue;
            }
            if self.auto_accept {
                info!(chain = ?info.chain_id, reason = %advance.reason(), "Accepting");
                advance.accept();
            } else {
                info!(
                    chain = ?info.chain_id,
                    reason = %advance.reason(),
                    "Decision pending, run with --auto-accept to accept"
                );
            }
        }
    }
}
