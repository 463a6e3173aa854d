//! Merges connections that reach the same peer over several transports.
//!
//! Every connected link exchanges the session's [`DedupNonce`]. Two live connections reporting
//! the same remote nonce reach the same peer; the one over the lower-priority transport is
//! closed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use tether_connection::{Connection, Link, Role};
use tether_net_handshake::{DEDUP_RECORD_LEN, decode_dedup, encode_dedup};
use tether_primitives::{ChainId, ConnectionType, DedupNonce};
use tether_tasks::TaskExecutor;
use tracing::{debug, info, warn};

use crate::listener::{upsert, visible};
use crate::{ConnectionEventSink, ConnectionInformation, ManagedConnectionListener, ManagerError};

/// Runs the nonce exchange over a connected connection and returns the peer's nonce.
///
/// The client writes first.
pub async fn exchange_nonce(
    connection: &Connection,
    role: Role,
    local: DedupNonce,
) -> Result<DedupNonce, ManagerError> {
    let record = encode_dedup(local);
    let mut remote = [0u8; DEDUP_RECORD_LEN];
    match role {
        Role::Client => {
            connection.send(&record).await?;
            connection.receive_exact(&mut remote).await?;
        }
        Role::Server => {
            connection.receive_exact(&mut remote).await?;
            connection.send(&record).await?;
        }
    }
    Ok(decode_dedup(&remote)?)
}

/// True if the link currently owning a nonce should survive against a new one.
///
/// A known transport beats an unknown one; otherwise the new link must have strictly higher
/// priority to win.
pub fn is_current_better_than_new(
    current: Option<ConnectionType>,
    new: Option<ConnectionType>,
) -> bool {
    match (current, new) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(current), Some(new)) => new.priority() <= current.priority(),
    }
}

#[derive(Default)]
struct DedupState {
    entries: LinkedHashMap<ChainId, ConnectionInformation>,
    links: HashMap<ChainId, Link>,
    owners: HashMap<DedupNonce, ChainId>,
    exchanged: HashSet<ChainId>,
}

impl DedupState {
    /// The owner of `nonce`, if it is still a live connection.
    fn live_owner(&self, nonce: &DedupNonce) -> Option<(ChainId, Connection)> {
        let owner = *self.owners.get(nonce)?;
        let connection = self.entries.get(&owner)?.connection().clone();
        (!connection.state().is_terminal()).then_some((owner, connection))
    }

    fn connection_type(&self, chain_id: &ChainId) -> Option<ConnectionType> {
        self.links.get(chain_id).and_then(Link::connection_type)
    }
}

/// Publishes a merged connection list, closing duplicates of the same peer.
pub struct DeduplicatingListener {
    role: Role,
    nonce: DedupNonce,
    executor: TaskExecutor,
    listener: Arc<dyn ManagedConnectionListener>,
    state: Mutex<DedupState>,
    this: Weak<Self>,
}

impl DeduplicatingListener {
    pub fn new(
        role: Role,
        nonce: DedupNonce,
        executor: TaskExecutor,
        listener: Arc<dyn ManagedConnectionListener>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            role,
            nonce,
            executor,
            listener,
            state: Mutex::new(DedupState::default()),
            this: this.clone(),
        })
    }

    pub fn nonce(&self) -> DedupNonce {
        self.nonce
    }

    fn publish(&self, state: &DedupState) {
        self.listener.on_connections(&visible(&state.entries));
    }

    fn start_exchange(&self, connection: Connection) {
        let this = self.this.clone();
        let role = self.role;
        let local = self.nonce;
        self.executor.spawn("dedup", async move {
            let chain_id = connection.chain_id();
            match exchange_nonce(&connection, role, local).await {
                Ok(remote) => {
                    debug!(%chain_id, %remote, "Nonce exchanged");
                    if let Some(this) = this.upgrade() {
                        this.on_remote_nonce(chain_id, remote);
                    }
                }
                Err(e) => {
                    warn!(%chain_id, error = %e, "Nonce exchange failed");
                    connection.close();
                }
            }
        });
    }

    /// Records who owns `remote` and closes the losing duplicate, if any.
    fn on_remote_nonce(&self, chain_id: ChainId, remote: DedupNonce) {
        let loser = {
            let mut state = self.state.lock();
            if !state.entries.contains_key(&chain_id) {
                debug!(%chain_id, %remote, "Connection removed before its nonce arrived");
                return;
            }
            match state.live_owner(&remote) {
                Some((owner, _)) if owner == chain_id => None,
                Some((owner, current)) => {
                    let current_type = state.connection_type(&owner);
                    let new_type = state.connection_type(&chain_id);
                    if is_current_better_than_new(current_type, new_type) {
                        debug!(%chain_id, %owner, ?current_type, ?new_type, "Keeping current link");
                        state.entries.get(&chain_id).map(|info| info.connection().clone())
                    } else {
                        debug!(%chain_id, %owner, ?current_type, ?new_type, "New link supersedes current");
                        state.owners.insert(remote, chain_id);
                        Some(current)
                    }
                }
                None => {
                    state.owners.insert(remote, chain_id);
                    None
                }
            }
        };

        if let Some(loser) = loser {
            info!(chain_id = %loser.chain_id(), %remote, "Closing duplicate connection");
            metrics::counter!("dedup.duplicates_closed_total").increment(1);
            loser.close();
        }
    }
}

impl ConnectionEventSink for DeduplicatingListener {
    fn added(&self, info: ConnectionInformation) {
        let mut state = self.state.lock();
        upsert(&mut state.entries, info);
        self.publish(&state);
    }

    fn updated(&self, info: ConnectionInformation, link: Option<Link>) {
        let connection = info.connection().clone();
        let exchange = {
            let mut state = self.state.lock();
            let chain_id = info.chain_id;
            upsert(&mut state.entries, info);
            let exchange = match link {
                Some(link) => {
                    let connected = matches!(link, Link::Connected(_));
                    state.links.insert(chain_id, link);
                    connected && state.exchanged.insert(chain_id)
                }
                None => false,
            };
            self.publish(&state);
            exchange
        };

        if exchange {
            self.start_exchange(connection);
        }
    }

    fn removed(&self, chain_id: ChainId) {
        let mut state = self.state.lock();
        state.links.remove(&chain_id);
        state.exchanged.remove(&chain_id);
        state.owners.retain(|_, owner| *owner != chain_id);
        if state.entries.remove(&chain_id).is_some() {
            self.publish(&state);
        }
    }
}
