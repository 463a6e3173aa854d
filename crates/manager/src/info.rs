//! Application-facing connection snapshots.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tether_connection::Connection;
use tether_primitives::{ChainId, ConnectionState, Identity};

/// Why a connection waits for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AdvanceReason {
    /// The peer is not paired; accepting starts out-of-band pairing.
    Bond,
    /// The server decides whether an identified client may join.
    Admit,
    /// A discovered server waits for the client to connect.
    Join,
}

type Action = Arc<dyn Fn() + Send + Sync>;

/// A pending user decision on a connection.
///
/// Both actions return immediately; the work they start runs on its own task. Only the first
/// decision taken on an advance, or on any of its clones, has an effect.
#[derive(Clone)]
pub struct Advance {
    reason: AdvanceReason,
    accept: Action,
    reject: Option<Action>,
    decided: Arc<AtomicBool>,
}

impl Advance {
    pub(crate) fn new(reason: AdvanceReason, accept: Action, reject: Option<Action>) -> Self {
        Self {
            reason,
            accept,
            reject,
            decided: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn reason(&self) -> AdvanceReason {
        self.reason
    }

    pub fn can_reject(&self) -> bool {
        self.reject.is_some()
    }

    /// True once the advance was accepted or rejected.
    pub fn is_decided(&self) -> bool {
        self.decided.load(Ordering::Acquire)
    }

    pub fn accept(&self) {
        if self.decide() {
            (self.accept)()
        }
    }

    /// Returns `false` when rejection is not meaningful for this advance or it was already
    /// decided.
    pub fn reject(&self) -> bool {
        let Some(reject) = &self.reject else {
            return false;
        };
        if !self.decide() {
            return false;
        }
        reject();
        true
    }

    fn decide(&self) -> bool {
        !self.decided.swap(true, Ordering::AcqRel)
    }
}

impl PartialEq for Advance {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason && self.can_reject() == other.can_reject()
    }
}

impl fmt::Debug for Advance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advance")
            .field("reason", &self.reason)
            .field("can_reject", &self.can_reject())
            .finish()
    }
}

/// Snapshot of one connection, rebuilt on every change.
#[derive(Clone)]
pub struct ConnectionInformation {
    pub chain_id: ChainId,
    pub name: String,
    pub identity: Option<Identity>,
    pub state: ConnectionState,
    pub advance: Option<Advance>,
    connection: Connection,
}

impl ConnectionInformation {
    pub fn snapshot(connection: &Connection, advance: Option<Advance>) -> Self {
        let state = connection.state();
        Self {
            chain_id: connection.chain_id(),
            name: connection.name(),
            identity: connection.identity(),
            state,
            advance: if state.is_terminal() { None } else { advance },
            connection: connection.clone(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl PartialEq for ConnectionInformation {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id
            && self.name == other.name
            && self.identity == other.identity
            && self.state == other.state
            && self.advance == other.advance
    }
}

impl fmt::Debug for ConnectionInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInformation")
            .field("chain_id", &self.chain_id)
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("advance", &self.advance)
            .finish()
    }
}
