//! Drives links forward according to the session role.

use std::sync::{Arc, Weak};

use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use tether_connection::{Connection, ConnectionObserver, IdentifiedLink, Link, UnidentifiedLink};
use tether_primitives::{ChainId, ConnectionState, Join};
use tether_tasks::TaskExecutor;
use tracing::{debug, warn};

use crate::{Advance, AdvanceReason, ConnectionEventSink, ConnectionInformation};

/// How links are advanced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolePolicy {
    /// Paired peers are identified automatically; bonding and admission wait for the user.
    Server,
    /// Servers are joined automatically when `eager`, otherwise after the user chooses one.
    /// Admission is always accepted since it is the server's decision.
    Client { eager: bool },
}

/// What to do with a freshly installed link.
enum Step {
    Auto(Task),
    Offer(Advance),
    Clear,
}

/// A link advance to run on its own task.
#[derive(Clone)]
enum Task {
    Identify(Arc<UnidentifiedLink>, bool),
    Join(Arc<IdentifiedLink>, Join),
}

impl Task {
    async fn run(self, chain_id: ChainId) {
        let result = match self {
            Self::Identify(link, allow_pairing) => link.advance(allow_pairing).await.map(drop),
            Self::Join(link, join) => link.advance(join).await.map(drop),
        };
        if let Err(e) = result {
            warn!(%chain_id, error = %e, "Link advance failed");
        }
    }
}

/// Observes every connection of a session, exposes pending [`Advance`]s and forwards snapshots
/// to a [`ConnectionEventSink`].
pub struct AdvanceOrchestrator {
    policy: RolePolicy,
    executor: TaskExecutor,
    sink: Arc<dyn ConnectionEventSink>,
    advances: Mutex<LinkedHashMap<ChainId, Option<Advance>>>,
    this: Weak<Self>,
}

impl AdvanceOrchestrator {
    pub fn new(
        policy: RolePolicy,
        executor: TaskExecutor,
        sink: Arc<dyn ConnectionEventSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            policy,
            executor,
            sink,
            advances: Mutex::new(LinkedHashMap::new()),
            this: this.clone(),
        })
    }

    pub fn policy(&self) -> RolePolicy {
        self.policy
    }

    /// The pending advance of a connection, if any.
    pub fn advance(&self, chain_id: ChainId) -> Option<Advance> {
        self.advances.lock().get(&chain_id).cloned().flatten()
    }

    fn step(&self, connection: &Connection, link: &Link) -> Step {
        match (self.policy, link) {
            (RolePolicy::Server, Link::Unidentified(link)) if link.is_paired() => {
                Step::Auto(Task::Identify(link.clone(), false))
            }
            (RolePolicy::Server, Link::Unidentified(link)) => Step::Offer(Advance::new(
                AdvanceReason::Bond,
                self.action(connection, Task::Identify(link.clone(), true)),
                None,
            )),
            (RolePolicy::Server, Link::Identified(link)) => Step::Offer(Advance::new(
                AdvanceReason::Admit,
                self.action(connection, Task::Join(link.clone(), Join::Accept)),
                Some(self.action(connection, Task::Join(link.clone(), Join::Reject))),
            )),
            (RolePolicy::Client { eager: true }, Link::Unidentified(link)) => {
                Step::Auto(Task::Identify(link.clone(), false))
            }
            (RolePolicy::Client { eager: false }, Link::Unidentified(link)) => {
                Step::Offer(Advance::new(
                    AdvanceReason::Join,
                    self.action(connection, Task::Identify(link.clone(), false)),
                    Some(self.close_action(connection)),
                ))
            }
            (RolePolicy::Client { .. }, Link::Identified(link)) => {
                Step::Auto(Task::Join(link.clone(), Join::Accept))
            }
            (_, Link::Connected(_)) => Step::Clear,
        }
    }

    /// An action that clears the advance, then runs `task`.
    fn action(&self, connection: &Connection, task: Task) -> Arc<dyn Fn() + Send + Sync> {
        let this = self.this.clone();
        let connection = connection.downgrade();
        let executor = self.executor.clone();
        Arc::new(move || {
            let this = this.clone();
            let connection = connection.clone();
            let task = task.clone();
            executor.spawn("advance", async move {
                let Some(connection) = connection.upgrade() else {
                    return;
                };
                if let Some(this) = this.upgrade() {
                    this.clear_advance(&connection);
                }
                task.run(connection.chain_id()).await;
            });
        })
    }

    fn close_action(&self, connection: &Connection) -> Arc<dyn Fn() + Send + Sync> {
        let this = self.this.clone();
        let connection = connection.downgrade();
        let executor = self.executor.clone();
        Arc::new(move || {
            let this = this.clone();
            let connection = connection.clone();
            executor.spawn("advance-reject", async move {
                let Some(connection) = connection.upgrade() else {
                    return;
                };
                if let Some(this) = this.upgrade() {
                    this.clear_advance(&connection);
                }
                debug!(chain_id = %connection.chain_id(), "Closing declined connection");
                connection.close();
            });
        })
    }

    fn clear_advance(&self, connection: &Connection) {
        if connection.state() == ConnectionState::Closed {
            return;
        }
        self.replace_advance(connection, None);
        self.sink
            .updated(ConnectionInformation::snapshot(connection, None), None);
    }

    fn replace_advance(&self, connection: &Connection, advance: Option<Advance>) {
        let mut advances = self.advances.lock();
        match advances.get_mut(&connection.chain_id()) {
            Some(slot) => *slot = advance,
            None => {
                advances.insert(connection.chain_id(), advance);
            }
        }
    }

    fn forget(&self, chain_id: ChainId) {
        self.advances.lock().remove(&chain_id);
        self.sink.removed(chain_id);
    }

    fn current(&self, connection: &Connection) -> ConnectionInformation {
        ConnectionInformation::snapshot(connection, self.advance(connection.chain_id()))
    }
}

impl ConnectionObserver for AdvanceOrchestrator {
    fn on_connection(&self, connection: &Connection) {
        self.replace_advance(connection, None);
        self.sink.added(self.current(connection));
    }

    fn on_connection_state_changed(&self, connection: &Connection, state: ConnectionState) {
        if state.is_terminal() {
            self.replace_advance(connection, None);
        }
        self.sink.updated(self.current(connection), None);

        if state == ConnectionState::Closed {
            self.forget(connection.chain_id());
        }
    }

    fn on_link_changed(&self, connection: &Connection, link: &Link) {
        if connection.state() == ConnectionState::Closed {
            return;
        }
        let step = self.step(connection, link);
        let (advance, auto) = match step {
            Step::Auto(task) => (None, Some(task)),
            Step::Offer(advance) => (Some(advance), None),
            Step::Clear => (None, None),
        };
        if let Some(advance) = &advance {
            debug!(chain_id = %connection.chain_id(), reason = %advance.reason(), "Advance pending");
        }
        self.replace_advance(connection, advance);
        self.sink.updated(self.current(connection), Some(link.clone()));
        // Closed while the step was prepared; the removal may already have been forwarded.
        if connection.state() == ConnectionState::Closed {
            self.forget(connection.chain_id());
            return;
        }

        if let Some(task) = auto {
            let chain_id = connection.chain_id();
            debug!(%chain_id, kind = %link.kind(), "Advancing automatically");
            self.executor.spawn("advance", task.run(chain_id));
        }
    }

    fn on_link_identity_changed(&self, connection: &Connection, link: &Link) {
        if connection.state() == ConnectionState::Closed {
            return;
        }
        self.sink.updated(self.current(connection), Some(link.clone()));
    }
}
