//! Client and server session facades.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tether_connection::{
    ConnectionObserver, LinkConfig, LinkSetup, Role, Transport, TransportContext,
};
use tether_primitives::{ConnectionType, DedupNonce, DeviceType, Identity, UserInfo};
use tether_service::{
    Availability, LifecycleService, Permission, Preference, ServiceController, ServiceSignals,
    Signal,
};
use tether_tasks::TaskExecutor;
use tracing::{info, warn};

use crate::{
    AdvanceOrchestrator, ConnectionEventSink, DeduplicatingListener, ForwardingListener,
    ManagedConnectionListener, RolePolicy, SessionConfig,
};

/// Runs one transport for one session role.
struct TransportService {
    name: String,
    transport: Arc<dyn Transport>,
    role: Role,
    device_type: Option<DeviceType>,
    link: LinkConfig,
    user_info: Arc<RwLock<UserInfo>>,
    observers: Vec<Arc<dyn ConnectionObserver>>,
    preference: Signal<Preference>,
}

#[async_trait]
impl LifecycleService for TransportService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) {
        let local = Identity::local(
            &self.user_info.read(),
            self.device_type,
            self.transport.connection_type(),
        );
        let ctx = TransportContext::new(
            LinkSetup {
                role: self.role,
                local,
                config: self.link.clone(),
            },
            self.observers.clone(),
        );

        info!(service = %self.name, "Transport running");
        match self.transport.run(ctx).await {
            Ok(()) => info!(service = %self.name, "Transport finished"),
            Err(e) => warn!(service = %self.name, error = %e, "Transport failed"),
        }
        self.preference.set(Preference::Closed);
    }
}

struct Session {
    nonce: DedupNonce,
    orchestrator: Arc<AdvanceOrchestrator>,
    user_info: Arc<RwLock<UserInfo>>,
    availability: Signal<Availability>,
    permission: Signal<Permission>,
    controllers: Vec<(ConnectionType, ServiceController)>,
}

impl Session {
    fn new(
        role: Role,
        policy: RolePolicy,
        transports: Vec<Arc<dyn Transport>>,
        executor: TaskExecutor,
        config: SessionConfig,
        link: LinkConfig,
        listener: Arc<dyn ManagedConnectionListener>,
    ) -> Self {
        let nonce = DedupNonce::random();
        let sink: Arc<dyn ConnectionEventSink> = if config.deduplicate {
            DeduplicatingListener::new(role, nonce, executor.clone(), listener)
        } else {
            Arc::new(ForwardingListener::new(listener))
        };
        let orchestrator = AdvanceOrchestrator::new(policy, executor.clone(), sink);
        let observer: Arc<dyn ConnectionObserver> = orchestrator.clone();

        let user_info = Arc::new(RwLock::new(config.user_info()));
        let availability = Signal::default();
        let permission = Signal::default();

        let controllers = transports
            .into_iter()
            .map(|transport| {
                let connection_type = transport.connection_type();
                let signals = ServiceSignals {
                    availability: availability.clone(),
                    permission: permission.clone(),
                    preference: Signal::default(),
                    retry: Signal::default(),
                };
                let service = TransportService {
                    name: format!("{role}-{connection_type}"),
                    transport,
                    role,
                    device_type: config.device_type,
                    link: link.clone(),
                    user_info: user_info.clone(),
                    observers: vec![observer.clone()],
                    preference: signals.preference.clone(),
                };
                let controller =
                    ServiceController::new(Arc::new(service), signals, executor.clone());
                controller.observe();
                (connection_type, controller)
            })
            .collect();

        info!(%role, %nonce, deduplicate = config.deduplicate, "Session created");
        Self {
            nonce,
            orchestrator,
            user_info,
            availability,
            permission,
            controllers,
        }
    }

    fn open(&self, user_info: UserInfo) {
        *self.user_info.write() = user_info;
        self.set_preference(Preference::Open);
    }

    fn set_preference(&self, preference: Preference) {
        for (_, controller) in &self.controllers {
            controller.signals().preference.set(preference);
        }
    }

    fn controller(&self, connection_type: ConnectionType) -> Option<&ServiceController> {
        self.controllers
            .iter()
            .find(|(ct, _)| *ct == connection_type)
            .map(|(_, controller)| controller)
    }
}

macro_rules! session_accessors {
    ($ty:ty) => {
        impl $ty {
            /// Nonce this session presents during deduplication.
            pub fn nonce(&self) -> DedupNonce {
                self.session.nonce
            }

            pub fn orchestrator(&self) -> &Arc<AdvanceOrchestrator> {
                &self.session.orchestrator
            }

            /// Medium availability shared by every transport of the session.
            pub fn availability(&self) -> &Signal<Availability> {
                &self.session.availability
            }

            pub fn permission(&self) -> &Signal<Permission> {
                &self.session.permission
            }

            /// Signals of the transport serving `connection_type`.
            pub fn signals(&self, connection_type: ConnectionType) -> Option<&ServiceSignals> {
                self.session.controller(connection_type).map(ServiceController::signals)
            }

            pub fn is_running(&self, connection_type: ConnectionType) -> bool {
                self.session
                    .controller(connection_type)
                    .is_some_and(ServiceController::is_running)
            }
        }
    };
}

/// Accepts clients on every transport.
pub struct ManagedServer {
    session: Session,
}

impl ManagedServer {
    pub fn new(
        transports: Vec<Arc<dyn Transport>>,
        executor: TaskExecutor,
        config: SessionConfig,
        link: LinkConfig,
        listener: Arc<dyn ManagedConnectionListener>,
    ) -> Self {
        Self {
            session: Session::new(
                Role::Server,
                RolePolicy::Server,
                transports,
                executor,
                config,
                link,
                listener,
            ),
        }
    }

    /// Starts every transport, advertising `user_info`.
    pub fn start_server(&self, user_info: UserInfo) {
        info!(name = ?user_info.user_name, "Starting server");
        self.session.open(user_info);
    }

    pub fn stop_server(&self) {
        info!("Stopping server");
        self.session.set_preference(Preference::Closed);
    }
}

session_accessors!(ManagedServer);

/// Looks for servers on every transport.
pub struct ManagedClient {
    session: Session,
}

impl ManagedClient {
    pub fn new(
        transports: Vec<Arc<dyn Transport>>,
        executor: TaskExecutor,
        config: SessionConfig,
        link: LinkConfig,
        listener: Arc<dyn ManagedConnectionListener>,
    ) -> Self {
        let policy = RolePolicy::Client {
            eager: config.eager,
        };
        Self {
            session: Session::new(
                Role::Client,
                policy,
                transports,
                executor,
                config,
                link,
                listener,
            ),
        }
    }

    /// Starts discovery on every transport, presenting `user_info`.
    pub fn find_server(&self, user_info: UserInfo) {
        info!(name = ?user_info.user_name, "Finding server");
        self.session.open(user_info);
    }

    pub fn stop_finding_server(&self) {
        info!("Stopping server discovery");
        self.session.set_preference(Preference::Closed);
    }
}

session_accessors!(ManagedClient);
