//! Level-triggered start and stop of transport services.
//!
//! A [`ServiceController`] watches four [`ServiceSignals`] and keeps exactly one task of its
//! [`LifecycleService`] running while they all allow it.

mod signal;
pub use signal::Signal;

mod controller;
pub use controller::{LifecycleService, ServiceController};

/// Whether the underlying medium (radio, network) is usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Availability {
    #[default]
    Available,
    Unavailable,
}

/// Whether the platform allows the transport to operate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    #[default]
    Granted,
    Denied,
}

/// Whether the application wants the transport running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Preference {
    Open,
    #[default]
    Closed,
}

/// Whether a restart is currently allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Retry {
    #[default]
    Ready,
    Backoff,
}

/// Combined run decision, evaluated in order: preference, permission, availability, retry.
pub fn should_run(
    preference: Preference,
    permission: Permission,
    availability: Availability,
    retry: Retry,
) -> bool {
    if preference == Preference::Closed {
        return false;
    }
    if permission == Permission::Denied {
        return false;
    }
    if availability == Availability::Unavailable {
        return false;
    }
    retry == Retry::Ready
}

/// Inputs of one controller. Availability and permission are usually shared between the
/// transports of a medium; preference and retry belong to a single controller.
#[derive(Debug, Clone, Default)]
pub struct ServiceSignals {
    pub availability: Signal<Availability>,
    pub permission: Signal<Permission>,
    pub preference: Signal<Preference>,
    pub retry: Signal<Retry>,
}

impl ServiceSignals {
    pub fn should_run(&self) -> bool {
        should_run(
            self.preference.get(),
            self.permission.get(),
            self.availability.get(),
            self.retry.get(),
        )
    }
}
