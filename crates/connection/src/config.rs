//! Link tuning, TOML-serializable.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_net_codec::DEFAULT_MAX_ARRAY_LEN;

/// Default overall bonding deadline in milliseconds.
pub const DEFAULT_BONDING_TIMEOUT_MS: u64 = 10_000;

/// Default interval between paired-status polls in milliseconds.
pub const DEFAULT_BONDING_POLL_INTERVAL_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Cap on every length-prefixed field exchanged during identify.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,

    /// Overall deadline for out-of-band pairing.
    #[serde(default = "default_bonding_timeout_ms")]
    pub bonding_timeout_ms: u64,

    /// How often paired status is polled while pairing.
    #[serde(default = "default_bonding_poll_interval_ms")]
    pub bonding_poll_interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_ARRAY_LEN,
            bonding_timeout_ms: DEFAULT_BONDING_TIMEOUT_MS,
            bonding_poll_interval_ms: DEFAULT_BONDING_POLL_INTERVAL_MS,
        }
    }
}

impl LinkConfig {
    pub fn bonding_timeout(&self) -> Duration {
        Duration::from_millis(self.bonding_timeout_ms)
    }

    pub fn bonding_poll_interval(&self) -> Duration {
        Duration::from_millis(self.bonding_poll_interval_ms)
    }
}

fn default_max_payload_len() -> usize {
    DEFAULT_MAX_ARRAY_LEN
}

fn default_bonding_timeout_ms() -> u64 {
    DEFAULT_BONDING_TIMEOUT_MS
}

fn default_bonding_poll_interval_ms() -> u64 {
    DEFAULT_BONDING_POLL_INTERVAL_MS
}
