use serde::{Deserialize, Serialize};
use tether_primitives::{DeviceType, UserInfo};

/// Session behaviour, TOML-serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Clients join every discovered server without asking.
    #[serde(default)]
    pub eager: bool,

    /// Merge connections that reach the same peer over several transports.
    #[serde(default = "default_deduplicate")]
    pub deduplicate: bool,

    /// Name advertised to peers. Defaults to a description of the device.
    #[serde(default)]
    pub user_name: Option<String>,

    #[serde(default)]
    pub device_type: Option<DeviceType>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            eager: false,
            deduplicate: default_deduplicate(),
            user_name: None,
            device_type: None,
        }
    }
}

impl SessionConfig {
    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            user_name: self.user_name.clone(),
            app_bytes: None,
        }
    }
}

fn default_deduplicate() -> bool {
    true
}
