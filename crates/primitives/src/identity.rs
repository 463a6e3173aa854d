use bytes::Bytes;

/// Transport a link runs over.
///
/// The discriminant is the wire tag; `0` on the wire means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionType {
    /// Local network service discovery.
    Nsd = 1,
    /// Short-range radio.
    Bluetooth = 2,
}

impl ConnectionType {
    /// Wire tag for an optional type, `0` when unknown.
    pub fn to_byte(value: Option<Self>) -> u8 {
        value.map_or(0, |t| t as u8)
    }

    /// Decodes a wire tag. Unknown tags decode as `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::from_repr(byte)
    }

    /// Preference when the same peer is reachable over several transports. Higher wins.
    pub fn priority(&self) -> u32 {
        match self {
            Self::Nsd => 100,
            Self::Bluetooth => 200,
        }
    }
}

/// Device category advertised by a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum DeviceType {
    Phone = 1,
    Tablet = 2,
    #[strum(serialize = "TV")]
    Tv = 3,
    Car = 4,
    Desktop = 5,
    Watch = 6,
}

impl DeviceType {
    pub fn to_byte(value: Option<Self>) -> u8 {
        value.map_or(0, |t| t as u8)
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::from_repr(byte)
    }
}

/// Metadata describing a peer.
///
/// Partially populated before the identify handshake, complete afterwards. Refinement replaces
/// the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub device_type: Option<DeviceType>,
    pub connection_type: Option<ConnectionType>,
    pub app_bytes: Option<Bytes>,
}

impl Identity {
    /// Identity known before any handshake, typically an address and the transport.
    pub fn partial(name: impl Into<String>, connection_type: ConnectionType) -> Self {
        Self {
            name: Some(name.into()),
            device_type: None,
            connection_type: Some(connection_type),
            app_bytes: None,
        }
    }

    /// Identity this process presents to peers over a given transport.
    pub fn local(
        user_info: &UserInfo,
        device_type: Option<DeviceType>,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            name: user_info.user_name.clone(),
            device_type,
            connection_type: Some(connection_type),
            app_bytes: user_info.app_bytes.clone(),
        }
    }

    /// User-facing name, falling back to a description of the device and transport.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => fallback_name(self.device_type, self.connection_type),
        }
    }
}

fn fallback_name(device_type: Option<DeviceType>, connection_type: Option<ConnectionType>) -> String {
    let device = device_type.map_or_else(|| "Device".to_string(), |d| d.to_string());
    match connection_type {
        Some(ConnectionType::Nsd) => format!("Connected {device}"),
        Some(ConnectionType::Bluetooth) => format!("Bluetooth {device}"),
        None => device,
    }
}

/// Information the application supplies when starting a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Overrides the advertised device name.
    pub user_name: Option<String>,
    /// Opaque application payload carried in the identity record.
    pub app_bytes: Option<Bytes>,
}

impl UserInfo {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_app_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.app_bytes = Some(bytes.into());
        self
    }
}
