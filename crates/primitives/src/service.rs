/// Maximum advertised friendly-name length in bytes.
pub const MAX_FRIENDLY_NAME_BYTES: usize = 256;

/// Description of the service a server advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    friendly_name: String,
    system_name: String,
}

impl ServiceInfo {
    pub fn new(friendly_name: impl Into<String>, system_name: impl Into<String>) -> Self {
        Self {
            friendly_name: friendly_name.into(),
            system_name: system_name.into(),
        }
    }

    /// Friendly name cut to [`MAX_FRIENDLY_NAME_BYTES`] on a character boundary.
    pub fn service_name(&self) -> &str {
        truncate_utf8(&self.friendly_name, MAX_FRIENDLY_NAME_BYTES)
    }

    /// DNS-SD service type, e.g. `_tether._tcp`.
    pub fn service_type(&self) -> String {
        let sanitized: String = self.system_name.chars().filter(|c| *c != ' ').collect();
        format!("_{sanitized}._tcp")
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }
}

/// Longest prefix of `s` that is at most `max_bytes` long and ends on a character boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.get(..end).unwrap_or_default()
}
