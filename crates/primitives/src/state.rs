/// Lifecycle state of a connection.
///
/// `Closed`, `Rejected` and `Error` are terminal: once reached, the state never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Opening,
    Connected,
    Reconnecting,
    Closed,
    Rejected,
    Error,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Rejected | Self::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ConnectionState::Opening.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::Reconnecting.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(ConnectionState::Rejected.is_terminal());
        assert!(ConnectionState::Error.is_terminal());
    }
}
