/// Whether a peer is attached to the link.
///
/// Written only from transport connect/disconnect events; read before every
/// send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected {
        peer: String,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// Address of the attached peer.
    pub fn peer(&self) -> Option<&str> {
        match self {
            ConnectionState::Connected { peer } => Some(peer),
            ConnectionState::Disconnected => None,
        }
    }

    /// `Disconnected → Connected`. Returns false if already connected.
    pub fn connect(&mut self, peer: impl Into<String>) -> bool {
        if self.is_connected() {
            return false;
        }
        *self = ConnectionState::Connected { peer: peer.into() };
        true
    }

    /// `Connected → Disconnected`. Returns the peer that left, if any.
    pub fn disconnect(&mut self) -> Option<String> {
        match std::mem::take(self) {
            ConnectionState::Connected { peer } => Some(peer),
            ConnectionState::Disconnected => None,
        }
    }
}
