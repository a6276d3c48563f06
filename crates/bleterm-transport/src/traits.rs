use bytes::Bytes;

use crate::error::Result;

/// Default attribute value size in bytes (the common negotiated payload).
pub const DEFAULT_VALUE_SIZE: usize = 20;

/// Default advertised local name.
pub const DEFAULT_LOCAL_NAME: &str = "BluetoothTerminal";

/// Default service identifier.
pub const DEFAULT_SERVICE_ID: &str = "ffe0";

/// Default characteristic identifier.
pub const DEFAULT_CHARACTERISTIC_ID: &str = "ffe1";

/// What the peripheral advertises when the transport is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Local/device name.
    pub local_name: String,
    /// Service identifier (e.g. a 16-bit UUID such as `ffe0`).
    pub service_id: String,
    /// Characteristic identifier (e.g. `ffe1`).
    pub characteristic_id: String,
    /// Maximum size of a single attribute value, in either direction.
    pub value_size: usize,
}

impl Default for Advertisement {
    fn default() -> Self {
        Self {
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            service_id: DEFAULT_SERVICE_ID.to_string(),
            characteristic_id: DEFAULT_CHARACTERISTIC_ID.to_string(),
            value_size: DEFAULT_VALUE_SIZE,
        }
    }
}

/// An event delivered by [`Transport::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A peer attached to the link.
    Connected { peer: String },
    /// The peer detached from the link.
    Disconnected { peer: String },
    /// The peer wrote one attribute value.
    Written(Bytes),
}

/// A link exposing one writable/notifiable attribute.
///
/// Implementations deliver each peer write as exactly one
/// [`TransportEvent::Written`], in order, and accept outgoing values no larger
/// than the advertised `value_size`.
pub trait Transport {
    /// Bring the link up and start advertising.
    fn begin(&mut self, advertisement: &Advertisement) -> Result<()>;

    /// Dispatch every pending event to `dispatch`, without blocking.
    fn poll(&mut self, dispatch: &mut dyn FnMut(TransportEvent)) -> Result<()>;

    /// Write one attribute value to the peer (notify).
    fn write_value(&mut self, value: &[u8]) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn begin(&mut self, advertisement: &Advertisement) -> Result<()> {
        (**self).begin(advertisement)
    }

    fn poll(&mut self, dispatch: &mut dyn FnMut(TransportEvent)) -> Result<()> {
        (**self).poll(dispatch)
    }

    fn write_value(&mut self, value: &[u8]) -> Result<()> {
        (**self).write_value(value)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
