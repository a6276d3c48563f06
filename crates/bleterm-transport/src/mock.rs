use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Advertisement, Transport, TransportEvent};

/// In-memory link with scripted inbound events and recorded outbound writes.
///
/// Events queued with [`MockLink::connect`], [`MockLink::write_from_peer`] and
/// [`MockLink::disconnect`] are delivered on the next `poll`, in order.
#[derive(Debug, Default)]
pub struct MockLink {
    inbound: VecDeque<TransportEvent>,
    outbound: Vec<(Instant, Bytes)>,
    advertisement: Option<Advertisement>,
    peer: Option<String>,
    unavailable: Option<String>,
}

impl MockLink {
    /// Create an idle link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a link whose `begin` fails, as a radio that never comes up.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Queue a peer connection.
    pub fn connect(&mut self, peer: impl Into<String>) {
        self.inbound
            .push_back(TransportEvent::Connected { peer: peer.into() });
    }

    /// Queue a peer disconnection.
    pub fn disconnect(&mut self, peer: impl Into<String>) {
        self.inbound
            .push_back(TransportEvent::Disconnected { peer: peer.into() });
    }

    /// Queue one attribute write from the peer.
    pub fn write_from_peer(&mut self, value: impl Into<Bytes>) {
        self.inbound.push_back(TransportEvent::Written(value.into()));
    }

    /// Values written to the peer so far, with their write instants.
    pub fn outbound(&self) -> &[(Instant, Bytes)] {
        &self.outbound
    }

    /// Take the values written to the peer so far.
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        self.outbound.drain(..).map(|(_, value)| value).collect()
    }

    /// The advertisement passed to `begin`, if started.
    pub fn advertisement(&self) -> Option<&Advertisement> {
        self.advertisement.as_ref()
    }
}

impl Transport for MockLink {
    fn begin(&mut self, advertisement: &Advertisement) -> Result<()> {
        if let Some(reason) = &self.unavailable {
            return Err(TransportError::Unavailable(reason.clone()));
        }
        debug!(name = %advertisement.local_name, "mock link advertising");
        self.advertisement = Some(advertisement.clone());
        Ok(())
    }

    fn poll(&mut self, dispatch: &mut dyn FnMut(TransportEvent)) -> Result<()> {
        if self.advertisement.is_none() {
            return Err(TransportError::NotStarted);
        }
        while let Some(event) = self.inbound.pop_front() {
            match &event {
                TransportEvent::Connected { peer } => self.peer = Some(peer.clone()),
                TransportEvent::Disconnected { .. } => self.peer = None,
                TransportEvent::Written(_) => {}
            }
            dispatch(event);
        }
        Ok(())
    }

    fn write_value(&mut self, value: &[u8]) -> Result<()> {
        let max = match &self.advertisement {
            Some(advertisement) => advertisement.value_size,
            None => return Err(TransportError::NotStarted),
        };
        if self.peer.is_none() {
            return Err(TransportError::NotConnected);
        }
        if value.len() > max {
            return Err(TransportError::ValueTooLarge {
                size: value.len(),
                max,
            });
        }
        self.outbound
            .push((Instant::now(), Bytes::copy_from_slice(value)));
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "mock"
    }
}
