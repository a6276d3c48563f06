use std::time::Duration;

use bleterm_frame::{
    FrameConfig, Fragmenter, ReassemblyEvent, ReassemblyStats, Reassembler, Sent,
};
use bleterm_transport::{Advertisement, Transport, TransportEvent};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::connection::ConnectionState;
use crate::error::{Result, TerminalError};
use crate::identity::Identity;

/// Called with the peer address when a peer attaches.
pub type ConnectHandler = Box<dyn FnMut(&str)>;

/// Called with the peer address when the peer detaches.
pub type DisconnectHandler = Box<dyn FnMut(&str)>;

/// Called with each complete message, separator stripped.
pub type ReceiveHandler = Box<dyn FnMut(Bytes)>;

/// A whole option set for [`Terminal::configure`].
///
/// Identity fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct TerminalConfig {
    pub frame: FrameConfig,
    pub device_name: Option<String>,
    pub service_id: Option<String>,
    pub characteristic_id: Option<String>,
}

#[derive(Default)]
struct Handlers {
    connect: Option<ConnectHandler>,
    disconnect: Option<DisconnectHandler>,
    receive: Option<ReceiveHandler>,
}

/// Message terminal bound to one transport.
///
/// Owns the reassembler, the fragmenter and the connection state. Nothing
/// runs in the background: events are processed only inside [`Terminal::poll`].
///
/// Handlers run inside `poll` and cannot borrow the terminal. To reply to a
/// message, queue it in the handler and call [`Terminal::send`] after `poll`
/// returns.
pub struct Terminal<T: Transport> {
    transport: T,
    config: FrameConfig,
    identity: Identity,
    reassembler: Reassembler,
    fragmenter: Fragmenter,
    state: ConnectionState,
    handlers: Handlers,
    started: bool,
}

impl<T: Transport> Terminal<T> {
    /// Create a terminal with default framing and identity.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            config: FrameConfig::default(),
            identity: Identity::default(),
            reassembler: Reassembler::default(),
            fragmenter: Fragmenter::default(),
            state: ConnectionState::default(),
            handlers: Handlers::default(),
            started: false,
        }
    }

    /// Create a terminal and apply `config`.
    pub fn with_config(transport: T, config: TerminalConfig) -> Result<Self> {
        let mut terminal = Self::new(transport);
        terminal.configure(config)?;
        Ok(terminal)
    }

    /// Apply a whole option set.
    ///
    /// Framing values are validated together and overwrite the current ones.
    /// Identity values go through the set-once setters; the first failure is
    /// returned and later identity fields are left untouched.
    pub fn configure(&mut self, config: TerminalConfig) -> Result<()> {
        config.frame.validate()?;

        let frame = config.frame;
        self.set_receive_separator(frame.receive_separator);
        self.set_send_separator(frame.send_separator);
        self.set_max_chunk_size(frame.max_chunk_size)?;
        self.set_receive_buffer_capacity(frame.receive_buffer_capacity)?;
        self.set_inter_chunk_delay(frame.inter_chunk_delay);

        if let Some(name) = config.device_name {
            self.set_device_name(name)?;
        }
        if let Some(id) = config.service_id {
            self.set_service_id(id)?;
        }
        if let Some(id) = config.characteristic_id {
            self.set_characteristic_id(id)?;
        }
        Ok(())
    }

    pub fn set_receive_separator(&mut self, separator: u8) {
        self.reassembler.set_separator(separator);
        self.config.receive_separator = separator;
    }

    pub fn set_send_separator(&mut self, separator: u8) {
        self.fragmenter.set_separator(separator);
        self.config.send_separator = separator;
    }

    /// Largest chunk handed to the transport in one write.
    ///
    /// Takes effect for the next send. The advertised value size is fixed at
    /// [`Terminal::start`], so raising this afterwards makes larger chunks
    /// fail at the transport.
    pub fn set_max_chunk_size(&mut self, max_chunk_size: usize) -> Result<()> {
        self.fragmenter.set_max_chunk_size(max_chunk_size)?;
        self.config.max_chunk_size = max_chunk_size;
        Ok(())
    }

    /// Receive buffer capacity. A message in progress keeps the old buffer
    /// until its boundary.
    pub fn set_receive_buffer_capacity(&mut self, capacity: usize) -> Result<()> {
        self.reassembler.set_capacity(capacity)?;
        self.config.receive_buffer_capacity = capacity;
        Ok(())
    }

    pub fn set_inter_chunk_delay(&mut self, delay: Duration) {
        self.fragmenter.set_inter_chunk_delay(delay);
        self.config.inter_chunk_delay = delay;
    }

    /// Set the advertised device name. Only the first call succeeds.
    pub fn set_device_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.identity.set_device_name(name)
    }

    /// Set the advertised service id. Only the first call succeeds.
    pub fn set_service_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.identity.set_service_id(id)
    }

    /// Set the advertised characteristic id. Only the first call succeeds.
    pub fn set_characteristic_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.identity.set_characteristic_id(id)
    }

    pub fn on_connect(&mut self, handler: impl FnMut(&str) + 'static) {
        self.handlers.connect = Some(Box::new(handler));
    }

    pub fn on_disconnect(&mut self, handler: impl FnMut(&str) + 'static) {
        self.handlers.disconnect = Some(Box::new(handler));
    }

    pub fn on_receive(&mut self, handler: impl FnMut(Bytes) + 'static) {
        self.handlers.receive = Some(Box::new(handler));
    }

    /// Bring the transport up and advertise the identity.
    ///
    /// A transport that cannot start is fatal:
    /// [`TerminalError::TransportUnavailable`].
    pub fn start(&mut self) -> Result<()> {
        let advertisement = self.advertisement();
        self.transport
            .begin(&advertisement)
            .map_err(TerminalError::TransportUnavailable)?;
        self.started = true;
        info!(
            transport = self.transport.transport_name(),
            name = %advertisement.local_name,
            service = %advertisement.service_id,
            characteristic = %advertisement.characteristic_id,
            value_size = advertisement.value_size,
            "terminal started"
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Process every pending transport event. Handlers run here.
    pub fn poll(&mut self) -> Result<()> {
        let Self {
            transport,
            reassembler,
            state,
            handlers,
            ..
        } = self;
        transport.poll(&mut |event| dispatch(event, reassembler, state, handlers))?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Address of the connected peer.
    pub fn peer(&self) -> Option<&str> {
        self.state.peer()
    }

    /// Send one message, blocking through the inter-chunk delays.
    ///
    /// Fails with [`TerminalError::NotConnected`] and writes nothing when no
    /// peer is attached. A transport failure mid-message aborts the send;
    /// chunks already written are not recalled.
    pub fn send(&mut self, message: &[u8]) -> Result<Sent> {
        if !self.state.is_connected() {
            debug!(len = message.len(), "send refused, no device connected");
            return Err(TerminalError::NotConnected);
        }

        let sent = self.fragmenter.send(&mut self.transport, message)?;
        debug!(chunks = sent.chunks, bytes = sent.bytes, "message sent");
        Ok(sent)
    }

    /// Framing values currently in effect.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// What [`Terminal::start`] advertises.
    pub fn advertisement(&self) -> Advertisement {
        self.identity.advertisement(self.config.max_chunk_size)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn reassembly_stats(&self) -> ReassemblyStats {
        self.reassembler.stats()
    }
}

fn dispatch(
    event: TransportEvent,
    reassembler: &mut Reassembler,
    state: &mut ConnectionState,
    handlers: &mut Handlers,
) {
    match event {
        TransportEvent::Connected { peer } => {
            if !state.connect(peer.as_str()) {
                debug!(%peer, "already connected, event ignored");
                return;
            }
            info!(%peer, "device connected");
            if let Some(handler) = handlers.connect.as_mut() {
                handler(&peer);
            }
        }
        TransportEvent::Disconnected { peer: reported } => {
            let Some(peer) = state.disconnect() else {
                debug!(peer = %reported, "not connected, event ignored");
                return;
            };
            let dropped = reassembler.reset();
            if dropped > 0 {
                warn!(%peer, dropped, "disconnected mid-message, partial data dropped");
            }
            info!(%peer, "device disconnected");
            if let Some(handler) = handlers.disconnect.as_mut() {
                handler(&peer);
            }
        }
        TransportEvent::Written(chunk) => {
            for event in reassembler.push(&chunk) {
                match event {
                    ReassemblyEvent::Message(message) => match handlers.receive.as_mut() {
                        Some(handler) => handler(message),
                        None => debug!(len = message.len(), "no receive handler, message dropped"),
                    },
                    // Already logged by the reassembler; never delivered.
                    ReassemblyEvent::Overflow { .. } => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bleterm_frame::FrameError;
    use bleterm_transport::{MockLink, TransportError};

    use super::*;
    use crate::identity::IdentityField;

    fn collect_messages<T: Transport>(terminal: &mut Terminal<T>) -> Rc<RefCell<Vec<Bytes>>> {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&received);
        terminal.on_receive(move |message| sink.borrow_mut().push(message));
        received
    }

    fn connected_terminal() -> Terminal<MockLink> {
        let mut terminal = Terminal::new(MockLink::new());
        terminal.start().unwrap();
        terminal.transport_mut().connect("aa:bb:cc");
        terminal.poll().unwrap();
        assert!(terminal.is_connected());
        terminal
    }

    #[test]
    fn send_without_peer_writes_nothing() {
        let mut terminal = Terminal::new(MockLink::new());
        terminal.start().unwrap();

        let err = terminal.send(b"hello").unwrap_err();
        assert!(matches!(err, TerminalError::NotConnected));
        assert!(terminal.transport().outbound().is_empty());
    }

    #[test]
    fn connect_and_disconnect_run_handlers() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut terminal = Terminal::new(MockLink::new());

        let sink = Rc::clone(&events);
        terminal.on_connect(move |peer| sink.borrow_mut().push(format!("+{peer}")));
        let sink = Rc::clone(&events);
        terminal.on_disconnect(move |peer| sink.borrow_mut().push(format!("-{peer}")));

        terminal.start().unwrap();
        terminal.transport_mut().connect("aa:bb");
        terminal.transport_mut().connect("aa:bb");
        terminal.poll().unwrap();
        assert_eq!(terminal.peer(), Some("aa:bb"));

        terminal.transport_mut().disconnect("aa:bb");
        terminal.transport_mut().disconnect("aa:bb");
        terminal.poll().unwrap();
        assert!(!terminal.is_connected());

        assert_eq!(*events.borrow(), vec!["+aa:bb", "-aa:bb"]);
    }

    #[test]
    fn chunks_reassemble_into_messages() {
        let mut terminal = connected_terminal();
        let received = collect_messages(&mut terminal);

        let link = terminal.transport_mut();
        link.write_from_peer(&b"hel"[..]);
        link.write_from_peer(&b"lo\nwor"[..]);
        link.write_from_peer(&b"ld\n\n"[..]);
        terminal.poll().unwrap();

        assert_eq!(
            *received.borrow(),
            vec![
                Bytes::from_static(b"hello"),
                Bytes::from_static(b"world"),
                Bytes::new(),
            ]
        );
        assert_eq!(terminal.reassembly_stats().messages, 3);
    }

    #[test]
    fn delivered_message_is_not_overwritten_by_later_bytes() {
        let mut terminal = connected_terminal();
        let received = collect_messages(&mut terminal);

        terminal.transport_mut().write_from_peer(&b"first\nsecond"[..]);
        terminal.poll().unwrap();
        terminal.transport_mut().write_from_peer(&b"\n"[..]);
        terminal.poll().unwrap();

        assert_eq!(received.borrow()[0], Bytes::from_static(b"first"));
        assert_eq!(received.borrow()[1], Bytes::from_static(b"second"));
    }

    #[test]
    fn disconnect_drops_partial_message() {
        let mut terminal = connected_terminal();
        let received = collect_messages(&mut terminal);

        let link = terminal.transport_mut();
        link.write_from_peer(&b"stale"[..]);
        link.disconnect("aa:bb:cc");
        link.connect("aa:bb:cc");
        link.write_from_peer(&b"fresh\n"[..]);
        terminal.poll().unwrap();

        assert_eq!(*received.borrow(), vec![Bytes::from_static(b"fresh")]);
    }

    #[test]
    fn reply_after_peer_left_in_same_poll_is_refused() {
        let mut terminal = Terminal::new(MockLink::new());
        let received = collect_messages(&mut terminal);
        terminal.start().unwrap();

        let link = terminal.transport_mut();
        link.connect("aa:bb");
        link.write_from_peer(&b"x\n"[..]);
        link.disconnect("aa:bb");
        terminal.poll().unwrap();

        assert_eq!(*received.borrow(), vec![Bytes::from_static(b"x")]);
        let err = terminal.send(b"x").unwrap_err();
        assert!(matches!(err, TerminalError::NotConnected));
        assert!(terminal.transport().outbound().is_empty());
    }

    #[test]
    fn overflow_is_not_delivered() {
        let mut terminal = connected_terminal();
        terminal.set_receive_buffer_capacity(4).unwrap();
        let received = collect_messages(&mut terminal);

        terminal.transport_mut().write_from_peer(&b"abcdef\nok\n"[..]);
        terminal.poll().unwrap();

        // "abc" overflows, "def" is kept as the next message.
        assert_eq!(
            *received.borrow(),
            vec![Bytes::from_static(b"def"), Bytes::from_static(b"ok")]
        );
        let stats = terminal.reassembly_stats();
        assert_eq!(stats.overflows, 1);
        assert_eq!(stats.discarded_bytes, 3);
    }

    #[test]
    fn send_fragments_with_configured_chunk_size() {
        let mut terminal = Terminal::new(MockLink::new());
        terminal.set_max_chunk_size(4).unwrap();
        terminal.set_send_separator(b';');
        terminal.start().unwrap();
        terminal.transport_mut().connect("peer");
        terminal.poll().unwrap();

        let sent = terminal.send(b"abcdefgh").unwrap();
        assert_eq!(sent.chunks, 3);
        assert_eq!(sent.bytes, 9);
        assert_eq!(
            terminal.transport_mut().take_outbound(),
            vec![
                Bytes::from_static(b"abcd"),
                Bytes::from_static(b"efgh"),
                Bytes::from_static(b";"),
            ]
        );
    }

    #[test]
    fn transport_failure_surfaces_as_transport_error() {
        let mut terminal = connected_terminal();
        // Advertised at 20; larger chunks are refused by the link.
        terminal.set_max_chunk_size(32).unwrap();

        let err = terminal.send(&[b'x'; 40]).unwrap_err();
        assert!(matches!(
            err,
            TerminalError::Transport(TransportError::ValueTooLarge { size: 32, max: 20 })
        ));
    }

    #[test]
    fn identity_is_set_once_and_advertised() {
        let mut terminal = Terminal::new(MockLink::new());
        terminal.set_device_name("Thermo").unwrap();
        let err = terminal.set_device_name("Other").unwrap_err();
        assert!(matches!(
            err,
            TerminalError::IdentityAlreadySet {
                field: IdentityField::DeviceName,
                ..
            }
        ));
        terminal.set_service_id("180a").unwrap();

        terminal.start().unwrap();
        let advertisement = terminal.transport().advertisement().unwrap();
        assert_eq!(advertisement.local_name, "Thermo");
        assert_eq!(advertisement.service_id, "180a");
        assert_eq!(advertisement.characteristic_id, "ffe1");
        assert_eq!(advertisement.value_size, 20);
    }

    #[test]
    fn unavailable_transport_is_fatal() {
        let mut terminal = Terminal::new(MockLink::unavailable("radio off"));
        let err = terminal.start().unwrap_err();
        assert!(matches!(
            err,
            TerminalError::TransportUnavailable(TransportError::Unavailable(_))
        ));
        assert!(!terminal.is_started());
    }

    #[test]
    fn configure_applies_options() {
        let config = TerminalConfig {
            frame: FrameConfig {
                receive_separator: b'\r',
                max_chunk_size: 8,
                inter_chunk_delay: Duration::from_millis(5),
                ..FrameConfig::default()
            },
            device_name: Some("Gate".to_string()),
            ..TerminalConfig::default()
        };
        let mut terminal = Terminal::with_config(MockLink::new(), config).unwrap();
        assert_eq!(terminal.config().max_chunk_size, 8);
        assert_eq!(terminal.config().inter_chunk_delay, Duration::from_millis(5));
        assert_eq!(terminal.identity().device_name(), "Gate");

        let received = collect_messages(&mut terminal);
        terminal.start().unwrap();
        terminal.transport_mut().connect("peer");
        terminal.transport_mut().write_from_peer(&b"a\nb\r"[..]);
        terminal.poll().unwrap();
        assert_eq!(*received.borrow(), vec![Bytes::from_static(b"a\nb")]);
    }

    #[test]
    fn configure_rejects_invalid_framing() {
        let config = TerminalConfig {
            frame: FrameConfig {
                max_chunk_size: 0,
                ..FrameConfig::default()
            },
            device_name: Some("Never".to_string()),
            ..TerminalConfig::default()
        };
        let mut terminal = Terminal::new(MockLink::new());
        let err = terminal.configure(config).unwrap_err();
        assert!(matches!(
            err,
            TerminalError::Frame(FrameError::InvalidConfig(_))
        ));
        assert_eq!(terminal.config().max_chunk_size, 20);
        assert!(!terminal.identity().is_set(IdentityField::DeviceName));
    }

    #[test]
    fn poll_before_start_fails() {
        let mut terminal = Terminal::new(MockLink::new());
        assert!(matches!(
            terminal.poll(),
            Err(TerminalError::Transport(TransportError::NotStarted))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn terminals_exchange_messages_over_uds() {
        use std::time::Instant;

        use bleterm_transport::{UdsCentral, UdsPeripheral};

        let dir = std::env::temp_dir().join(format!(
            "bleterm-terminal-uds-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("terminal.sock");

        let mut peripheral = Terminal::new(UdsPeripheral::new(&sock_path));
        peripheral.set_device_name("Bench").unwrap();
        let inbox = collect_messages(&mut peripheral);
        peripheral.start().unwrap();

        let mut central = Terminal::new(UdsCentral::new(&sock_path));
        let replies = collect_messages(&mut central);
        central.start().unwrap();
        central.poll().unwrap();
        assert!(central.is_connected());

        let deadline = Instant::now() + Duration::from_secs(3);
        let message = b"a message longer than one twenty byte chunk";
        let mut sent = false;
        while inbox.borrow().is_empty() {
            assert!(Instant::now() < deadline, "timed out waiting for message");
            peripheral.poll().unwrap();
            if peripheral.is_connected() && !sent {
                let result = central.send(message).unwrap();
                assert_eq!(result.chunks, 3);
                sent = true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(inbox.borrow()[0].as_ref(), message);

        peripheral.send(b"ack").unwrap();
        while replies.borrow().is_empty() {
            assert!(Instant::now() < deadline, "timed out waiting for reply");
            central.poll().unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(replies.borrow()[0], Bytes::from_static(b"ack"));

        drop(central);
        while peripheral.is_connected() {
            assert!(Instant::now() < deadline, "timed out waiting for disconnect");
            peripheral.poll().unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }

        drop(peripheral);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
