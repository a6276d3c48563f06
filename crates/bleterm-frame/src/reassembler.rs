use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::{
    validate_receive_buffer_capacity, FrameConfig, DEFAULT_RECEIVE_BUFFER_CAPACITY,
    DEFAULT_SEPARATOR,
};
use crate::error::Result;

/// Fixed-capacity arena holding the message currently being reassembled.
///
/// The backing allocation is made on the first appended byte and reused
/// afterwards. The last slot is reserved: `len() <= capacity() - 1`.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl ReceiveBuffer {
    /// Create an empty buffer. Nothing is allocated yet.
    pub fn new(capacity: usize) -> Result<Self> {
        validate_receive_buffer_capacity(capacity)?;
        Ok(Self {
            buf: BytesMut::new(),
            capacity,
        })
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held (the write cursor).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True when only the reserved slot is left.
    pub fn is_full(&self) -> bool {
        self.buf.len() + 1 >= self.capacity
    }

    /// Whether the backing allocation has been made.
    pub fn is_allocated(&self) -> bool {
        self.buf.capacity() > 0
    }

    /// Append one byte. Callers check [`ReceiveBuffer::is_full`] first.
    pub fn append(&mut self, byte: u8) {
        if !self.is_allocated() {
            self.buf.reserve(self.capacity);
        }
        self.buf.put_u8(byte);
    }

    /// Copy out the buffered bytes and reset the cursor.
    ///
    /// The returned bytes are independent of the arena, so later appends
    /// never alter them.
    pub fn take(&mut self) -> Bytes {
        let content = Bytes::copy_from_slice(&self.buf);
        self.buf.clear();
        content
    }

    /// Discard the buffered bytes.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// The buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Change capacity. Only called while empty; the old allocation is released.
    fn reallocate(&mut self, capacity: usize) {
        debug_assert!(self.buf.is_empty());
        self.buf = BytesMut::new();
        self.capacity = capacity;
    }
}

/// Outcome of feeding a chunk to the [`Reassembler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyEvent {
    /// A complete message (separator stripped).
    Message(Bytes),
    /// The buffer filled up before a separator arrived. The partial content
    /// was dropped; it is reported for diagnostics only.
    Overflow { discarded: Bytes, capacity: usize },
}

/// Running totals for one reassembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub messages: u64,
    pub overflows: u64,
    pub discarded_bytes: u64,
}

/// Turns a sequence of chunks into separator-terminated messages.
#[derive(Debug)]
pub struct Reassembler {
    buffer: ReceiveBuffer,
    separator: u8,
    staged_capacity: Option<usize>,
    stats: ReassemblyStats,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self {
            buffer: ReceiveBuffer {
                buf: BytesMut::new(),
                capacity: DEFAULT_RECEIVE_BUFFER_CAPACITY,
            },
            separator: DEFAULT_SEPARATOR,
            staged_capacity: None,
            stats: ReassemblyStats::default(),
        }
    }
}

impl Reassembler {
    /// Create a reassembler with an explicit separator and buffer capacity.
    pub fn new(separator: u8, capacity: usize) -> Result<Self> {
        Ok(Self {
            buffer: ReceiveBuffer::new(capacity)?,
            separator,
            staged_capacity: None,
            stats: ReassemblyStats::default(),
        })
    }

    /// Create a reassembler from the receive half of a frame config.
    pub fn from_config(config: &FrameConfig) -> Result<Self> {
        Self::new(config.receive_separator, config.receive_buffer_capacity)
    }

    /// Feed one chunk, byte by byte.
    ///
    /// A chunk may complete several messages, or end one message and start
    /// the next. Partial content carries over to the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ReassemblyEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if byte == self.separator {
                let message = self.buffer.take();
                self.stats.messages += 1;
                debug!(len = message.len(), "message reassembled");
                events.push(ReassemblyEvent::Message(message));
                self.apply_staged_capacity();
                continue;
            }

            if self.buffer.is_full() {
                let capacity = self.buffer.capacity();
                let discarded = self.buffer.take();
                self.stats.overflows += 1;
                self.stats.discarded_bytes += discarded.len() as u64;
                warn!(
                    capacity,
                    discarded = discarded.len(),
                    "receive buffer overflow, partial message dropped"
                );
                events.push(ReassemblyEvent::Overflow {
                    discarded,
                    capacity,
                });
                self.apply_staged_capacity();
            }

            self.buffer.append(byte);
        }

        events
    }

    /// Drop any partial message. Returns the number of bytes dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.reset();
        self.apply_staged_capacity();
        dropped
    }

    /// Change the separator for subsequent bytes.
    pub fn set_separator(&mut self, separator: u8) {
        self.separator = separator;
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    /// Change the buffer capacity.
    ///
    /// Applied at once when no message is in progress; otherwise staged and
    /// applied at the next message boundary, overflow or reset, so a
    /// partially received message is never truncated by a smaller buffer.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        validate_receive_buffer_capacity(capacity)?;
        if self.buffer.is_empty() {
            self.buffer.reallocate(capacity);
            self.staged_capacity = None;
        } else {
            debug!(
                current = self.buffer.capacity(),
                staged = capacity,
                "receive buffer resize deferred until message boundary"
            );
            self.staged_capacity = Some(capacity);
        }
        Ok(())
    }

    /// Capacity currently in effect.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Capacity waiting for the next boundary, if any.
    pub fn staged_capacity(&self) -> Option<usize> {
        self.staged_capacity
    }

    /// Bytes of the message in progress.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> ReassemblyStats {
        self.stats
    }

    fn apply_staged_capacity(&mut self) {
        if let Some(capacity) = self.staged_capacity.take() {
            self.buffer.reallocate(capacity);
        }
    }
}
