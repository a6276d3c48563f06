use std::time::Duration;

use bleterm_transport::Transport;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::config::{
    validate_max_chunk_size, FrameConfig, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_SEPARATOR,
};
use crate::error::Result;

/// Outcome of a successful send: every chunk was handed to the transport.
///
/// There is no acknowledgment from the peer behind this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    /// Number of transport writes issued.
    pub chunks: usize,
    /// Bytes written, separator included.
    pub bytes: usize,
}

/// Number of chunks a message of `message_len` bytes needs.
///
/// The separator always takes one byte, so a message that exactly fills its
/// last chunk gets one extra chunk holding only the separator.
pub fn chunk_count(message_len: usize, max_chunk_size: usize) -> usize {
    (message_len + 1).div_ceil(max_chunk_size.max(1))
}

/// Iterator over the chunks of one framed message.
///
/// The framed message is `message ++ [separator]`, cut every
/// `max_chunk_size` bytes. Only the last chunk is shorter, and it always ends
/// with the separator.
#[derive(Debug, Clone)]
pub struct Fragments<'a> {
    message: &'a [u8],
    separator: u8,
    max_chunk_size: usize,
    offset: usize,
}

impl Fragments<'_> {
    fn total(&self) -> usize {
        self.message.len() + 1
    }
}

impl Iterator for Fragments<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let total = self.total();
        if self.offset >= total {
            return None;
        }

        let len = self.max_chunk_size.min(total - self.offset);
        let end = self.offset + len;
        let mut chunk = BytesMut::with_capacity(len);
        if end == total {
            chunk.put_slice(&self.message[self.offset..total - 1]);
            chunk.put_u8(self.separator);
        } else {
            chunk.put_slice(&self.message[self.offset..end]);
        }
        self.offset = end;
        Some(chunk.freeze())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total().saturating_sub(self.offset);
        let remaining = left.div_ceil(self.max_chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Fragments<'_> {}

/// Plan the chunks for `message` without writing anything.
pub fn fragment(message: &[u8], separator: u8, max_chunk_size: usize) -> Fragments<'_> {
    Fragments {
        message,
        separator,
        max_chunk_size: max_chunk_size.max(1),
        offset: 0,
    }
}

/// Splits outgoing messages into transport-sized chunks.
#[derive(Debug, Clone)]
pub struct Fragmenter {
    separator: u8,
    max_chunk_size: usize,
    inter_chunk_delay: Duration,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            inter_chunk_delay: Duration::ZERO,
        }
    }
}

impl Fragmenter {
    /// Create a fragmenter with explicit settings.
    pub fn new(separator: u8, max_chunk_size: usize, inter_chunk_delay: Duration) -> Result<Self> {
        validate_max_chunk_size(max_chunk_size)?;
        Ok(Self {
            separator,
            max_chunk_size,
            inter_chunk_delay,
        })
    }

    /// Create a fragmenter from the send half of a frame config.
    pub fn from_config(config: &FrameConfig) -> Result<Self> {
        Self::new(
            config.send_separator,
            config.max_chunk_size,
            config.inter_chunk_delay,
        )
    }

    pub fn set_separator(&mut self, separator: u8) {
        self.separator = separator;
    }

    pub fn set_max_chunk_size(&mut self, max_chunk_size: usize) -> Result<()> {
        validate_max_chunk_size(max_chunk_size)?;
        self.max_chunk_size = max_chunk_size;
        Ok(())
    }

    pub fn set_inter_chunk_delay(&mut self, delay: Duration) {
        self.inter_chunk_delay = delay;
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn inter_chunk_delay(&self) -> Duration {
        self.inter_chunk_delay
    }

    /// The chunks `message` would be sent as.
    pub fn plan<'a>(&self, message: &'a [u8]) -> Fragments<'a> {
        fragment(message, self.separator, self.max_chunk_size)
    }

    /// Write `message` and its separator through `transport` (blocking).
    ///
    /// Sleeps `inter_chunk_delay` between chunks, never after the last one.
    /// A failed write aborts the send; chunks already written stay written.
    pub fn send<T: Transport + ?Sized>(&self, transport: &mut T, message: &[u8]) -> Result<Sent> {
        if message.contains(&self.separator) {
            debug!(
                separator = self.separator,
                "message contains the send separator; the peer will split it"
            );
        }

        let chunks = self.plan(message);
        let count = chunks.len();
        for (index, chunk) in chunks.enumerate() {
            transport.write_value(&chunk)?;
            trace!(index, count, len = chunk.len(), "chunk written");

            if index + 1 < count && !self.inter_chunk_delay.is_zero() {
                std::thread::sleep(self.inter_chunk_delay);
            }
        }

        Ok(Sent {
            chunks: count,
            bytes: message.len() + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use bleterm_transport::{Advertisement, MockLink, TransportError};

    use super::*;
    use crate::error::FrameError;
    use crate::reassembler::{ReassemblyEvent, Reassembler};

    fn connected_link(value_size: usize) -> MockLink {
        let mut link = MockLink::new();
        link.begin(&Advertisement {
            value_size,
            ..Advertisement::default()
        })
        .unwrap();
        link.connect("central");
        link.poll(&mut |_| {}).unwrap();
        link
    }

    fn sample_message(len: usize) -> Vec<u8> {
        (0..len).map(|i| b'a' + (i % 26) as u8).collect()
    }

    #[test]
    fn short_message_is_one_chunk() {
        let chunks: Vec<Bytes> = fragment(b"hello", b'\n', 20).collect();
        assert_eq!(chunks, vec![Bytes::from_static(b"hello\n")]);
    }

    #[test]
    fn empty_message_sends_only_separator() {
        let chunks: Vec<Bytes> = fragment(b"", b'\n', 20).collect();
        assert_eq!(chunks, vec![Bytes::from_static(b"\n")]);
        assert_eq!(chunk_count(0, 20), 1);
    }

    #[test]
    fn long_message_splits_on_chunk_size() {
        let chunks: Vec<Bytes> = fragment(b"abcdefghij", b'\n', 4).collect();
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"abcd"),
                Bytes::from_static(b"efgh"),
                Bytes::from_static(b"ij\n"),
            ]
        );
    }

    #[test]
    fn exact_multiple_gets_separator_only_chunk() {
        let message = sample_message(20);
        let chunks: Vec<Bytes> = fragment(&message, b'\n', 20).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref(), message.as_slice());
        assert_eq!(chunks[1].as_ref(), b"\n");
        assert_eq!(chunk_count(20, 20), 2);
    }

    #[test]
    fn one_short_of_chunk_size_fits_with_separator() {
        let message = sample_message(19);
        let chunks: Vec<Bytes> = fragment(&message, b'\n', 20).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[0].last(), Some(&b'\n'));
    }

    #[test]
    fn size_hint_is_exact() {
        let mut chunks = fragment(b"abcdefghij", b'\n', 4);
        assert_eq!(chunks.len(), 3);
        chunks.next();
        assert_eq!(chunks.len(), 2);
        chunks.next();
        chunks.next();
        assert_eq!(chunks.len(), 0);
        assert!(chunks.next().is_none());
    }

    #[test]
    fn send_writes_every_chunk() {
        let mut link = connected_link(20);
        let fragmenter = Fragmenter::new(b'\n', 20, Duration::ZERO).unwrap();

        let message = sample_message(45);
        let sent = fragmenter.send(&mut link, &message).unwrap();
        assert_eq!(
            sent,
            Sent {
                chunks: 3,
                bytes: 46
            }
        );

        let written = link.take_outbound();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|chunk| chunk.len() <= 20));
        assert_eq!(written[2].as_ref().last(), Some(&b'\n'));
    }

    #[test]
    fn send_uses_configured_separator() {
        let mut link = connected_link(20);
        let config = FrameConfig {
            send_separator: b'\r',
            ..FrameConfig::default()
        };
        let fragmenter = Fragmenter::from_config(&config).unwrap();

        fragmenter.send(&mut link, b"ping").unwrap();
        assert_eq!(link.take_outbound(), vec![Bytes::from_static(b"ping\r")]);
    }

    #[test]
    fn send_propagates_transport_failure() {
        let mut link = connected_link(4);
        let fragmenter = Fragmenter::new(b'\n', 8, Duration::ZERO).unwrap();

        let err = fragmenter.send(&mut link, b"abcdefgh").unwrap_err();
        assert!(matches!(
            err,
            FrameError::Transport(TransportError::ValueTooLarge { size: 8, max: 4 })
        ));
        assert!(link.outbound().is_empty());
    }

    #[test]
    fn paced_chunks_are_spaced_by_delay() {
        let delay = Duration::from_millis(30);
        let mut link = connected_link(4);
        let fragmenter = Fragmenter::new(b'\n', 4, delay).unwrap();

        let sent = fragmenter.send(&mut link, b"abcdefghij").unwrap();
        let finished = Instant::now();
        assert_eq!(sent.chunks, 3);

        let writes: Vec<Instant> = link.outbound().iter().map(|(at, _)| *at).collect();
        assert_eq!(writes.len(), 3);
        for pair in writes.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= delay);
        }
        assert!(finished.duration_since(writes[2]) < delay);
    }

    #[test]
    fn zero_delay_does_not_sleep() {
        let mut link = connected_link(1);
        let fragmenter = Fragmenter::new(b'\n', 1, Duration::ZERO).unwrap();

        let started = Instant::now();
        fragmenter.send(&mut link, &sample_message(50)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(link.outbound().len(), 51);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(Fragmenter::new(b'\n', 0, Duration::ZERO).is_err());
        let mut fragmenter = Fragmenter::new(b'\n', 20, Duration::ZERO).unwrap();
        assert!(fragmenter.set_max_chunk_size(0).is_err());
        assert_eq!(fragmenter.max_chunk_size(), 20);
    }

    #[test]
    fn roundtrip_across_chunk_sizes() {
        for max in [1usize, 2, 20, 512] {
            for len in [0, 1, max - 1, max, max + 1, 10 * max] {
                let message = sample_message(len);
                let mut reassembler = Reassembler::new(b'\n', 10 * max + 2).unwrap();

                let mut delivered = Vec::new();
                for chunk in fragment(&message, b'\n', max) {
                    assert!(chunk.len() <= max);
                    delivered.extend(reassembler.push(&chunk));
                }

                assert_eq!(
                    delivered,
                    vec![ReassemblyEvent::Message(Bytes::from(message.clone()))],
                    "max_chunk_size={max} len={len}"
                );
            }
        }
    }
}
