use std::time::Duration;

use crate::error::{FrameError, Result};

/// Default separator byte for both directions: newline.
pub const DEFAULT_SEPARATOR: u8 = b'\n';

/// Default maximum chunk size: the common negotiated attribute payload.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 20;

/// Default receive buffer capacity in bytes.
pub const DEFAULT_RECEIVE_BUFFER_CAPACITY: usize = 128;

/// Smallest usable receive buffer: one payload byte plus the reserved slot.
pub const MIN_RECEIVE_BUFFER_CAPACITY: usize = 2;

/// Framing tunables.
///
/// Every field is a plain overwrite; changes apply to operations started
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Byte appended to every outgoing message.
    pub send_separator: u8,
    /// Byte that terminates every incoming message.
    pub receive_separator: u8,
    /// Largest chunk handed to the transport. Mirrors the attribute value size.
    pub max_chunk_size: usize,
    /// Receive buffer size. The last slot is reserved, so the longest
    /// deliverable message is one byte shorter.
    pub receive_buffer_capacity: usize,
    /// Pause between consecutive chunks of one message.
    pub inter_chunk_delay: Duration,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            send_separator: DEFAULT_SEPARATOR,
            receive_separator: DEFAULT_SEPARATOR,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            receive_buffer_capacity: DEFAULT_RECEIVE_BUFFER_CAPACITY,
            inter_chunk_delay: Duration::ZERO,
        }
    }
}

impl FrameConfig {
    /// Check every tunable is in range.
    pub fn validate(&self) -> Result<()> {
        validate_max_chunk_size(self.max_chunk_size)?;
        validate_receive_buffer_capacity(self.receive_buffer_capacity)
    }

    /// Longest message the receive side can deliver.
    pub fn max_receivable_message(&self) -> usize {
        self.receive_buffer_capacity.saturating_sub(1)
    }
}

pub(crate) fn validate_max_chunk_size(max_chunk_size: usize) -> Result<()> {
    if max_chunk_size == 0 {
        return Err(FrameError::InvalidConfig(
            "max chunk size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_receive_buffer_capacity(capacity: usize) -> Result<()> {
    if capacity < MIN_RECEIVE_BUFFER_CAPACITY {
        return Err(FrameError::InvalidConfig(format!(
            "receive buffer capacity must be at least {MIN_RECEIVE_BUFFER_CAPACITY} (got {capacity})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_attribute_terminal() {
        let config = FrameConfig::default();
        assert_eq!(config.send_separator, b'\n');
        assert_eq!(config.receive_separator, b'\n');
        assert_eq!(config.max_chunk_size, 20);
        assert_eq!(config.receive_buffer_capacity, 128);
        assert!(config.inter_chunk_delay.is_zero());
        assert!(config.validate().is_ok());
        assert_eq!(config.max_receivable_message(), 127);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let config = FrameConfig {
            max_chunk_size: 0,
            ..FrameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FrameError::InvalidConfig(_))
        ));
    }

    #[test]
    fn tiny_receive_buffer_rejected() {
        for capacity in [0, 1] {
            let config = FrameConfig {
                receive_buffer_capacity: capacity,
                ..FrameConfig::default()
            };
            assert!(config.validate().is_err(), "capacity {capacity}");
        }

        let config = FrameConfig {
            receive_buffer_capacity: MIN_RECEIVE_BUFFER_CAPACITY,
            ..FrameConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
