//! Value framing for stream-backed links.
//!
//! A byte stream does not preserve write boundaries, but an attribute link
//! must. Each attribute value is therefore carried with a length prefix:
//!
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ Length (2B)  │ Value            │
//! │ u16 LE       │ (Length bytes)   │
//! └──────────────┴──────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TransportError};

/// Link header: one little-endian `u16` length.
pub const LINK_HEADER_SIZE: usize = 2;

/// Largest value the link header can describe.
pub const MAX_LINK_VALUE_SIZE: usize = u16::MAX as usize;

/// Encode one attribute value into the link format.
pub fn encode_value(value: &[u8], dst: &mut BytesMut) -> Result<()> {
    if value.len() > MAX_LINK_VALUE_SIZE {
        return Err(TransportError::ValueTooLarge {
            size: value.len(),
            max: MAX_LINK_VALUE_SIZE,
        });
    }
    dst.reserve(LINK_HEADER_SIZE + value.len());
    dst.put_u16_le(value.len() as u16);
    dst.put_slice(value);
    Ok(())
}

/// Decode one attribute value from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete value yet.
/// On success, consumes the value bytes from the buffer.
pub fn decode_value(src: &mut BytesMut, max_value_size: usize) -> Result<Option<Bytes>> {
    if src.len() < LINK_HEADER_SIZE {
        return Ok(None);
    }

    let len = u16::from_le_bytes([src[0], src[1]]) as usize;
    if len > max_value_size {
        return Err(TransportError::ValueTooLarge {
            size: len,
            max: max_value_size,
        });
    }

    if src.len() < LINK_HEADER_SIZE + len {
        return Ok(None);
    }

    src.advance(LINK_HEADER_SIZE);
    Ok(Some(src.split_to(len).freeze()))
}
