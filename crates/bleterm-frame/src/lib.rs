//! Separator-delimited message framing over size-limited attribute writes.
//!
//! This is the core of bleterm. A message travels as its bytes followed by
//! one separator byte (`\n` by default):
//! - the [`Fragmenter`] appends the separator and splits the result into
//!   chunks no larger than the attribute's value size, pacing them if asked
//! - the [`Reassembler`] accumulates incoming chunks into a bounded buffer and
//!   emits a message each time it sees the separator
//!
//! Messages must not contain the separator byte.

pub mod config;
pub mod error;
pub mod fragmenter;
pub mod reassembler;

pub use config::{
    FrameConfig, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_RECEIVE_BUFFER_CAPACITY, DEFAULT_SEPARATOR,
    MIN_RECEIVE_BUFFER_CAPACITY,
};
pub use error::{FrameError, Result};
pub use fragmenter::{chunk_count, fragment, Fragmenter, Fragments, Sent};
pub use reassembler::{ReassemblyEvent, ReassemblyStats, Reassembler, ReceiveBuffer};
