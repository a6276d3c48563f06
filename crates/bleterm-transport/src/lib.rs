//! Attribute-write transport abstraction.
//!
//! Models a wireless link that exposes a single read/write/notify attribute
//! with a hard payload ceiling. Every value written in either direction is
//! delivered as one discrete chunk, in order, with its boundaries intact.
//!
//! This is the lowest layer of bleterm. The framing core in `bleterm-frame`
//! and the [`Transport`] consumer in `bleterm-terminal` build on it.
//!
//! Two links are provided:
//! - [`MockLink`]: in-memory, scripted events, recorded writes
//! - [`UdsPeripheral`] and [`UdsCentral`]: both ends of a Unix domain socket
//!   link (Unix only)

pub mod error;
pub mod link;
pub mod mock;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use link::{decode_value, encode_value, LINK_HEADER_SIZE, MAX_LINK_VALUE_SIZE};
pub use mock::MockLink;
pub use traits::{
    Advertisement, Transport, TransportEvent, DEFAULT_CHARACTERISTIC_ID, DEFAULT_LOCAL_NAME,
    DEFAULT_SERVICE_ID, DEFAULT_VALUE_SIZE,
};

#[cfg(unix)]
pub use uds::{UdsCentral, UdsPeripheral};
