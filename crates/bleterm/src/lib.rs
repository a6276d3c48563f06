//! Line-oriented message terminal over single-attribute wireless links.
//!
//! bleterm carries whole text messages over a link that only moves small
//! fixed-size values: messages are cut into chunks on send and stitched back
//! together on receive, with a one-byte separator marking each boundary.
//!
//! # Crate Structure
//!
//! - [`transport`]: link abstraction plus mock and Unix socket links
//! - [`frame`]: receive reassembly and send fragmentation
//! - [`terminal`]: connection state, set-once identity and the `Terminal`

/// Re-export transport types.
pub mod transport {
    pub use bleterm_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bleterm_frame::*;
}

/// Re-export terminal types.
pub mod terminal {
    pub use bleterm_terminal::*;
}
