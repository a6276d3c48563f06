//! Message terminal over a single attribute link.
//!
//! This is the "just works" layer. Start a [`Terminal`] on a transport,
//! register handlers, call [`Terminal::poll`] once per application tick, and
//! [`Terminal::send`] whole messages while a peer is connected.

pub mod connection;
pub mod error;
pub mod identity;
pub mod terminal;

pub use connection::ConnectionState;
pub use error::{Result, TerminalError};
pub use identity::{Identity, IdentityField, SetOnce};
pub use terminal::{
    ConnectHandler, DisconnectHandler, ReceiveHandler, Terminal, TerminalConfig,
};
