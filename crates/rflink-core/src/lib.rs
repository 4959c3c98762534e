//! rflink-core: Core types, packet parser, transport trait and errors for
//! rflink-bridge.
//!
//! Everything here is independent of how the gateway is reached and of how
//! devices are configured, so the serial transport, the command queue and
//! the controller crate can all share it.
//!
//! # Key types
//!
//! - [`InboundPacket`] -- one parsed gateway line
//! - [`Transport`] -- byte-level link to the gateway
//! - [`GatewayEvent`] -- asynchronous state change notifications
//! - [`SetValue`] -- reported versus requested state changes
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod packet;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::GatewayEvent;
pub use packet::InboundPacket;
pub use transport::Transport;
pub use types::*;
