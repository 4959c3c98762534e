//! Command queue IO task for RFLink gateways.
//!
//! One tokio task owns the transport exclusively. It writes queued commands
//! with the configured repeat count and inter-command delay, and between
//! writes it frames inbound lines, parses packets and hands them on.
//!
//! # Architecture
//!
//! - [`protocol`] -- line framing and command encoding
//! - [`io`] -- IO task types, spawn, and the select loop

pub mod io;
pub mod protocol;

pub use io::{spawn_io_task, CommandQueue, GatewayIo, IoConfig, NullPacketHandler, PacketHandler};
