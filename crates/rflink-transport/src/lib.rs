//! Transport implementations for rflink-bridge.
//!
//! - [`SerialTransport`]: USB virtual COM port to an RFLink gateway
//!
//! Other links (ser2net, a network-attached gateway) only need to implement
//! [`Transport`](rflink_core::Transport).

pub mod serial;

pub use serial::{FlowControl, SerialConfig, SerialTransport, DEFAULT_BAUD_RATE};
