//! Error types for rflink-bridge.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport failures, configuration
//! problems, and lookups of unregistered devices are all captured here.
//!
//! Inbound protocol noise has no variant: short or garbled lines from the
//! gateway are dropped by the parser and never surface as errors.

/// The error type for all rflink-bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open or write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (a mock transport saw unexpected bytes, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for data from the gateway.
    #[error("timeout waiting for data")]
    Timeout,

    /// An invalid parameter was passed to a builder or setter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A channel names a capability type outside the supported set.
    ///
    /// Raised at registration time, never during packet dispatch.
    #[error("unknown capability type: {0}")]
    UnknownCapability(String),

    /// The platform configuration is unusable (no bridges, no devices).
    #[error("configuration error: {0}")]
    Config(String),

    /// No device with this id is registered on the gateway.
    #[error("unknown device: {0}")]
    UnknownDevice(usize),

    /// The device has no channel at this index.
    #[error("unknown channel {channel} on device {device}")]
    UnknownChannel {
        /// Device the lookup was made on.
        device: usize,
        /// The channel index that was requested.
        channel: usize,
    },

    /// The command queue task is gone, or the transport was closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the gateway was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for the expected schema.
    #[error("invalid configuration file: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
