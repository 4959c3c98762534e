//! GatewayBuilder -- fluent builder for constructing [`Gateway`] instances.
//!
//! Separates configuration from construction so that callers can set the
//! serial port and the command pacing before the transport is opened.
//!
//! # Example
//!
//! ```no_run
//! use rflink::GatewayBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> rflink::Result<()> {
//! let gateway = GatewayBuilder::new()
//!     .serial_port("/dev/ttyACM0")
//!     .delay(Duration::from_millis(100))
//!     .repeat(2)
//!     .build()
//!     .await?;
//! gateway.send_command("10;PING;\n")?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use rflink_core::error::{Error, Result};
use rflink_core::transport::Transport;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;

/// Fluent builder for [`Gateway`].
///
/// Every setting has a default: `/dev/ttyACM0` at 57600 baud, no delay,
/// each command written once.
#[derive(Debug, Clone, Default)]
pub struct GatewayBuilder {
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from resolved settings, e.g. a bridge from the platform file.
    pub fn from_config(config: GatewayConfig) -> Self {
        GatewayBuilder { config }
    }

    /// Set the serial port path (e.g. `/dev/ttyACM0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.config.device_path = port.to_string();
        self
    }

    /// Override the default baud rate (57600).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.config.baud_rate = baud;
        self
    }

    /// Set the gap enforced after every write (default: none).
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Set how many times each command is written (default: 1).
    pub fn repeat(mut self, repeat: u32) -> Self {
        self.config.repeat = repeat;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.config.repeat == 0 {
            return Err(Error::InvalidParameter("repeat must be at least 1".into()));
        }
        if self.config.baud_rate == 0 {
            return Err(Error::InvalidParameter("baud rate must be positive".into()));
        }
        Ok(())
    }

    /// Build a [`Gateway`] with a caller-provided transport.
    ///
    /// This is the entry point for testing (pass a `MockTransport` from
    /// `rflink-test-harness`) and for links other than a local serial port.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Gateway> {
        self.validate()?;
        Ok(Gateway::new(transport, self.config))
    }

    /// Open the serial port and build a [`Gateway`] on it.
    pub async fn build(self) -> Result<Gateway> {
        self.validate()?;
        let transport =
            rflink_transport::SerialTransport::open(&self.config.device_path, self.config.baud_rate)
                .await?;
        self.build_with_transport(Box::new(transport)).await
    }
}
