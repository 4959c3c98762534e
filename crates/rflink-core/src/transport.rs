//! Transport trait for gateway communication.
//!
//! The [`Transport`] trait abstracts over the byte link to an RFLink gateway.
//! The serial implementation lives in `rflink-transport`; `MockTransport` in
//! `rflink-test-harness` stands in for the gateway in tests.
//!
//! Line framing is not a transport concern. The command queue task in
//! `rflink-io` reads raw bytes and splits them into protocol lines itself.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write raw bytes to the gateway.
    ///
    /// Returns once every byte has been handed to the underlying link.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Read whatever bytes are available into `buf`.
    ///
    /// Waits at most `timeout` and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) when nothing arrived.
    /// The timeout is a polling interval for the caller, not a failure of
    /// the link.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the link. Later calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether the link is currently open.
    fn is_connected(&self) -> bool;
}
