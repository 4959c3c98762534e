//! Mock transport for deterministic testing of the command queue and router.
//!
//! [`MockTransport`] implements the [`Transport`] trait in memory. It records
//! every write with a timestamp, plays back injected gateway lines, can echo
//! a scripted reply when a given command is written, and can fail writes on
//! demand.
//!
//! The transport itself is moved into the command queue task, so tests keep a
//! [`MockHandle`] to inspect and drive it from the outside.
//!
//! # Example
//!
//! ```
//! use rflink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! let handle = mock.handle();
//! // When this command is written, the gateway answers `20;01;OK;`.
//! mock.respond(b"10;NewKaku;cac142;1;ON;\n", b"20;01;OK;\r\n");
//! // An unsolicited packet waiting to be read.
//! handle.push_inbound(b"20;02;NewKaku;ID=cac142;SWITCH=1;CMD=OFF;\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use rflink_core::error::{Error, Result};
use rflink_core::transport::Transport;

/// A scripted reply: when `request` is written, `response` becomes readable.
#[derive(Debug, Clone)]
struct Reply {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// One successful write seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// The bytes written.
    pub data: Vec<u8>,
    /// When the write happened (tokio clock, so paused-time tests work).
    pub at: Instant,
}

#[derive(Debug)]
struct MockState {
    /// Ordered scripted replies; only the front one is matched.
    replies: VecDeque<Reply>,
    /// Bytes waiting to be returned by `receive()`.
    inbound: VecDeque<u8>,
    /// Log of every successful write.
    sent_log: Vec<SentFrame>,
    /// Number of upcoming writes that should fail.
    failing_sends: usize,
    connected: bool,
}

/// A mock [`Transport`] standing in for an RFLink gateway.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Mutex<MockState>>,
}

/// Test-side handle onto a [`MockTransport`] that has been moved elsewhere.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<MockState>>,
}

fn lock(shared: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Mutex::new(MockState {
                replies: VecDeque::new(),
                inbound: VecDeque::new(),
                sent_log: Vec::new(),
                failing_sends: 0,
                connected: true,
            })),
        }
    }

    /// Return a handle that stays usable after the transport is boxed and
    /// handed to the command queue.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Script a reply.
    ///
    /// Replies are matched in the order they were added. When the next
    /// write equals `request`, `response` is queued for reading. Writes that
    /// don't match the front reply are accepted and leave it in place: the
    /// gateway protocol has no request/response pairing to enforce.
    pub fn respond(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.shared).replies.push_back(Reply {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Queue bytes for the next `receive()` calls, as if the gateway sent them.
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.shared).inbound.extend(data.iter().copied());
    }

    /// Every successful write, in order.
    pub fn sent(&self) -> Vec<SentFrame> {
        lock(&self.shared).sent_log.clone()
    }

    /// The payload of every successful write, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.shared)
            .sent_log
            .iter()
            .map(|frame| frame.data.clone())
            .collect()
    }

    /// Payloads of every successful write, lossily decoded as text.
    pub fn sent_strings(&self) -> Vec<String> {
        lock(&self.shared)
            .sent_log
            .iter()
            .map(|frame| String::from_utf8_lossy(&frame.data).into_owned())
            .collect()
    }

    /// Make the next `n` writes fail with a transport error.
    pub fn fail_next_sends(&self, n: usize) {
        lock(&self.shared).failing_sends = n;
    }

    /// Number of scripted replies not yet triggered.
    pub fn remaining_replies(&self) -> usize {
        lock(&self.shared).replies.len()
    }

    /// Number of injected bytes not yet read.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.shared).inbound.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When `false`, `send()` and `receive()` return [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        lock(&self.shared).connected = connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = lock(&self.shared);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(Error::Transport("injected write failure".into()));
        }

        state.sent_log.push(SentFrame {
            data: data.to_vec(),
            at: Instant::now(),
        });

        if state
            .replies
            .front()
            .is_some_and(|reply| reply.request == data)
        {
            if let Some(reply) = state.replies.pop_front() {
                state.inbound.extend(reply.response);
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = lock(&self.shared);
        if !state.connected {
            return Err(Error::NotConnected);
        }

        if state.inbound.is_empty() {
            return Err(Error::Timeout);
        }

        let n = state.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.shared);
        state.connected = false;
        state.inbound.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_writes() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        mock.send(b"10;A;1;0;ON;\n").await.unwrap();
        mock.send(b"10;A;1;0;OFF;\n").await.unwrap();

        assert_eq!(
            handle.sent_strings(),
            vec!["10;A;1;0;ON;\n".to_string(), "10;A;1;0;OFF;\n".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mock_timestamps_writes_on_tokio_clock() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        mock.send(b"a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        mock.send(b"b").await.unwrap();

        let sent = handle.sent();
        assert_eq!(sent[1].at - sent[0].at, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn mock_scripted_reply_becomes_readable() {
        let mut mock = MockTransport::new();
        mock.respond(b"10;PING;\n", b"20;99;PONG;\r\n");

        mock.send(b"10;PING;\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"20;99;PONG;\r\n");
    }

    #[tokio::test]
    async fn mock_unmatched_write_keeps_reply() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.respond(b"expected", b"reply");

        mock.send(b"something else").await.unwrap();
        assert_eq!(handle.remaining_replies(), 1);
        assert_eq!(handle.pending_inbound(), 0);
    }

    #[tokio::test]
    async fn mock_injected_inbound_is_read_in_chunks() {
        let mut mock = MockTransport::new();
        mock.handle().push_inbound(b"abcdef");

        let mut buf = [0u8; 4];
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"abcd");
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"ef");
    }

    #[tokio::test]
    async fn mock_receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn mock_fails_requested_writes() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        handle.fail_next_sends(1);

        assert!(matches!(
            mock.send(b"first").await,
            Err(Error::Transport(_))
        ));
        mock.send(b"second").await.unwrap();
        assert_eq!(handle.sent_data(), vec![b"second".to_vec()]);
    }

    #[tokio::test]
    async fn mock_disconnect() {
        let mut mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.close().await.unwrap();
        assert!(!mock.is_connected());

        let result = mock.send(b"x").await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn mock_set_connected_from_handle() {
        let mut mock = MockTransport::new();
        mock.handle().set_connected(false);

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
