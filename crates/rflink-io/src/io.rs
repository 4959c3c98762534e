//! The command queue: a single IO task that owns the gateway transport.
//!
//! One tokio task owns the transport exclusively. It pulls commands off an
//! unbounded FIFO channel and writes each one `repeat` times, pausing
//! `delay` after every write, before looking at the next command. Between
//! commands, and while pausing, it reads whatever the gateway sends, cuts it
//! into lines, parses packets and hands them to a [`PacketHandler`].
//!
//! Because the task is the only writer, commands never interleave and the
//! gateway never sees two writes closer together than `delay`. Enqueueing
//! never waits for the gateway: the protocol is fire-and-forget and replies
//! are not paired with the commands that caused them.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use rflink_core::error::{Error, Result};
use rflink_core::events::GatewayEvent;
use rflink_core::packet::InboundPacket;
use rflink_core::transport::Transport;

use crate::protocol::{self, DecodeResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the command queue task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Minimum gap after every write, including between repeats.
    pub delay: Duration,
    /// How many times each command is written (at least once).
    pub repeat: u32,
    /// How long a single idle read waits before the loop checks for commands.
    pub poll_interval: Duration,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            delay: Duration::ZERO,
            repeat: 1,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A request sent to the IO task.
pub enum Request {
    /// A fully formatted command, written verbatim.
    Command { line: String },
    /// Stop after everything queued before it; returns the transport.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Receives every packet parsed from the gateway's output.
///
/// Called from the IO task, so a slow handler delays both inbound and
/// outbound traffic. Implementations must not fail: whatever goes wrong in
/// handling one packet has to stay inside the handler.
#[async_trait]
pub trait PacketHandler: Send + Sync + 'static {
    async fn handle(&self, packet: &InboundPacket);
}

/// Handler that ignores every packet, for send-only use and testing.
pub struct NullPacketHandler;

#[async_trait]
impl PacketHandler for NullPacketHandler {
    async fn handle(&self, _packet: &InboundPacket) {}
}

/// Cloneable, non-blocking sender into the command queue.
///
/// Every virtual device gets one at construction time.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Request>,
}

impl CommandQueue {
    /// Append a command to the queue and return immediately.
    ///
    /// Fails only when the IO task has stopped.
    pub fn enqueue(&self, command: impl Into<String>) -> Result<()> {
        let line = command.into();
        trace!(command = %line.trim_end(), "queueing command");
        self.tx
            .send(Request::Command { line })
            .map_err(|_| Error::NotConnected)
    }
}

/// Handle to the IO task. Stored inside the gateway controller.
pub struct GatewayIo {
    queue: CommandQueue,
    /// Cancellation token for immediate shutdown (queued commands are lost).
    pub cancel: CancellationToken,
    /// Join handle for the IO task.
    pub task: JoinHandle<()>,
}

impl GatewayIo {
    /// A sender that can be handed to devices.
    pub fn queue(&self) -> CommandQueue {
        self.queue.clone()
    }

    /// Append a command to the queue and return immediately.
    pub fn enqueue(&self, command: impl Into<String>) -> Result<()> {
        self.queue.enqueue(command)
    }

    /// Finish every command queued so far, stop the task and recover the
    /// transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.queue.tx.send(Request::Shutdown { reply: reply_tx });
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for queueing commands.
pub fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    event_tx: broadcast::Sender<GatewayEvent>,
    handler: Box<dyn PacketHandler>,
) -> GatewayIo {
    let (tx, rx) = mpsc::unbounded_channel::<Request>();
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    let task = tokio::spawn(io_loop(
        transport,
        config,
        event_tx,
        handler,
        rx,
        cancel_clone,
    ));

    GatewayIo {
        queue: CommandQueue { tx },
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Maximum inbound buffer size before reset.
/// Gateway lines are well under 200 bytes; 8192 is generous headroom.
const MAX_BUF: usize = 8192;

/// Upper bound on a single idle sleep when the transport has nothing to read.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// The main IO loop. Runs as a spawned Tokio task.
///
/// `biased` select order:
/// 1. Cancellation
/// 2. Queued requests (commands run to completion, repeats included)
/// 3. Idle inbound reading
///
/// Only the transport read races the other arms. Framing and dispatch run
/// after the select has resolved, so a line taken off the buffer always
/// reaches the handler.
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    event_tx: broadcast::Sender<GatewayEvent>,
    handler: Box<dyn PacketHandler>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    cancel: CancellationToken,
) {
    let mut inbound = BytesMut::with_capacity(512);
    let mut recv_buf = [0u8; 256];

    loop {
        let read = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("command queue task cancelled");
                break;
            }

            req = rx.recv() => {
                match req {
                    Some(Request::Command { line }) => {
                        transmit(
                            &mut *transport, &line, &config, &mut inbound, &*handler, &event_tx,
                        ).await;
                        continue;
                    }
                    Some(Request::Shutdown { reply }) => {
                        debug!("command queue shutdown requested");
                        let _ = event_tx.send(GatewayEvent::Disconnected);
                        let _ = reply.send(transport);
                        return;
                    }
                    None => {
                        debug!("command channel closed, exiting IO task");
                        break;
                    }
                }
            }

            read = transport.receive(&mut recv_buf, config.poll_interval) => read,
        };

        match read {
            Ok(n) if n > 0 => feed(&mut inbound, &recv_buf[..n], &*handler, &event_tx).await,
            Ok(_) | Err(Error::Timeout) => tokio::time::sleep(IDLE_BACKOFF).await,
            Err(e) => {
                trace!(error = %e, "idle read failed");
                tokio::time::sleep(config.poll_interval.max(IDLE_BACKOFF)).await;
            }
        }
    }

    let _ = event_tx.send(GatewayEvent::Disconnected);
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Write one command `repeat` times with `delay` after every write.
///
/// A failed write is reported on the event channel and the rest of that
/// command's repeats are dropped; the queue then moves on.
async fn transmit(
    transport: &mut dyn Transport,
    command: &str,
    config: &IoConfig,
    inbound: &mut BytesMut,
    handler: &dyn PacketHandler,
    event_tx: &broadcast::Sender<GatewayEvent>,
) {
    for attempt in 0..config.repeat.max(1) {
        let result = transport.send(command.as_bytes()).await;
        match &result {
            Ok(()) => {
                debug!(command = %command.trim_end(), attempt, "command written");
                let _ = event_tx.send(GatewayEvent::CommandSent {
                    command: command.to_string(),
                    attempt,
                });
            }
            Err(e) => {
                warn!(command = %command.trim_end(), attempt, error = %e, "command write failed");
                let _ = event_tx.send(GatewayEvent::CommandFailed {
                    command: command.to_string(),
                    error: e.to_string(),
                });
            }
        }

        if !config.delay.is_zero() {
            pause(transport, config, inbound, handler, event_tx).await;
        }

        if result.is_err() {
            return;
        }
    }
}

/// Wait `delay`, still reading and dispatching inbound lines meanwhile.
async fn pause(
    transport: &mut dyn Transport,
    config: &IoConfig,
    inbound: &mut BytesMut,
    handler: &dyn PacketHandler,
    event_tx: &broadcast::Sender<GatewayEvent>,
) {
    let deadline = Instant::now() + config.delay;
    let mut recv_buf = [0u8; 256];

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;

        match transport
            .receive(&mut recv_buf, remaining.min(config.poll_interval))
            .await
        {
            Ok(n) if n > 0 => {
                feed(inbound, &recv_buf[..n], handler, event_tx).await;
            }
            _ => {
                tokio::time::sleep_until(deadline.min(Instant::now() + IDLE_BACKOFF)).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Append freshly read bytes and dispatch every complete line.
async fn feed(
    inbound: &mut BytesMut,
    data: &[u8],
    handler: &dyn PacketHandler,
    event_tx: &broadcast::Sender<GatewayEvent>,
) {
    inbound.extend_from_slice(data);
    if inbound.len() > MAX_BUF {
        warn!(len = inbound.len(), "inbound buffer overflow, resetting");
        inbound.clear();
        return;
    }
    process_lines(inbound, handler, event_tx).await;
}

/// Parse and dispatch every complete line in `buf`, leaving any partial
/// line for the next read.
///
/// Lines that are not packets (banners, `OK` replies, garbage) are dropped
/// here and never reach the handler.
async fn process_lines(
    buf: &mut BytesMut,
    handler: &dyn PacketHandler,
    event_tx: &broadcast::Sender<GatewayEvent>,
) {
    loop {
        match protocol::decode_line(buf) {
            DecodeResult::Line { text, consumed } => {
                buf.advance(consumed);
                match InboundPacket::parse(&text) {
                    Some(packet) => {
                        debug!(line = %text, "packet received");
                        let _ = event_tx.send(GatewayEvent::PacketReceived(packet.clone()));
                        handler.handle(&packet).await;
                    }
                    None => trace!(line = %text, "ignoring non-packet line"),
                }
            }
            DecodeResult::Invalid(consumed) => {
                buf.advance(consumed);
                debug!("discarding non-UTF-8 line");
            }
            DecodeResult::Incomplete => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rflink_test_harness::MockTransport;
    use std::sync::{Arc, Mutex};

    fn config(delay_ms: u64, repeat: u32) -> IoConfig {
        IoConfig {
            delay: Duration::from_millis(delay_ms),
            repeat,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Records every packet it is handed.
    #[derive(Clone, Default)]
    struct RecordingHandler {
        packets: Arc<Mutex<Vec<InboundPacket>>>,
    }

    impl RecordingHandler {
        fn packets(&self) -> Vec<InboundPacket> {
            self.packets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PacketHandler for RecordingHandler {
        async fn handle(&self, packet: &InboundPacket) {
            self.packets.lock().unwrap().push(packet.clone());
        }
    }

    // =======================================================================
    // Handle tests (channel-level, no IO loop)
    // =======================================================================

    #[test]
    fn io_config_defaults() {
        let config = IoConfig::default();
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.repeat, 1);
    }

    #[tokio::test]
    async fn enqueue_after_task_gone_is_not_connected() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let queue = CommandQueue { tx };
        let result = queue.enqueue("10;PING;\n");
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    // =======================================================================
    // Outbound
    // =======================================================================

    #[tokio::test(start_paused = true)]
    async fn command_written_verbatim() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (event_tx, _) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(0, 1),
            event_tx,
            Box::new(NullPacketHandler),
        );

        io.enqueue("10;NewKaku;00cac142;1;ON;\n").unwrap();
        let _ = io.shutdown().await.unwrap();

        assert_eq!(handle.sent_strings(), vec!["10;NewKaku;00cac142;1;ON;\n"]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_with_delay_then_idle() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (event_tx, _) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(100, 2),
            event_tx,
            Box::new(NullPacketHandler),
        );

        io.enqueue("10;P1;A1;0;ON;").unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let sent = handle.sent();
        assert_eq!(sent.len(), 2);
        for frame in &sent {
            assert_eq!(frame.data, b"10;P1;A1;0;ON;");
        }
        assert!(sent[1].at - sent[0].at >= Duration::from_millis(100));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.sent().len(), 2);

        let _ = io.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn commands_never_interleave() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (event_tx, _) = broadcast::channel(64);
        let io = spawn_io_task(
            Box::new(mock),
            config(50, 3),
            event_tx,
            Box::new(NullPacketHandler),
        );

        io.enqueue("A").unwrap();
        io.enqueue("B").unwrap();
        let _ = io.shutdown().await.unwrap();

        let sent = handle.sent();
        let order: Vec<String> = handle.sent_strings();
        assert_eq!(order, vec!["A", "A", "A", "B", "B", "B"]);
        for pair in sent.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(50));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_writes_back_to_back() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (event_tx, _) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(0, 2),
            event_tx,
            Box::new(NullPacketHandler),
        );

        io.enqueue("A").unwrap();
        io.enqueue("B").unwrap();
        let _ = io.shutdown().await.unwrap();

        assert_eq!(handle.sent_strings(), vec!["A", "A", "B", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_one_fifo() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (event_tx, _) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(10, 1),
            event_tx,
            Box::new(NullPacketHandler),
        );

        let first = io.queue();
        let second = io.queue();
        first.enqueue("1").unwrap();
        second.enqueue("2").unwrap();
        first.enqueue("3").unwrap();
        let _ = io.shutdown().await.unwrap();

        assert_eq!(handle.sent_strings(), vec!["1", "2", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_is_reported_and_queue_continues() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.fail_next_sends(1);
        let (event_tx, mut event_rx) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(20, 2),
            event_tx,
            Box::new(NullPacketHandler),
        );

        io.enqueue("BAD").unwrap();
        io.enqueue("GOOD").unwrap();
        let _ = io.shutdown().await.unwrap();

        // The failed command is not retried; the next one goes out in full.
        assert_eq!(handle.sent_strings(), vec!["GOOD", "GOOD"]);

        let mut failed = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            if let GatewayEvent::CommandFailed { command, .. } = event {
                failed.push(command);
            }
        }
        assert_eq!(failed, vec!["BAD".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn command_sent_events_count_repeats() {
        let mock = MockTransport::new();
        let (event_tx, mut event_rx) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(0, 3),
            event_tx,
            Box::new(NullPacketHandler),
        );

        io.enqueue("X").unwrap();
        let _ = io.shutdown().await.unwrap();

        let mut attempts = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            if let GatewayEvent::CommandSent { attempt, .. } = event {
                attempts.push(attempt);
            }
        }
        assert_eq!(attempts, vec![0, 1, 2]);
    }

    // =======================================================================
    // Inbound
    // =======================================================================

    #[tokio::test(start_paused = true)]
    async fn idle_lines_are_parsed_and_dispatched() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.push_inbound(b"20;00;Nodo RadioFrequencyLink - RFLink Gateway V1.1 - R46;\r\n");
        handle.push_inbound(b"20;2D;NewKaku;ID=cac142;SWITCH=1;CMD=ON;\r\n");
        handle.push_inbound(b"20;01;OK;\r\n");

        let recorder = RecordingHandler::default();
        let (event_tx, mut event_rx) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(0, 1),
            event_tx,
            Box::new(recorder.clone()),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        let packets = recorder.packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].address, "cac142");
        assert_eq!(packets[0].command, "CMD=ON");

        match event_rx.try_recv().unwrap() {
            GatewayEvent::PacketReceived(packet) => assert_eq!(packet, packets[0]),
            other => panic!("expected PacketReceived, got {other:?}"),
        }

        let _ = io.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn echo_during_delay_is_dispatched() {
        let mut mock = MockTransport::new();
        mock.respond(
            b"10;NewKaku;cac142;1;ON;\n",
            b"20;05;NewKaku;ID=cac142;SWITCH=1;CMD=ON;\r\n",
        );

        let recorder = RecordingHandler::default();
        let (event_tx, _) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(300, 1),
            event_tx,
            Box::new(recorder.clone()),
        );

        io.enqueue("10;NewKaku;cac142;1;ON;\n").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Still inside the 300ms pause, yet the echo has been handled.
        assert_eq!(recorder.packets().len(), 1);

        let _ = io.shutdown().await;
    }

    #[tokio::test]
    async fn partial_line_waits_for_rest() {
        let recorder = RecordingHandler::default();
        let (event_tx, _) = broadcast::channel(16);
        let mut buf = BytesMut::new();

        feed(&mut buf, b"20;2D;NewKaku;ID=ca", &recorder, &event_tx).await;
        assert!(recorder.packets().is_empty());

        feed(&mut buf, b"c142;SWITCH=1;CMD=OFF;\r\n20;2E", &recorder, &event_tx).await;
        let packets = recorder.packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].address, "cac142");
        assert_eq!(&buf[..], b"20;2E");
    }

    #[tokio::test]
    async fn non_utf8_line_is_skipped() {
        let recorder = RecordingHandler::default();
        let (event_tx, _) = broadcast::channel(16);
        let mut buf = BytesMut::new();

        feed(
            &mut buf,
            b"\xff\xfe;;;;;\r\n20;01;P;ID=1;SWITCH=2;CMD=ON;\r\n",
            &recorder,
            &event_tx,
        )
        .await;

        let packets = recorder.packets();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].channel, "2");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn buffer_overflow_resets() {
        let recorder = RecordingHandler::default();
        let (event_tx, _) = broadcast::channel(16);
        let mut buf = BytesMut::new();

        let garbage = vec![b'A'; MAX_BUF + 1];
        feed(&mut buf, &garbage, &recorder, &event_tx).await;
        assert!(buf.is_empty());

        feed(&mut buf, b"20;01;P;ID=1;SWITCH=2;CMD=ON;\n", &recorder, &event_tx).await;
        assert_eq!(recorder.packets().len(), 1);
    }

    // =======================================================================
    // Shutdown
    // =======================================================================

    #[tokio::test(start_paused = true)]
    async fn shutdown_recovers_transport() {
        let mock = MockTransport::new();
        let (event_tx, mut event_rx) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(0, 1),
            event_tx,
            Box::new(NullPacketHandler),
        );

        let transport = io.shutdown().await.unwrap();
        assert!(transport.is_connected());
        assert!(matches!(
            event_rx.try_recv(),
            Ok(GatewayEvent::Disconnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_task() {
        let mock = MockTransport::new();
        let (event_tx, _) = broadcast::channel(16);
        let io = spawn_io_task(
            Box::new(mock),
            config(0, 1),
            event_tx,
            Box::new(NullPacketHandler),
        );

        let queue = io.queue();
        io.cancel.cancel();
        io.task.await.unwrap();

        assert!(matches!(queue.enqueue("X"), Err(Error::NotConnected)));
    }
}
