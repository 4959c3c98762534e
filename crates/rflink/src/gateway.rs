//! Gateway -- the controller for one RFLink gateway.
//!
//! A `Gateway` owns the command queue task (and through it the transport),
//! the router with every registered device, and the event channel. It is
//! built with [`GatewayBuilder`](crate::builder::GatewayBuilder).
//!
//! Inbound packets flow transport → command queue task → router → devices.
//! Requested state changes flow device → command queue → transport.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use rflink_core::error::Result;
use rflink_core::events::GatewayEvent;
use rflink_core::packet::InboundPacket;
use rflink_core::transport::Transport;
use rflink_core::types::{DeviceId, SetValue};
use rflink_io::{spawn_io_task, CommandQueue, GatewayIo};

use crate::config::GatewayConfig;
use crate::device::{Channel, DeviceInfo, DeviceSpec, VirtualDevice};
use crate::router::{Router, RouterHandler};

/// Capacity of the event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// A running controller for one gateway.
pub struct Gateway {
    config: GatewayConfig,
    io: GatewayIo,
    router: Arc<Mutex<Router>>,
    event_tx: broadcast::Sender<GatewayEvent>,
}

impl Gateway {
    /// Start the command queue task on `transport`.
    ///
    /// Called by [`GatewayBuilder`](crate::builder::GatewayBuilder); callers
    /// should use the builder API instead.
    pub(crate) fn new(transport: Box<dyn Transport>, config: GatewayConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let router = Arc::new(Mutex::new(Router::new()));

        let io = spawn_io_task(
            transport,
            config.io_config(),
            event_tx.clone(),
            Box::new(RouterHandler::new(Arc::clone(&router))),
        );

        info!(
            port = %config.device_path,
            delay_ms = config.delay.as_millis() as u64,
            repeat = config.repeat,
            "gateway started"
        );

        Gateway {
            config,
            io,
            router,
            event_tx,
        }
    }

    /// The settings this gateway runs with.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// A sender into this gateway's command queue.
    pub fn queue(&self) -> CommandQueue {
        self.io.queue()
    }

    /// Subscribe to packets, state changes and command outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.event_tx.subscribe()
    }

    /// Create a virtual device and start routing packets to it.
    ///
    /// The device receives this gateway's command queue. Fails, without
    /// registering anything, if a channel is invalid.
    pub async fn register(&self, spec: DeviceSpec) -> Result<DeviceId> {
        let mut router = self.router.lock().await;
        let device = VirtualDevice::new(
            router.next_id(),
            spec,
            self.io.queue(),
            self.event_tx.clone(),
        )?;
        Ok(router.register(device))
    }

    /// Queue a raw, fully formatted command. Returns immediately.
    pub fn send_command(&self, command: impl Into<String>) -> Result<()> {
        self.io.enqueue(command)
    }

    /// Set a switch-like channel on or off.
    pub async fn set_on(&self, device: DeviceId, channel: usize, value: SetValue<bool>) -> Result<()> {
        debug!(%device, channel, ?value, "set on");
        self.router
            .lock()
            .await
            .device_mut(device)?
            .set_on(channel, value)
    }

    /// Set the brightness (0-100) of a dimmable channel.
    pub async fn set_brightness(
        &self,
        device: DeviceId,
        channel: usize,
        value: SetValue<u8>,
    ) -> Result<()> {
        debug!(%device, channel, ?value, "set brightness");
        self.router
            .lock()
            .await
            .device_mut(device)?
            .set_brightness(channel, value)
    }

    /// Snapshot of one channel's state.
    pub async fn channel_state(&self, device: DeviceId, channel: usize) -> Result<Channel> {
        self.router
            .lock()
            .await
            .device(device)?
            .channel(channel)
            .cloned()
    }

    /// Identification of a registered device.
    pub async fn device_info(&self, device: DeviceId) -> Result<DeviceInfo> {
        Ok(self.router.lock().await.device(device)?.info().clone())
    }

    /// Number of registered devices.
    pub async fn device_count(&self) -> usize {
        self.router.lock().await.len()
    }

    /// Route a packet as if the gateway had sent it. Returns how many
    /// channels reacted.
    pub async fn dispatch(&self, packet: &InboundPacket) -> usize {
        let _ = self
            .event_tx
            .send(GatewayEvent::PacketReceived(packet.clone()));
        self.router.lock().await.dispatch(packet)
    }

    /// Write every command queued so far, stop the task and return the
    /// transport.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        info!(port = %self.config.device_path, "gateway shutting down");
        self.io.shutdown().await
    }
}
