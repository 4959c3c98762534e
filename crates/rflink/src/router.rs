//! Dispatch router: the registry of virtual devices and packet fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use rflink_core::error::{Error, Result};
use rflink_core::packet::InboundPacket;
use rflink_core::types::DeviceId;
use rflink_io::PacketHandler;

use crate::device::VirtualDevice;

/// Registered devices in registration order.
///
/// Duplicate `(protocol, address)` pairs are allowed; every one of them is
/// offered each packet.
#[derive(Debug, Default)]
pub struct Router {
    devices: Vec<VirtualDevice>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next registered device will get.
    pub fn next_id(&self) -> DeviceId {
        DeviceId::from_index(self.devices.len())
    }

    /// Add a device. Returns its id.
    pub fn register(&mut self, device: VirtualDevice) -> DeviceId {
        let id = device.id();
        self.devices.push(device);
        id
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn devices(&self) -> &[VirtualDevice] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Result<&VirtualDevice> {
        self.devices
            .get(id.index())
            .ok_or(Error::UnknownDevice(id.index()))
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Result<&mut VirtualDevice> {
        self.devices
            .get_mut(id.index())
            .ok_or(Error::UnknownDevice(id.index()))
    }

    /// Offer a packet to every device in registration order. Returns how
    /// many channels reacted across all devices.
    pub fn dispatch(&mut self, packet: &InboundPacket) -> usize {
        let handled: usize = self
            .devices
            .iter_mut()
            .map(|device| device.handle_packet(packet))
            .sum();
        if handled == 0 {
            trace!(
                protocol = %packet.protocol,
                address = %packet.address,
                channel = %packet.channel,
                "no channel matched packet"
            );
        }
        handled
    }
}

/// Feeds packets from the command queue task into a shared router.
pub(crate) struct RouterHandler {
    router: Arc<Mutex<Router>>,
}

impl RouterHandler {
    pub(crate) fn new(router: Arc<Mutex<Router>>) -> Self {
        RouterHandler { router }
    }
}

#[async_trait]
impl PacketHandler for RouterHandler {
    async fn handle(&self, packet: &InboundPacket) {
        self.router.lock().await.dispatch(packet);
    }
}
