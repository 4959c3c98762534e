//! Virtual devices: one RF remote or receiver, addressed by
//! `(protocol, address)`, with one or more channels.
//!
//! A device is built from a [`DeviceSpec`] and the gateway's
//! [`CommandQueue`], which it uses to transmit requested state changes.
//! Inbound packets reach it through the router.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use rflink_core::error::{Error, Result};
use rflink_core::events::GatewayEvent;
use rflink_core::packet::InboundPacket;
use rflink_core::types::{CapabilityKind, DeviceId, SetValue, Source};
use rflink_io::protocol;
use rflink_io::CommandQueue;

use crate::capability::{Capability, Effect, Route};

/// Manufacturer reported for every virtual device.
pub const MANUFACTURER: &str = "RFLink";

/// Reserved channel name matched by gateway-wide `ALLON`/`ALLOFF`.
pub const BROADCAST_CHANNEL: &str = "all";

// ---------------------------------------------------------------------------
// Channel ids
// ---------------------------------------------------------------------------

/// A channel id as written in the configuration.
///
/// Numbers compare numerically against the gateway's channel field, so `1`
/// matches both `1` and `01`. Strings compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    Number(u64),
    Name(String),
}

impl ChannelId {
    /// Whether an inbound channel field addresses this channel.
    pub fn matches(&self, inbound: &str) -> bool {
        match self {
            ChannelId::Number(n) => inbound.trim().parse::<u64>().is_ok_and(|v| v == *n),
            ChannelId::Name(name) => name == inbound,
        }
    }

    /// Whether this is the reserved broadcast channel.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, ChannelId::Name(name) if name == BROADCAST_CHANNEL)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Number(n) => write!(f, "{n}"),
            ChannelId::Name(name) => f.write_str(name),
        }
    }
}

impl From<u64> for ChannelId {
    fn from(n: u64) -> Self {
        ChannelId::Number(n)
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        ChannelId::Name(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// Resolved definition of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: ChannelId,
    pub name: String,
    pub kind: CapabilityKind,
    pub dim_range: Option<u32>,
}

/// Resolved definition of one virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub name: String,
    pub protocol: String,
    pub address: String,
    pub channels: Vec<ChannelSpec>,
}

impl DeviceSpec {
    /// Check that every channel can be instantiated.
    pub fn validate(&self) -> Result<()> {
        for channel in &self.channels {
            Capability::new(channel.kind, channel.dim_range)?;
        }
        Ok(())
    }
}

/// Static identification of a virtual device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    /// The RF protocol name.
    pub model: String,
    pub firmware_revision: String,
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// One addressable function of a device and its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    name: String,
    capability: Capability,
    /// Last command actually queued, for de-duplication.
    last_command: Option<String>,
}

impl Channel {
    fn new(spec: ChannelSpec) -> Result<Self> {
        Ok(Channel {
            capability: Capability::new(spec.kind, spec.dim_range)?,
            id: spec.id,
            name: spec.name,
            last_command: None,
        })
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn kind(&self) -> CapabilityKind {
        self.capability.kind()
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    fn route(&self, packet: &InboundPacket) -> Route {
        Route {
            direct: self.id.matches(&packet.channel),
            broadcast: self.id.is_broadcast(),
        }
    }
}

// ---------------------------------------------------------------------------
// VirtualDevice
// ---------------------------------------------------------------------------

/// A registered listener for one `(protocol, address)`.
pub struct VirtualDevice {
    id: DeviceId,
    name: String,
    protocol: String,
    address: String,
    channels: Vec<Channel>,
    info: DeviceInfo,
    queue: CommandQueue,
    event_tx: broadcast::Sender<GatewayEvent>,
}

impl VirtualDevice {
    /// Build a device from its spec. Fails if any channel is invalid.
    pub fn new(
        id: DeviceId,
        spec: DeviceSpec,
        queue: CommandQueue,
        event_tx: broadcast::Sender<GatewayEvent>,
    ) -> Result<Self> {
        let channels = spec
            .channels
            .into_iter()
            .map(Channel::new)
            .collect::<Result<Vec<_>>>()?;

        let info = DeviceInfo {
            manufacturer: MANUFACTURER.to_string(),
            model: spec.protocol.clone(),
            firmware_revision: env!("CARGO_PKG_VERSION").to_string(),
        };

        info!(
            name = %spec.name,
            protocol = %spec.protocol,
            address = %spec.address,
            channels = channels.len(),
            "Added RFLink device"
        );

        Ok(VirtualDevice {
            id,
            name: spec.name,
            protocol: spec.protocol,
            address: spec.address,
            channels,
            info,
            queue,
            event_tx,
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Look up a channel by index.
    pub fn channel(&self, index: usize) -> Result<&Channel> {
        self.channels.get(index).ok_or(Error::UnknownChannel {
            device: self.id.index(),
            channel: index,
        })
    }

    fn channel_mut(&mut self, index: usize) -> Result<&mut Channel> {
        let device = self.id.index();
        self.channels.get_mut(index).ok_or(Error::UnknownChannel {
            device,
            channel: index,
        })
    }

    /// Whether a packet is addressed to this device.
    pub fn matches(&self, packet: &InboundPacket) -> bool {
        packet.protocol == self.protocol && packet.address == self.address
    }

    /// Apply a packet to every matching channel, in order. Returns how many
    /// channels changed state or fired.
    ///
    /// Packet-driven changes take the reported path and never transmit.
    pub fn handle_packet(&mut self, packet: &InboundPacket) -> usize {
        if !self.matches(packet) {
            return 0;
        }

        let mut handled = 0;
        for index in 0..self.channels.len() {
            let channel = &mut self.channels[index];
            let route = channel.route(packet);
            if !route.is_match() {
                continue;
            }
            let Some(effect) = channel.capability.handle(&packet.command, route) else {
                continue;
            };

            debug!(
                device = %self.name,
                kind = %channel.kind(),
                channel = %channel.id,
                command = %packet.command,
                ?effect,
                "matched packet"
            );
            self.emit_effect(index, effect);
            handled += 1;
        }
        handled
    }

    fn emit_effect(&self, channel: usize, effect: Effect) {
        let event = match effect {
            Effect::Power(on) => GatewayEvent::OnChanged {
                device: self.id,
                channel,
                on,
                source: Source::Reported,
            },
            Effect::Output(on, press) => {
                let _ = self.event_tx.send(GatewayEvent::OutputStateChanged {
                    device: self.id,
                    channel,
                    on,
                });
                GatewayEvent::ButtonPressed {
                    device: self.id,
                    channel,
                    press,
                }
            }
            Effect::Press(press) => GatewayEvent::ButtonPressed {
                device: self.id,
                channel,
                press,
            },
        };
        let _ = self.event_tx.send(event);
    }

    /// Set a switch-like channel on or off.
    ///
    /// A [`SetValue::Requested`] value queues `10;<protocol>;<address>;<channel>;ON|OFF;`
    /// unless it repeats the channel's last command. State is left untouched
    /// when the command cannot be queued.
    pub fn set_on(&mut self, channel: usize, value: SetValue<bool>) -> Result<()> {
        let on = value.value();
        let command = {
            let ch = self.channel(channel)?;
            protocol::cmd_switch(&self.protocol, &self.address, &ch.id.to_string(), on)
        };

        let mut next = self.channel(channel)?.capability.clone();
        next.set_on(on)?;
        if value.is_requested() {
            self.transmit(channel, command)?;
        }
        self.channel_mut(channel)?.capability = next;

        let _ = self.event_tx.send(GatewayEvent::OnChanged {
            device: self.id,
            channel,
            on,
            source: value.source(),
        });
        Ok(())
    }

    /// Set the brightness (0-100) of a dimmable channel.
    ///
    /// On/off follows as part of the same action: 0 is off, anything else on.
    /// A requested value queues exactly one dim command with the brightness
    /// scaled onto the channel's dim range.
    pub fn set_brightness(&mut self, channel: usize, value: SetValue<u8>) -> Result<()> {
        let brightness = value.value();
        let command = {
            let ch = self.channel(channel)?;
            let range = ch.capability.dim_range().ok_or_else(|| {
                Error::InvalidParameter(format!("channel {} is not dimmable", ch.id))
            })?;
            protocol::cmd_dim(
                &self.protocol,
                &self.address,
                &ch.id.to_string(),
                protocol::scale_brightness(brightness, range),
            )
        };

        let mut next = self.channel(channel)?.capability.clone();
        next.set_brightness(brightness)?;
        if value.is_requested() {
            self.transmit(channel, command)?;
        }
        self.channel_mut(channel)?.capability = next;

        let source = value.source();
        let _ = self.event_tx.send(GatewayEvent::BrightnessChanged {
            device: self.id,
            channel,
            brightness,
            source,
        });
        let _ = self.event_tx.send(GatewayEvent::OnChanged {
            device: self.id,
            channel,
            on: brightness > 0,
            source,
        });
        Ok(())
    }

    /// Queue a command unless it equals the channel's last one.
    fn transmit(&mut self, channel: usize, command: String) -> Result<()> {
        let device = self.id.index();
        let ch = self
            .channels
            .get_mut(channel)
            .ok_or(Error::UnknownChannel { device, channel })?;
        if ch.last_command.as_deref() == Some(command.as_str()) {
            debug!(device = %self.name, command = %command.trim_end(), "suppressing duplicate command");
            return Ok(());
        }
        self.queue.enqueue(command.clone())?;
        ch.last_command = Some(command);
        Ok(())
    }
}

impl fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("address", &self.address)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}
