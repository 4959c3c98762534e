//! Asynchronous gateway event types.
//!
//! Events are emitted through a [`tokio::sync::broadcast`] channel. The
//! accessory layer subscribes to mirror channel state into its own UI; the
//! `CommandFailed` variant doubles as the error sink for the command queue.

use crate::packet::InboundPacket;
use crate::types::{ButtonPress, DeviceId, Source};

/// An event emitted by a gateway controller.
///
/// Delivery is best effort: slow subscribers may miss events when the
/// broadcast buffer overflows.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A line from the gateway parsed into a packet.
    ///
    /// Emitted before the packet is routed, whether or not any device
    /// matches it.
    PacketReceived(InboundPacket),

    /// The on/off state of a switch-like channel changed.
    OnChanged {
        /// Owning device.
        device: DeviceId,
        /// Channel index within the device.
        channel: usize,
        /// New state.
        on: bool,
        /// Whether the gateway reported it or a user requested it.
        source: Source,
    },

    /// The brightness of a dimmable channel changed.
    BrightnessChanged {
        /// Owning device.
        device: DeviceId,
        /// Channel index within the device.
        channel: usize,
        /// New brightness, 0-100.
        brightness: u8,
        /// Whether the gateway reported it or a user requested it.
        source: Source,
    },

    /// The output state of a stateful button changed.
    OutputStateChanged {
        /// Owning device.
        device: DeviceId,
        /// Channel index within the device.
        channel: usize,
        /// New output state.
        on: bool,
    },

    /// A programmable switch fired.
    ButtonPressed {
        /// Owning device.
        device: DeviceId,
        /// Channel index within the device.
        channel: usize,
        /// Which press was seen.
        press: ButtonPress,
    },

    /// A command was written to the transport (once per repeat).
    CommandSent {
        /// The command exactly as written.
        command: String,
        /// Zero-based repeat number.
        attempt: u32,
    },

    /// Writing a command to the transport failed.
    ///
    /// The queue moves on to the next command; nothing is retried.
    CommandFailed {
        /// The command that could not be written.
        command: String,
        /// Display form of the transport error.
        error: String,
    },

    /// The command queue task stopped.
    Disconnected,
}
