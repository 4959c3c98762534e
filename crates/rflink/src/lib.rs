//! # rflink -- RFLink gateway controller
//!
//! `rflink` drives an RFLink RF-to-serial gateway and presents the remotes,
//! switches and lights it can reach as virtual devices.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rflink::{CapabilityKind, ChannelId, ChannelSpec, DeviceSpec, GatewayBuilder, SetValue};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = GatewayBuilder::new()
//!         .serial_port("/dev/ttyACM0")
//!         .delay(Duration::from_millis(100))
//!         .repeat(2)
//!         .build()
//!         .await?;
//!
//!     let lamp = gateway
//!         .register(DeviceSpec {
//!             name: "Lamp".into(),
//!             protocol: "NewKaku".into(),
//!             address: "00cac142".into(),
//!             channels: vec![ChannelSpec {
//!                 id: ChannelId::Number(1),
//!                 name: "Lamp 1".into(),
//!                 kind: CapabilityKind::Lightbulb,
//!                 dim_range: Some(15),
//!             }],
//!         })
//!         .await?;
//!
//!     gateway.set_brightness(lamp, 0, SetValue::Requested(60)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `rflink-core`         | Packet parser, [`Transport`] trait, types, errors |
//! | `rflink-transport`    | Serial transport                                 |
//! | `rflink-io`           | Line framing, command encoding, command queue    |
//! | **`rflink`**          | Devices, router, gateway controller, config      |
//!
//! ## Events
//!
//! Every gateway emits [`GatewayEvent`]s on a broadcast channel: each
//! parsed packet, each state change with its [`Source`], button presses, and
//! the outcome of every write.
//!
//! ```no_run
//! # async fn example(gateway: &rflink::Gateway) {
//! use rflink::GatewayEvent;
//!
//! let mut events = gateway.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let GatewayEvent::ButtonPressed { device, channel, press } = event {
//!         println!("{device} channel {channel}: {press}");
//!     }
//! }
//! # }
//! ```

pub use rflink_core::*;

pub mod builder;
pub mod capability;
pub mod config;
pub mod device;
pub mod gateway;
pub mod platform;
pub mod router;

pub use builder::GatewayBuilder;
pub use capability::{Capability, Dimmer, Effect, Route};
pub use config::{BridgeConfig, DeviceConfig, GatewayConfig, PlatformConfig};
pub use device::{Channel, ChannelId, ChannelSpec, DeviceInfo, DeviceSpec, VirtualDevice};
pub use gateway::Gateway;
pub use platform::{Bridge, Platform};
pub use rflink_io::{protocol, CommandQueue};
