//! Platform configuration: bridges, their serial settings and devices.
//!
//! The file format is the JSON platform block used by existing RFLink
//! setups:
//!
//! ```json
//! {
//!   "bridges": [{
//!     "serialport": "/dev/ttyACM0",
//!     "delay": 100,
//!     "repeat": 2,
//!     "devices": [{
//!       "name": "Garden lights",
//!       "type": "Lightbulb",
//!       "protocol": "NewKaku",
//!       "address": "00cac142",
//!       "channels": [1, {"channel": 2, "name": "Porch", "dimrange": 15}]
//!     }]
//!   }]
//! }
//! ```
//!
//! Omitted or zero serial settings mean "use the default". Unknown keys are
//! ignored so a whole platform block can be pasted in as-is.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use rflink_core::error::{Error, Result};
use rflink_core::types::CapabilityKind;
use rflink_io::IoConfig;
use rflink_transport::DEFAULT_BAUD_RATE;

use crate::device::{ChannelId, ChannelSpec, DeviceSpec};

/// Serial device used when a bridge does not name one.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyACM0";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// Top-level configuration: one entry per gateway.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
}

/// One gateway and the devices reachable through it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Serial device path.
    #[serde(default)]
    pub serialport: Option<String>,
    #[serde(default)]
    pub baudrate: Option<u32>,
    /// Milliseconds after every write.
    #[serde(default)]
    pub delay: Option<u64>,
    /// Writes per command.
    #[serde(default)]
    pub repeat: Option<u32>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub name: String,
    /// Default capability type for channels that don't set one.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub protocol: String,
    /// Device address as the gateway prints it. A JSON number is taken as
    /// its decimal text, so `41` and `"41"` are the same address.
    #[serde(deserialize_with = "string_or_number")]
    pub address: String,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(n) => n.to_string(),
    })
}

/// A channel entry: either a bare id or a full object.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ChannelEntry {
    Detailed(ChannelConfig),
    Bare(ChannelId),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub channel: ChannelId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub dimrange: Option<u32>,
}

impl PlatformConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlatformConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject configurations with nothing to run.
    pub fn validate(&self) -> Result<()> {
        if self.bridges.is_empty() {
            return Err(Error::Config("no bridges found in configuration".into()));
        }
        for (index, bridge) in self.bridges.iter().enumerate() {
            if bridge.devices.is_empty() {
                return Err(Error::Config(format!("bridge {index} has no devices")));
            }
        }
        Ok(())
    }
}

impl BridgeConfig {
    /// Resolve serial settings, applying defaults for omitted or zero values.
    pub fn gateway_config(&self) -> GatewayConfig {
        let defaults = GatewayConfig::default();
        GatewayConfig {
            device_path: self
                .serialport
                .clone()
                .filter(|path| !path.is_empty())
                .unwrap_or(defaults.device_path),
            baud_rate: self
                .baudrate
                .filter(|&baud| baud > 0)
                .unwrap_or(defaults.baud_rate),
            delay: self
                .delay
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            repeat: self
                .repeat
                .filter(|&repeat| repeat > 0)
                .unwrap_or(defaults.repeat),
        }
    }

    /// Resolve and validate every device on this bridge.
    pub fn device_specs(&self) -> Result<Vec<DeviceSpec>> {
        self.devices.iter().map(DeviceConfig::to_spec).collect()
    }
}

impl DeviceConfig {
    /// Resolve channel names and types into a [`DeviceSpec`].
    ///
    /// Unnamed channels are called `"<device name> <channel>"`; untyped
    /// channels take the device type.
    pub fn to_spec(&self) -> Result<DeviceSpec> {
        let channels = self
            .channels
            .iter()
            .map(|entry| -> Result<ChannelSpec> {
                let (id, name, kind, dim_range) = match entry {
                    ChannelEntry::Bare(id) => (id, None, None, None),
                    ChannelEntry::Detailed(c) => {
                        (&c.channel, c.name.as_ref(), c.kind.as_ref(), c.dimrange)
                    }
                };
                let kind = kind.or(self.kind.as_ref()).ok_or_else(|| {
                    Error::Config(format!(
                        "device {}: channel {id} has no type",
                        self.name
                    ))
                })?;
                Ok(ChannelSpec {
                    id: id.clone(),
                    name: name
                        .cloned()
                        .unwrap_or_else(|| format!("{} {id}", self.name)),
                    kind: kind.parse::<CapabilityKind>()?,
                    dim_range,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let spec = DeviceSpec {
            name: self.name.clone(),
            protocol: self.protocol.clone(),
            address: self.address.clone(),
            channels,
        };
        spec.validate()?;
        Ok(spec)
    }
}

// ---------------------------------------------------------------------------
// Resolved gateway settings
// ---------------------------------------------------------------------------

/// Serial and timing settings for one gateway. Fixed once the gateway runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub device_path: String,
    pub baud_rate: u32,
    /// Gap after every write, including between repeats.
    pub delay: Duration,
    /// Writes per command, at least 1.
    pub repeat: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            device_path: DEFAULT_DEVICE_PATH.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            delay: Duration::ZERO,
            repeat: 1,
        }
    }
}

impl GatewayConfig {
    /// Settings for the command queue task.
    pub fn io_config(&self) -> IoConfig {
        IoConfig {
            delay: self.delay,
            repeat: self.repeat,
            ..IoConfig::default()
        }
    }
}
