//! Capability handlers: what a channel does with a packet addressed to it.
//!
//! Each channel carries one [`Capability`], a tagged union over the
//! supported capability types with the state that type needs. Handling a
//! packet is a pure state transition; the caller decides what to do with the
//! returned [`Effect`] (emit an event, log it).
//!
//! | Capability     | Route     | Command      | Effect                     |
//! |----------------|-----------|--------------|----------------------------|
//! | on/off         | direct    | `CMD=ON`     | on                         |
//! | on/off         | direct    | `CMD=OFF`    | off                        |
//! | stateful btn   | direct    | `CMD=ON`     | output on, single press    |
//! | stateful btn   | direct    | `CMD=OFF`    | output off, single press   |
//! | stateless btn  | direct    | `CMD=ON`     | single press               |
//! | stateless btn  | direct    | `CMD=OFF`    | double press               |
//! | stateless btn  | broadcast | `CMD=ALLON`  | single press               |
//! | stateless btn  | broadcast | `CMD=ALLOFF` | double press               |

use rflink_core::error::{Error, Result};
use rflink_core::types::{ButtonPress, CapabilityKind};

const CMD_ON: &str = "CMD=ON";
const CMD_OFF: &str = "CMD=OFF";
const CMD_ALL_ON: &str = "CMD=ALLON";
const CMD_ALL_OFF: &str = "CMD=ALLOFF";

/// How a packet reached a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Route {
    /// The packet's channel equals the channel's own id.
    pub direct: bool,
    /// The channel is the reserved `all` channel.
    pub broadcast: bool,
}

impl Route {
    /// Whether the packet reached the channel at all.
    pub fn is_match(&self) -> bool {
        self.direct || self.broadcast
    }
}

/// Brightness state of a dimmable on/off channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimmer {
    /// Highest level the device accepts; brightness 100 maps to this.
    pub range: u32,
    /// Last brightness, 0-100.
    pub brightness: u8,
}

/// A channel's behavior and state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    /// Lightbulb or Switch: settable on/off state, optionally dimmable.
    OnOff {
        kind: CapabilityKind,
        on: bool,
        dimmer: Option<Dimmer>,
    },
    /// Programmable switch that remembers its output state.
    StatefulButton { output_on: bool },
    /// Momentary programmable switch.
    StatelessButton,
}

/// Highest dim level the gateway accepts.
pub const MAX_DIM_RANGE: u32 = 255;

/// The state transition a packet caused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// An on/off channel was switched.
    Power(bool),
    /// A stateful button changed its output state and fired.
    Output(bool, ButtonPress),
    /// A stateless button fired.
    Press(ButtonPress),
}

impl Capability {
    /// Create the initial state for a capability type.
    ///
    /// `dim_range` is only accepted on switch-like types and must lie in
    /// `1..=MAX_DIM_RANGE`.
    pub fn new(kind: CapabilityKind, dim_range: Option<u32>) -> Result<Self> {
        if let Some(range) = dim_range {
            if !kind.is_switch_like() {
                return Err(Error::InvalidParameter(format!(
                    "dimrange is not supported on {kind}"
                )));
            }
            if range == 0 || range > MAX_DIM_RANGE {
                return Err(Error::InvalidParameter(format!(
                    "dimrange {range} out of range 1-{MAX_DIM_RANGE}"
                )));
            }
        }

        Ok(match kind {
            CapabilityKind::Lightbulb | CapabilityKind::Switch => Capability::OnOff {
                kind,
                on: false,
                dimmer: dim_range.map(|range| Dimmer {
                    range,
                    brightness: 0,
                }),
            },
            CapabilityKind::StatefulProgrammableSwitch => {
                Capability::StatefulButton { output_on: false }
            }
            CapabilityKind::StatelessProgrammableSwitch => Capability::StatelessButton,
        })
    }

    /// The capability type.
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::OnOff { kind, .. } => *kind,
            Capability::StatefulButton { .. } => CapabilityKind::StatefulProgrammableSwitch,
            Capability::StatelessButton => CapabilityKind::StatelessProgrammableSwitch,
        }
    }

    /// Apply an inbound command. Returns `None` when the command means
    /// nothing to this capability on this route.
    pub fn handle(&mut self, command: &str, route: Route) -> Option<Effect> {
        match self {
            Capability::OnOff { on, .. } if route.direct => {
                let value = switch_command(command)?;
                *on = value;
                Some(Effect::Power(value))
            }
            Capability::StatefulButton { output_on } if route.direct => {
                let value = switch_command(command)?;
                *output_on = value;
                Some(Effect::Output(value, ButtonPress::Single))
            }
            Capability::StatelessButton => match command {
                CMD_ON if route.direct => Some(Effect::Press(ButtonPress::Single)),
                CMD_OFF if route.direct => Some(Effect::Press(ButtonPress::Double)),
                CMD_ALL_ON if route.broadcast => Some(Effect::Press(ButtonPress::Single)),
                CMD_ALL_OFF if route.broadcast => Some(Effect::Press(ButtonPress::Double)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Current on/off state, for on/off channels.
    pub fn is_on(&self) -> Option<bool> {
        match self {
            Capability::OnOff { on, .. } => Some(*on),
            _ => None,
        }
    }

    /// Current brightness, for dimmable channels.
    pub fn brightness(&self) -> Option<u8> {
        match self {
            Capability::OnOff {
                dimmer: Some(dimmer),
                ..
            } => Some(dimmer.brightness),
            _ => None,
        }
    }

    /// Dim range, for dimmable channels.
    pub fn dim_range(&self) -> Option<u32> {
        match self {
            Capability::OnOff {
                dimmer: Some(dimmer),
                ..
            } => Some(dimmer.range),
            _ => None,
        }
    }

    /// Current output state, for stateful buttons.
    pub fn output_on(&self) -> Option<bool> {
        match self {
            Capability::StatefulButton { output_on } => Some(*output_on),
            _ => None,
        }
    }

    /// Overwrite the on/off state. Fails on buttons.
    pub fn set_on(&mut self, value: bool) -> Result<()> {
        match self {
            Capability::OnOff { on, .. } => {
                *on = value;
                Ok(())
            }
            other => Err(Error::InvalidParameter(format!(
                "{} has no on/off state",
                other.kind()
            ))),
        }
    }

    /// Overwrite brightness; on/off follows (0 is off). Fails unless the
    /// channel is dimmable.
    pub fn set_brightness(&mut self, value: u8) -> Result<()> {
        if value > 100 {
            return Err(Error::InvalidParameter(format!(
                "brightness {value} out of range 0-100"
            )));
        }
        match self {
            Capability::OnOff {
                on,
                dimmer: Some(dimmer),
                ..
            } => {
                dimmer.brightness = value;
                *on = value > 0;
                Ok(())
            }
            other => Err(Error::InvalidParameter(format!(
                "{} channel is not dimmable",
                other.kind()
            ))),
        }
    }
}

fn switch_command(command: &str) -> Option<bool> {
    match command {
        CMD_ON => Some(true),
        CMD_OFF => Some(false),
        _ => None,
    }
}
