//! Core types shared by the controller, the devices and the event stream.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Opaque handle to a virtual device registered on a gateway.
///
/// Ids are assigned in registration order and are only meaningful for the
/// gateway that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(usize);

impl DeviceId {
    /// Create a `DeviceId` from a registry index.
    pub fn from_index(index: usize) -> Self {
        DeviceId(index)
    }

    /// Return the registry index of this device.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// Where a state change came from.
///
/// The gateway reporting what a physical device did is applied as
/// [`Reported`](SetValue::Reported) and never goes back out on the air. Only
/// [`Requested`](SetValue::Requested) values, set by a user or an automation,
/// produce an outbound command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetValue<T> {
    /// The physical device reported this value.
    Reported(T),
    /// A user or automation asked for this value.
    Requested(T),
}

impl<T: Copy> SetValue<T> {
    /// The carried value, regardless of source.
    pub fn value(&self) -> T {
        match *self {
            SetValue::Reported(v) | SetValue::Requested(v) => v,
        }
    }

    /// Whether this value should be transmitted to the gateway.
    pub fn is_requested(&self) -> bool {
        matches!(self, SetValue::Requested(_))
    }

    /// The source of this value without its payload.
    pub fn source(&self) -> Source {
        match self {
            SetValue::Reported(_) => Source::Reported,
            SetValue::Requested(_) => Source::Requested,
        }
    }
}

/// The origin of a state change, carried on events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Reported by the gateway.
    Reported,
    /// Requested by a user or automation.
    Requested,
}

/// A programmable switch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPress {
    /// One press.
    Single,
    /// Two presses in quick succession.
    Double,
}

impl fmt::Display for ButtonPress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonPress::Single => write!(f, "single press"),
            ButtonPress::Double => write!(f, "double press"),
        }
    }
}

/// The behavioral contract a channel implements.
///
/// The names match the service names used in the platform configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// On/off light, optionally dimmable.
    Lightbulb,
    /// On/off switch, optionally dimmable.
    Switch,
    /// Button that remembers its last output state.
    StatefulProgrammableSwitch,
    /// Momentary button with no stored state.
    StatelessProgrammableSwitch,
}

impl CapabilityKind {
    /// All supported capability types.
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::Lightbulb,
        CapabilityKind::Switch,
        CapabilityKind::StatefulProgrammableSwitch,
        CapabilityKind::StatelessProgrammableSwitch,
    ];

    /// Whether the capability carries an on/off state users can set.
    pub fn is_switch_like(&self) -> bool {
        matches!(self, CapabilityKind::Lightbulb | CapabilityKind::Switch)
    }

    /// The configuration name of this capability type.
    pub fn name(&self) -> &'static str {
        match self {
            CapabilityKind::Lightbulb => "Lightbulb",
            CapabilityKind::Switch => "Switch",
            CapabilityKind::StatefulProgrammableSwitch => "StatefulProgrammableSwitch",
            CapabilityKind::StatelessProgrammableSwitch => "StatelessProgrammableSwitch",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CapabilityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnknownCapability(s.to_string()))
    }
}
