// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Desired light state and partial updates
//!
//! All values live in the external (Home Assistant) domain: brightness and
//! each color channel are 0-255. Rescaling into a controller's native range
//! happens only in the encoder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MessageError;

/// Power component of the desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::On => "ON",
            PowerState::Off => "OFF",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("on") {
            Ok(PowerState::On)
        } else if s.eq_ignore_ascii_case("off") {
            Ok(PowerState::Off)
        } else {
            Err(format!("expected \"ON\" or \"OFF\", got {:?}", s))
        }
    }
}

// "on", "On" and "ON" are all accepted.
impl<'de> Deserialize<'de> for PowerState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// The single source of truth for what the light should display.
///
/// Serializes to the outbound state contract:
/// `{"state":"ON","brightness":255,"color":{"r":255,"g":255,"b":255}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(rename = "state")]
    pub power: PowerState,
    pub brightness: u8,
    pub color: Rgb,
}

impl Default for DesiredState {
    fn default() -> Self {
        Self {
            power: PowerState::On,
            brightness: 255,
            color: Rgb::WHITE,
        }
    }
}

impl DesiredState {
    /// Merge a partial update into a copy of this state.
    ///
    /// Present fields are clamped into range and overwrite; absent fields are
    /// carried over unchanged.
    pub fn merged(&self, update: &PartialState) -> DesiredState {
        let mut next = *self;
        if let Some(power) = update.power {
            next.power = power;
        }
        if let Some(brightness) = update.brightness {
            next.brightness = clamp_channel(brightness);
        }
        if let Some(color) = update.color {
            next.color = color.clamped();
        }
        next
    }

    pub fn is_on(&self) -> bool {
        self.power == PowerState::On
    }

    /// Outbound JSON payload
    pub fn to_json(&self) -> String {
        // A struct of plain enums and integers always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Color as received from the message source, before clamping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ColorUpdate {
    pub r: i64,
    pub g: i64,
    pub b: i64,
}

impl ColorUpdate {
    pub fn clamped(&self) -> Rgb {
        Rgb::new(
            clamp_channel(self.r),
            clamp_channel(self.g),
            clamp_channel(self.b),
        )
    }
}

/// A desired-state change where every field is optional.
///
/// Unknown keys (`color_mode`, `transition`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PartialState {
    #[serde(default, rename = "state")]
    pub power: Option<PowerState>,
    #[serde(default)]
    pub brightness: Option<i64>,
    #[serde(default)]
    pub color: Option<ColorUpdate>,
}

impl PartialState {
    /// Parse an inbound command payload.
    ///
    /// # Errors
    /// * `MessageError::Json` - not JSON, or a known key has the wrong type
    /// * `MessageError::NotAnObject` - top-level value is not an object
    pub fn from_json(raw: &[u8]) -> Result<Self, MessageError> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        let kind = match &value {
            serde_json::Value::Object(_) => None,
            serde_json::Value::Null => Some("null"),
            serde_json::Value::Bool(_) => Some("a boolean"),
            serde_json::Value::Number(_) => Some("a number"),
            serde_json::Value::String(_) => Some("a string"),
            serde_json::Value::Array(_) => Some("an array"),
        };
        if let Some(kind) = kind {
            return Err(MessageError::NotAnObject(kind));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn power(power: PowerState) -> Self {
        Self {
            power: Some(power),
            ..Self::default()
        }
    }

    pub fn brightness(brightness: i64) -> Self {
        Self {
            brightness: Some(brightness),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.power.is_none() && self.brightness.is_none() && self.color.is_none()
    }
}

/// Result of merging a [`PartialState`] into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub previous: DesiredState,
    pub state: DesiredState,
    /// Stored power was OFF and the update switched it ON.
    ///
    /// Some controllers only honor "power on" as part of a fresh connection
    /// handshake, so callers may choose to reconnect instead of writing.
    pub woke_from_off: bool,
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.state
    }
}

fn clamp_channel(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}
