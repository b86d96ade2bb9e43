// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `ledbridge.toml`. Every section has defaults, so a file only needs the
//! device address and the broker host.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Write characteristic used by ELK-BLEDOM and Lotus controllers
pub const DEFAULT_CHARACTERISTIC: &str = "0000fff3-0000-1000-8000-00805f9b34fb";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedbridgeConfig {
    pub device: DeviceConfig,
    pub mqtt: MqttConfig,
    pub link: LinkConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
    pub homeassistant: HomeAssistantConfig,
}

/// BLE controller configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bluetooth address, e.g. `BE:58:2C:00:12:34`
    pub address: String,
    /// UUID of the characteristic command frames are written to
    pub characteristic: String,
    /// `elk-bledom`, `lotus` or `custom`
    pub profile: String,
    /// Frame templates. Required for `custom`; for a built-in profile any
    /// field given here replaces the built-in value.
    pub frames: Option<FramesConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            characteristic: DEFAULT_CHARACTERISTIC.to_string(),
            profile: "elk-bledom".to_string(),
            frames: None,
        }
    }
}

/// Hex frame templates (`{r}`, `{g}`, `{b}`, `{brightness}` slots)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FramesConfig {
    pub wake: Option<String>,
    pub off: Option<String>,
    pub color: Option<String>,
    pub brightness: Option<String>,
    pub keepalive: Option<String>,
    pub brightness_min: Option<u8>,
    pub brightness_max: Option<u8>,
}

/// MQTT broker session configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    /// Prefix for `/set`, `/state` and `/availability`
    pub base_topic: String,
    /// Capacity of the inbound command queue
    pub inbound_queue: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            client_id: "ledbridge".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            base_topic: "bedframe/light".to_string(),
            inbound_queue: 32,
        }
    }
}

impl MqttConfig {
    pub fn command_topic(&self) -> String {
        format!("{}/set", self.base_topic)
    }

    pub fn state_topic(&self) -> String {
        format!("{}/state", self.base_topic)
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.base_topic)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// BLE link supervision timings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    pub backoff_base_secs: f64,
    pub backoff_max_secs: f64,
    /// 0 = retry forever
    pub max_retries: u32,
    pub connect_timeout_secs: f64,
    pub write_timeout_secs: f64,
    pub frame_delay_ms: u64,
    /// 0 = disabled
    pub keepalive_secs: u64,
    /// Reconnect instead of writing when power goes OFF -> ON
    pub reconnect_on_power_on: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            backoff_base_secs: 5.0,
            backoff_max_secs: 60.0,
            max_retries: 0,
            connect_timeout_secs: 20.0,
            write_timeout_secs: 5.0,
            frame_delay_ms: 100,
            keepalive_secs: 10,
            reconnect_on_power_on: true,
        }
    }
}

/// Saturating conversion; out-of-range values are rejected by validation
fn secs_f64(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(if value > 0.0 {
        Duration::MAX
    } else {
        Duration::ZERO
    })
}

impl LinkConfig {
    pub fn backoff_base(&self) -> Duration {
        secs_f64(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        secs_f64(self.backoff_max_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs_f64(self.connect_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        secs_f64(self.write_timeout_secs)
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }
}

/// Desired-state snapshot
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// No persistence when unset
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`
    pub format: String,
    /// Daily-rotated log files are written here when set
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            directory: None,
        }
    }
}

/// Home Assistant MQTT discovery
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub discovery: bool,
    pub prefix: String,
    pub name: String,
    pub object_id: String,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            discovery: false,
            prefix: "homeassistant".to_string(),
            name: "Bed Frame Light".to_string(),
            object_id: "ledbridge".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_derive_from_base() {
        let mqtt = MqttConfig::default();
        assert_eq!(mqtt.command_topic(), "bedframe/light/set");
        assert_eq!(mqtt.state_topic(), "bedframe/light/state");
        assert_eq!(mqtt.availability_topic(), "bedframe/light/availability");
    }

    #[test]
    fn test_link_defaults() {
        let link = LinkConfig::default();
        assert_eq!(link.backoff_base(), Duration::from_secs(5));
        assert_eq!(link.backoff_max(), Duration::from_secs(60));
        assert_eq!(link.connect_timeout(), Duration::from_secs(20));
        assert_eq!(link.frame_delay(), Duration::from_millis(100));
        assert_eq!(link.keepalive_interval(), Some(Duration::from_secs(10)));

        let disabled = LinkConfig {
            keepalive_secs: 0,
            ..LinkConfig::default()
        };
        assert_eq!(disabled.keepalive_interval(), None);
    }

    #[test]
    fn test_out_of_range_durations_saturate() {
        let link = LinkConfig {
            backoff_max_secs: 1e30,
            connect_timeout_secs: -1.0,
            ..LinkConfig::default()
        };
        assert_eq!(link.backoff_max(), Duration::MAX);
        assert_eq!(link.connect_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: LedbridgeConfig = toml::from_str(
            r#"
            [device]
            address = "BE:58:2C:00:12:34"

            [device.frames]
            keepalive = "7e0000000000000000ef"

            [mqtt]
            host = "10.0.0.2"
            "#,
        )
        .unwrap();
        assert_eq!(config.device.characteristic, DEFAULT_CHARACTERISTIC);
        assert_eq!(config.device.profile, "elk-bledom");
        assert_eq!(
            config.device.frames.unwrap().keepalive.as_deref(),
            Some("7e0000000000000000ef")
        );
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.link, LinkConfig::default());
    }
}
