// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Home Assistant MQTT discovery payload

use ledbridge_config::{HomeAssistantConfig, MqttConfig};
use serde_json::{json, Value};

/// Topic the retained discovery config is published to
pub fn discovery_topic(ha: &HomeAssistantConfig) -> String {
    format!("{}/light/{}/config", ha.prefix, ha.object_id)
}

/// JSON-schema light entity pointing at the bridge topics
pub fn discovery_payload(ha: &HomeAssistantConfig, mqtt: &MqttConfig, device_address: &str) -> Value {
    json!({
        "name": ha.name,
        "unique_id": format!("{}_light", ha.object_id),
        "object_id": ha.object_id,
        "schema": "json",
        "command_topic": mqtt.command_topic(),
        "state_topic": mqtt.state_topic(),
        "availability_topic": mqtt.availability_topic(),
        "payload_available": "online",
        "payload_not_available": "offline",
        "brightness": true,
        "brightness_scale": 255,
        "supported_color_modes": ["rgb"],
        "retain": false,
        "device": {
            "identifiers": [format!("ledbridge_{}", device_address.replace(':', "").to_lowercase())],
            "connections": [["bluetooth", device_address.to_lowercase()]],
            "name": ha.name,
            "manufacturer": "ELK / Lotus",
            "model": "BLE RGB LED controller",
            "sw_version": crate::VERSION,
        }
    })
}
