// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! All checks run and every problem is reported at once. Frame template
//! syntax is checked later, when the device profile is built.

use crate::{ConfigError, ConfigResult, LedbridgeConfig};

const PROFILES: [&str; 3] = ["elk-bledom", "lotus", "custom"];
const LOG_FORMATS: [&str; 2] = ["text", "json"];

/// Upper bound for link durations (one day)
const MAX_LINK_SECS: f64 = 86_400.0;

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// * `ConfigError::MissingRequired` when the device address or broker host is
///   absent and nothing else is wrong
/// * `ConfigError::ValidationError` listing every problem otherwise
pub fn validate_config(config: &LedbridgeConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_device(config, &mut errors);
    validate_mqtt(config, &mut errors);
    validate_link(config, &mut errors);
    validate_logging(config, &mut errors);

    match errors.as_slice() {
        [] => Ok(()),
        [ConfigValidationError::MissingRequired { field }] => {
            Err(ConfigError::MissingRequired(field.clone()))
        }
        _ => {
            let error_messages = errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n");
            Err(ConfigError::ValidationError(format!(
                "Configuration validation failed:\n{}",
                error_messages
            )))
        }
    }
}

fn validate_required_fields(config: &LedbridgeConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.device.address.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "device.address".to_string(),
        });
    }
    if config.mqtt.host.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "mqtt.host".to_string(),
        });
    }
}

fn validate_device(config: &LedbridgeConfig, errors: &mut Vec<ConfigValidationError>) {
    let device = &config.device;

    if !device.address.is_empty() && !is_bluetooth_address(&device.address) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.address".to_string(),
            reason: format!("'{}' is not of the form AA:BB:CC:DD:EE:FF", device.address),
        });
    }

    if !is_uuid(&device.characteristic) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.characteristic".to_string(),
            reason: format!("'{}' is not a 128-bit UUID", device.characteristic),
        });
    }

    if !PROFILES.contains(&device.profile.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "device.profile".to_string(),
            reason: format!("must be one of {}", PROFILES.join(", ")),
        });
    }

    if device.profile == "custom" {
        let frames = device.frames.clone().unwrap_or_default();
        for (field, present) in [
            ("wake", frames.wake.is_some()),
            ("off", frames.off.is_some()),
            ("color", frames.color.is_some()),
            ("brightness_min", frames.brightness_min.is_some()),
            ("brightness_max", frames.brightness_max.is_some()),
        ] {
            if !present {
                errors.push(ConfigValidationError::MissingRequired {
                    field: format!("device.frames.{}", field),
                });
            }
        }
    }
}

fn validate_mqtt(config: &LedbridgeConfig, errors: &mut Vec<ConfigValidationError>) {
    let mqtt = &config.mqtt;

    if mqtt.port == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "mqtt.port".to_string(),
            reason: "must be non-zero".to_string(),
        });
    }
    if mqtt.client_id.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "mqtt.client_id".to_string(),
        });
    }
    if mqtt.base_topic.is_empty()
        || mqtt.base_topic.ends_with('/')
        || mqtt.base_topic.contains(['+', '#'])
    {
        errors.push(ConfigValidationError::InvalidValue {
            field: "mqtt.base_topic".to_string(),
            reason: "must be non-empty, without wildcards or a trailing '/'".to_string(),
        });
    }
    if mqtt.password.is_some() && mqtt.username.is_none() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "mqtt.password".to_string(),
            reason: "a password requires mqtt.username".to_string(),
        });
    }
    if mqtt.inbound_queue == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "mqtt.inbound_queue".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}

fn validate_link(config: &LedbridgeConfig, errors: &mut Vec<ConfigValidationError>) {
    let link = &config.link;

    for (field, value) in [
        ("link.backoff_base_secs", link.backoff_base_secs),
        ("link.backoff_max_secs", link.backoff_max_secs),
        ("link.connect_timeout_secs", link.connect_timeout_secs),
        ("link.write_timeout_secs", link.write_timeout_secs),
    ] {
        if !value.is_finite() || value <= 0.0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must be positive".to_string(),
            });
        } else if value > MAX_LINK_SECS {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("must not exceed {} seconds", MAX_LINK_SECS),
            });
        }
    }

    if link.backoff_max_secs < link.backoff_base_secs {
        errors.push(ConfigValidationError::InvalidValue {
            field: "link.backoff_max_secs".to_string(),
            reason: "must not be below link.backoff_base_secs".to_string(),
        });
    }
}

fn validate_logging(config: &LedbridgeConfig, errors: &mut Vec<ConfigValidationError>) {
    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: "must be 'text' or 'json'".to_string(),
        });
    }
}

fn is_bluetooth_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_uuid(text: &str) -> bool {
    let groups: Vec<&str> = text.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    groups.len() == lengths.len()
        && groups
            .iter()
            .zip(lengths)
            .all(|(g, len)| g.len() == len && g.chars().all(|c| c.is_ascii_hexdigit()))
}
