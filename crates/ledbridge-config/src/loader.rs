// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones win:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, LedbridgeConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "ledbridge.toml";
const CONFIG_PATH_ENV: &str = "LEDBRIDGE_CONFIG_PATH";

/// Find the ledbridge configuration file
///
/// Search order:
/// 1. `LEDBRIDGE_CONFIG_PATH` environment variable
/// 2. Current working directory: `./ledbridge.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        for ancestor in cwd.ancestors().skip(1).take(5) {
            search_paths.push(ancestor.join(CONFIG_FILE_NAME));
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML.
/// Values are not validated here; call [`crate::validate_config`].
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<LedbridgeConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: LedbridgeConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `LEDBRIDGE_DEVICE_ADDRESS` -> `device.address`
/// - `LEDBRIDGE_MQTT_HOST` -> `mqtt.host`
/// - `LEDBRIDGE_MQTT_PORT` -> `mqtt.port`
/// - `LEDBRIDGE_MQTT_USERNAME` -> `mqtt.username`
/// - `LEDBRIDGE_MQTT_PASSWORD` -> `mqtt.password`
/// - `LEDBRIDGE_BASE_TOPIC` -> `mqtt.base_topic`
/// - `LEDBRIDGE_LOG_LEVEL` -> `logging.level`
/// - `LEDBRIDGE_STATE_PATH` -> `state.path`
///
/// Unparseable numeric values are ignored.
pub fn apply_environment_overrides(config: &mut LedbridgeConfig) {
    if let Ok(value) = env::var("LEDBRIDGE_DEVICE_ADDRESS") {
        config.device.address = value;
    }

    if let Ok(value) = env::var("LEDBRIDGE_MQTT_HOST") {
        config.mqtt.host = value;
    }
    if let Ok(value) = env::var("LEDBRIDGE_MQTT_PORT") {
        if let Ok(port) = value.parse::<u16>() {
            config.mqtt.port = port;
        }
    }
    if let Ok(value) = env::var("LEDBRIDGE_MQTT_USERNAME") {
        config.mqtt.username = Some(value);
    }
    if let Ok(value) = env::var("LEDBRIDGE_MQTT_PASSWORD") {
        config.mqtt.password = Some(value);
    }
    if let Ok(value) = env::var("LEDBRIDGE_BASE_TOPIC") {
        config.mqtt.base_topic = value;
    }

    if let Ok(value) = env::var("LEDBRIDGE_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("LEDBRIDGE_STATE_PATH") {
        config.state.path = Some(PathBuf::from(value));
    }
}

/// Apply CLI argument overrides to configuration
///
/// Keys use dotted section paths, e.g. `{"mqtt.port": "8883", "link.max_retries": "10"}`.
///
/// # Errors
///
/// Unlike environment overrides, a CLI value the user typed is never
/// silently dropped: unknown keys and unparseable values are
/// `ConfigError::InvalidValue`.
pub fn apply_cli_overrides(
    config: &mut LedbridgeConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    // Sorted so the first reported error is stable
    let mut keys: Vec<&String> = cli_args.keys().collect();
    keys.sort();

    for key in keys {
        let value = &cli_args[key];
        match key.as_str() {
            "device.address" => config.device.address = value.clone(),
            "device.characteristic" => config.device.characteristic = value.clone(),
            "device.profile" => config.device.profile = value.clone(),

            "mqtt.host" => config.mqtt.host = value.clone(),
            "mqtt.port" => config.mqtt.port = parse(key, value)?,
            "mqtt.client_id" => config.mqtt.client_id = value.clone(),
            "mqtt.username" => config.mqtt.username = Some(value.clone()),
            "mqtt.password" => config.mqtt.password = Some(value.clone()),
            "mqtt.keep_alive_secs" => config.mqtt.keep_alive_secs = parse(key, value)?,
            "mqtt.base_topic" => config.mqtt.base_topic = value.clone(),

            "link.backoff_base_secs" => config.link.backoff_base_secs = parse(key, value)?,
            "link.backoff_max_secs" => config.link.backoff_max_secs = parse(key, value)?,
            "link.max_retries" => config.link.max_retries = parse(key, value)?,
            "link.connect_timeout_secs" => config.link.connect_timeout_secs = parse(key, value)?,
            "link.write_timeout_secs" => config.link.write_timeout_secs = parse(key, value)?,
            "link.frame_delay_ms" => config.link.frame_delay_ms = parse(key, value)?,
            "link.keepalive_secs" => config.link.keepalive_secs = parse(key, value)?,
            "link.reconnect_on_power_on" => {
                config.link.reconnect_on_power_on = parse_bool(key, value)?
            }

            "state.path" => config.state.path = Some(PathBuf::from(value)),

            "logging.level" => config.logging.level = value.clone(),
            "logging.format" => config.logging.format = value.clone(),
            "logging.directory" => config.logging.directory = Some(PathBuf::from(value)),

            "homeassistant.discovery" => {
                config.homeassistant.discovery = parse_bool(key, value)?
            }
            "homeassistant.prefix" => config.homeassistant.prefix = value.clone(),
            "homeassistant.name" => config.homeassistant.name = value.clone(),
            "homeassistant.object_id" => config.homeassistant.object_id = value.clone(),

            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "unknown override key '{}'",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!("{} = '{}'", key, value))),
    }
}
