// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ledbridge - MQTT to Bluetooth LE bridge for RGB light controllers
//!
//! ledbridge keeps one cheap BLE RGB LED controller (ELK-BLEDOM, Lotus Lantern
//! and friends) in step with a desired state held on an MQTT broker. It
//! remembers what the light should show, replays it after every reconnect,
//! and reports state and availability back on retained topics.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! ledbridge = "0.1"  # Default: BLE + MQTT bindings
//! ```
//!
//! ## Feature Flags
//!
//! - **`ble`** (default): btleplug binding for the device link
//! - **`mqtt`** (default): rumqttc binding for the broker session
//! - **`file-logging`**: daily-rotated log files via tracing-appender
//!
//! With both bindings disabled the crate is a pure state/encoding library.
//!
//! ## Crates
//!
//! - **ledbridge-core**: desired state, store, device profiles, frame encoder
//! - **ledbridge-config**: TOML configuration with env and CLI overrides
//! - **ledbridge-observability**: tracing setup and per-crate debug flags
//! - **ledbridge-agent**: link supervisor, controller, keepalive, bindings
//!
//! ## Usage
//!
//! ```rust
//! use ledbridge::prelude::*;
//!
//! let store = StateStore::default();
//! let encoder = CommandEncoder::new(DeviceProfile::lotus());
//!
//! let update = PartialState::from_json(br#"{"state":"ON","brightness":0}"#).unwrap();
//! let outcome = store.apply_update(&update);
//!
//! // Lotus carries brightness inside the color frame
//! let frames = encoder.encode(&outcome.state, false);
//! assert_eq!(frames.len(), 1);
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export domain
pub use ledbridge_core as core;

// Re-export infrastructure
pub use ledbridge_config as config;
pub use ledbridge_observability as observability;

// Re-export runtime
pub use ledbridge_agent as agent;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::core::{
        CommandEncoder, CommandFrame, DesiredState, DeviceProfile, PartialState, PowerState,
        Rgb, StateStore,
    };

    pub use crate::config::{load_config, validate_config, LedbridgeConfig};

    pub use crate::agent::{
        Bridge, BridgeError, BridgeSettings, LightLink, LightTransport, LinkState, StateSink,
    };

    #[cfg(feature = "ble")]
    pub use crate::agent::BleTransport;

    #[cfg(feature = "mqtt")]
    pub use crate::agent::{MqttBinding, MqttStateSink};
}
