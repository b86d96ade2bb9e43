// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ledbridge agent - keeps a BLE light controller in step with MQTT
//!
//! This crate owns everything with side effects: the device link, its
//! supervision and reconciliation, the inbound message controller, and the
//! broker session.
//!
//! # Features
//! - Link supervision with exponential backoff between connect attempts
//! - Reconciliation (wake + state) after every (re)connect
//! - Serialized, paced frame writes with per-write deadlines
//! - Optional keepalive for controllers that drop idle links
//! - Retained state and availability topics, MQTT last will
//! - Optional Home Assistant discovery
//!
//! # Architecture
//!
//! ```text
//!  MQTT command topic ──► mpsc ──► BridgeController ──► StateStore
//!                                        │                  │
//!                                        ▼                  ▼
//!                                   LinkHandle ◄──── LinkSupervisor ◄── LightTransport
//!                                        ▲                  │
//!                               KeepaliveService      reconcile()
//!                                                           │
//!  MQTT state topic ◄───────────── StateSink ◄──────────────┘
//! ```
//!
//! The runtime talks to Bluetooth and the broker only through the traits in
//! [`transport`]. The `ble` feature provides [`ble::BleTransport`] (btleplug)
//! and the `mqtt` feature provides [`mqtt::MqttBinding`] (rumqttc).
//!
//! # Error Handling
//!
//! All operations return `Result<T, BridgeError>`. Link failures never escape
//! the supervisor; they become reconnects. The only fatal runtime error is
//! [`BridgeError::RetriesExhausted`] when a retry limit is configured.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod bridge;
pub mod controller;
pub mod error;
pub mod homeassistant;
pub mod keepalive;
pub mod link;
pub mod reconciler;
pub mod reconnect;
pub mod supervisor;
pub mod transport;

#[cfg(feature = "ble")]
pub mod ble;

#[cfg(feature = "mqtt")]
pub mod mqtt;

// Re-export main types for convenience
pub use bridge::{device_profile, Bridge, BridgeSettings};
pub use controller::BridgeController;
pub use error::{BridgeError, Result, TransportError};
pub use keepalive::{KeepaliveService, KeepaliveTick};
pub use link::{LinkHandle, LinkSignal, LinkSignals, LinkState, LinkTimings};
pub use reconciler::reconcile;
pub use reconnect::ReconnectStrategy;
pub use supervisor::{LinkSupervisor, SupervisorSettings};
pub use transport::{LightLink, LightTransport, LinkSession, StateSink};

#[cfg(feature = "ble")]
pub use ble::BleTransport;

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBinding, MqttStateSink};
