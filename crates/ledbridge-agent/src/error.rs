// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for the bridge runtime

use std::time::Duration;

use ledbridge_config::ConfigError;
use ledbridge_core::{MessageError, ProfileError};

/// Result type alias using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failure reported by a transport binding (BLE or MQTT)
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("write characteristic {0} not found on device")]
    CharacteristicNotFound(String),

    #[error("link closed")]
    Closed,

    #[error("{0}")]
    Backend(String),
}

/// Error types for the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Could not establish the device link
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] TransportError),

    /// Connect attempt exceeded its deadline
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A characteristic write failed
    #[error("write failed: {0}")]
    WriteFailed(#[source] TransportError),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// Link left the Connected state while frames were being sent
    #[error("link lost during send")]
    LinkLost,

    /// Send attempted while the link is down
    #[error("device not connected")]
    NotConnected,

    /// Inbound desired-state message could not be parsed
    #[error(transparent)]
    MalformedMessage(#[from] MessageError),

    #[error("retries exhausted after {0} attempts")]
    RetriesExhausted(u32),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Profile(#[from] ProfileError),
}

impl BridgeError {
    /// Check if error is retryable (drives link supervision)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectFailed(_)
                | BridgeError::ConnectTimeout(_)
                | BridgeError::WriteFailed(_)
                | BridgeError::WriteTimeout(_)
                | BridgeError::LinkLost
        )
    }

    /// Check if error means the device link must be torn down
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::WriteFailed(_) | BridgeError::WriteTimeout(_) | BridgeError::LinkLost
        )
    }
}
