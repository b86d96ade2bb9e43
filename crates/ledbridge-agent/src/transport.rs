// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Transport seams
//!
//! The runtime only talks to the outside world through these traits. The
//! `ble` and `mqtt` features provide the real bindings; tests drive the
//! same code with in-memory doubles.

use std::sync::Arc;

use async_trait::async_trait;
use ledbridge_core::{CommandFrame, DesiredState};
use tokio::sync::oneshot;

use crate::error::TransportError;

/// An established link to the light controller
#[async_trait]
pub trait LightLink: Send + Sync {
    /// Write one frame to the command characteristic
    async fn write(&self, frame: &CommandFrame) -> Result<(), TransportError>;

    /// Tear the link down. Errors are the transport's to log.
    async fn close(&self);
}

/// A fresh connection plus its out-of-band disconnect signal
pub struct LinkSession {
    pub link: Arc<dyn LightLink>,
    /// Fires (or is dropped) when the peer goes away
    pub disconnected: oneshot::Receiver<()>,
}

/// Opens links to the one configured device
#[async_trait]
pub trait LightTransport: Send + Sync {
    /// Establish a link. The caller bounds this with its connect timeout.
    async fn connect(&self) -> Result<LinkSession, TransportError>;
}

/// Destination for outbound desired-state snapshots
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn publish_state(&self, state: &DesiredState) -> Result<(), TransportError>;
}
