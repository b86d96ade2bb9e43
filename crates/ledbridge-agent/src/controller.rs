// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Inbound desired-state messages
//!
//! Every accepted message updates the store and is echoed to the state sink.
//! Frames go to the device only while the link is up; otherwise the next
//! reconciliation carries the change.

use std::sync::Arc;

use ledbridge_core::{CommandEncoder, PartialState, StateStore, UpdateOutcome};
use tokio::sync::{mpsc, watch};
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::link::LinkHandle;
use crate::supervisor::shutdown_requested;
use crate::transport::StateSink;

pub struct BridgeController {
    store: Arc<StateStore>,
    encoder: CommandEncoder,
    link: Arc<LinkHandle>,
    sink: Arc<dyn StateSink>,
    /// Reconnect instead of writing when power goes OFF -> ON
    reconnect_on_power_on: bool,
}

impl BridgeController {
    pub fn new(
        store: Arc<StateStore>,
        encoder: CommandEncoder,
        link: Arc<LinkHandle>,
        sink: Arc<dyn StateSink>,
        reconnect_on_power_on: bool,
    ) -> Self {
        Self {
            store,
            encoder,
            link,
            sink,
            reconnect_on_power_on,
        }
    }

    /// Handle one raw message from the command topic.
    ///
    /// # Errors
    /// `MalformedMessage` if the payload is not a valid state object; the
    /// store is untouched. Device write failures are not returned: they are
    /// already with the supervisor.
    pub async fn on_inbound_message(&self, raw: &[u8]) -> Result<UpdateOutcome> {
        let update = PartialState::from_json(raw).map_err(|e| {
            warn!(target: "ledbridge-agent", "Dropping inbound message: {}", e);
            BridgeError::from(e)
        })?;

        let explicit_power = update.power.is_some();
        // The store may write its snapshot file
        let store = Arc::clone(&self.store);
        let outcome = match task::spawn_blocking(move || store.apply_update(&update)).await {
            Ok(outcome) => outcome,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        };
        info!(target: "ledbridge-agent", "Desired state updated to {}", outcome.state.to_json());

        if let Err(e) = self.sink.publish_state(&outcome.state).await {
            warn!(target: "ledbridge-agent", "Could not publish state: {}", e);
        }

        if !self.link.is_connected() {
            debug!(target: "ledbridge-agent", "Device link is {}; update stored for reconciliation", self.link.state());
            return Ok(outcome);
        }

        if outcome.woke_from_off && self.reconnect_on_power_on {
            info!(target: "ledbridge-agent", "Turning on from OFF; forcing a reconnect");
            self.link.request_reconnect();
            return Ok(outcome);
        }

        // An explicit OFF is always sent: the light may have been switched
        // on behind our back
        if !explicit_power && !outcome.state.is_on() {
            debug!(target: "ledbridge-agent", "Light is off; change applies on next power on");
            return Ok(outcome);
        }

        let frames = self.encoder.encode(&outcome.state, false);
        match self.link.send(&frames).await {
            Ok(()) => {}
            Err(e) if e.is_link_failure() => {
                debug!(target: "ledbridge-agent", "Send failed, left to the supervisor: {}", e);
            }
            Err(e) => {
                debug!(target: "ledbridge-agent", "Send skipped ({}); update stored for reconciliation", e);
            }
        }
        Ok(outcome)
    }

    /// Process messages until the channel closes or shutdown is requested
    pub async fn run(self, mut inbound: mpsc::Receiver<Vec<u8>>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(raw) => {
                        // Errors are logged where they occur
                        let _ = self.on_inbound_message(&raw).await;
                    }
                    None => break,
                },
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        debug!(target: "ledbridge-agent", "Controller stopped");
    }
}
