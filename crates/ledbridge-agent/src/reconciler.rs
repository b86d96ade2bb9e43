// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Replay of the full desired state onto a fresh link

use std::sync::Arc;

use ledbridge_core::{CommandEncoder, DesiredState, StateStore};
use tracing::{info, warn};

use crate::error::Result;
use crate::link::LinkHandle;
use crate::transport::{LightLink, StateSink};

/// Make the device match the store.
///
/// Sends the wake frame and the state frames for `store.current()`, then
/// republishes that state. The caller holds the link mutex. A send failure
/// aborts the remaining frames and nothing is published.
pub async fn reconcile(
    handle: &LinkHandle,
    link: &Arc<dyn LightLink>,
    store: &StateStore,
    encoder: &CommandEncoder,
    sink: &dyn StateSink,
) -> Result<DesiredState> {
    let state = store.current();
    info!(target: "ledbridge-agent", "Reconciling device to {}", state.to_json());

    let frames = encoder.encode(&state, true);
    handle.send_on(link, &frames).await?;

    if let Err(e) = sink.publish_state(&state).await {
        warn!(target: "ledbridge-agent", "Could not republish reconciled state: {}", e);
    }
    Ok(state)
}
