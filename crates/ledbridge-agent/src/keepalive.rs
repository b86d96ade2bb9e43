// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Keepalive for idle device links
//!
//! Some controllers drop a silent link after a while. When the link has
//! been idle for a full interval, a keepalive frame is written (or the
//! current state frames, for profiles without one). A tick never waits
//! behind a send in progress; it is simply skipped.

use std::sync::Arc;
use std::time::Duration;

use ledbridge_core::{CommandEncoder, StateStore};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::link::LinkHandle;
use crate::supervisor::shutdown_requested;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveTick {
    Sent,
    NotConnected,
    /// A write happened within the last interval
    Recent,
    /// Another send holds the link
    Busy,
    Failed,
}

pub struct KeepaliveService {
    link: Arc<LinkHandle>,
    store: Arc<StateStore>,
    encoder: CommandEncoder,
    interval: Duration,
}

impl KeepaliveService {
    pub fn new(
        link: Arc<LinkHandle>,
        store: Arc<StateStore>,
        encoder: CommandEncoder,
        interval: Duration,
    ) -> Self {
        Self {
            link,
            store,
            encoder,
            interval,
        }
    }

    /// Tick every interval until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(target: "ledbridge-agent", "Keepalive started ({:?})", self.interval);

        // First tick one interval from now
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(target: "ledbridge-agent", "Keepalive tick: {:?}", outcome);
                }
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        debug!(target: "ledbridge-agent", "Keepalive stopped");
    }

    pub async fn tick(&self) -> KeepaliveTick {
        if !self.link.is_connected() {
            return KeepaliveTick::NotConnected;
        }
        if self.link.idle_for() < self.interval {
            return KeepaliveTick::Recent;
        }

        let frames = self.encoder.keepalive(&self.store.current());
        match self.link.send_if_idle(&frames).await {
            None => KeepaliveTick::Busy,
            Some(Ok(())) => KeepaliveTick::Sent,
            Some(Err(e)) => {
                warn!(target: "ledbridge-agent", "Keepalive failed: {}", e);
                KeepaliveTick::Failed
            }
        }
    }
}
