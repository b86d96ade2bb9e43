// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Device link lifecycle
//!
//! ```text
//!            connect ok                   disconnect / write failure
//! Disconnected ──► Connecting ──► Connected ─────────────────────────┐
//!      ▲               │              │ reconnect requested          │
//!      │   fail: wait  │              ▼                              │
//!      └─── backoff ◄──┘         (immediate)          wait base ◄────┘
//! ```
//!
//! Every (re)connect is followed by a reconciliation with the wake frame.

use std::sync::Arc;
use std::time::Duration;

use ledbridge_core::{CommandEncoder, StateStore};
use tokio::sync::{oneshot, watch};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, Result};
use crate::link::{LinkHandle, LinkSignal, LinkSignals, LinkState};
use crate::reconciler::reconcile;
use crate::reconnect::ReconnectStrategy;
use crate::transport::{LightTransport, LinkSession, StateSink};

/// Supervisor timings and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// 0 = retry forever
    pub max_retries: u32,
    pub connect_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(60),
            max_retries: 0,
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// Why a connected session ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    Lost(String),
    ReconnectRequested,
    Shutdown,
}

pub struct LinkSupervisor {
    transport: Arc<dyn LightTransport>,
    link: Arc<LinkHandle>,
    signals: LinkSignals,
    store: Arc<StateStore>,
    encoder: CommandEncoder,
    sink: Arc<dyn StateSink>,
    settings: SupervisorSettings,
}

impl LinkSupervisor {
    pub fn new(
        transport: Arc<dyn LightTransport>,
        link: Arc<LinkHandle>,
        signals: LinkSignals,
        store: Arc<StateStore>,
        encoder: CommandEncoder,
        sink: Arc<dyn StateSink>,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            transport,
            link,
            signals,
            store,
            encoder,
            sink,
            settings,
        }
    }

    /// Keep the device connected until `shutdown` becomes true.
    ///
    /// # Errors
    /// `RetriesExhausted` when `max_retries` is non-zero and consecutive
    /// connect failures reach it. Nothing else is fatal.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut strategy = ReconnectStrategy::new(
            self.settings.backoff_base,
            self.settings.backoff_max,
            self.settings.max_retries,
        );
        let mut delay = Duration::ZERO;

        let result = loop {
            if !delay.is_zero() {
                info!(target: "ledbridge-agent", "Reconnecting in {:?}", delay);
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = shutdown_requested(&mut shutdown) => break Ok(()),
                }
            }
            if *shutdown.borrow() {
                break Ok(());
            }

            self.link.set_state(LinkState::Connecting);
            debug!(target: "ledbridge-agent", "Connecting (attempt {})", strategy.attempt_number() + 1);

            let attempt = tokio::select! {
                attempt = time::timeout(self.settings.connect_timeout, self.transport.connect()) => attempt,
                _ = shutdown_requested(&mut shutdown) => break Ok(()),
            };
            let outcome = match attempt {
                Ok(Ok(session)) => Ok(session),
                Ok(Err(e)) => Err(BridgeError::ConnectFailed(e)),
                Err(_) => Err(BridgeError::ConnectTimeout(self.settings.connect_timeout)),
            };
            let session = match outcome {
                Ok(session) => session,
                Err(e) => {
                    self.link.set_state(LinkState::Disconnected);
                    if !e.is_retryable() {
                        error!(target: "ledbridge-agent", "{}; not retrying", e);
                        break Err(e);
                    }
                    match strategy.next_backoff() {
                        Some(backoff) => {
                            warn!(target: "ledbridge-agent", "{} (attempt {})", e, strategy.attempt_number());
                            delay = backoff;
                            continue;
                        }
                        None => {
                            error!(target: "ledbridge-agent", "{}; giving up", e);
                            break Err(BridgeError::RetriesExhausted(strategy.attempt_number() + 1));
                        }
                    }
                }
            };

            if strategy.attempt_number() > 0 {
                info!(target: "ledbridge-agent", "Connected after {} failed attempts", strategy.attempt_number());
            } else {
                info!(target: "ledbridge-agent", "Connected");
            }
            strategy.reset();

            match self.serve(session, &mut shutdown).await {
                SessionEnd::Shutdown => break Ok(()),
                SessionEnd::ReconnectRequested => {
                    info!(target: "ledbridge-agent", "Reconnecting on request");
                    delay = Duration::ZERO;
                }
                SessionEnd::Lost(reason) => {
                    warn!(target: "ledbridge-agent", "Link lost: {}", reason);
                    delay = strategy.base();
                }
            }
        };

        self.link.set_state(LinkState::Disconnected);
        info!(target: "ledbridge-agent", "Link supervisor stopped");
        result
    }

    /// Install the session, reconcile, then wait for it to end
    async fn serve(&mut self, session: LinkSession, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        let LinkSession { link, mut disconnected } = session;
        let stale = self.signals.drain();
        if stale > 0 {
            debug!(target: "ledbridge-agent", "Dropped {} stale link signals", stale);
        }

        let reconciled = {
            let mut slot = self.link.lock_slot().await;
            *slot = Some(Arc::clone(&link));
            self.link.set_state(LinkState::Connected);

            tokio::select! {
                result = reconcile(&self.link, &link, &self.store, &self.encoder, self.sink.as_ref()) => {
                    result.map(|_| ()).map_err(|e| SessionEnd::Lost(e.to_string()))
                }
                _ = &mut disconnected => Err(SessionEnd::Lost("device disconnected".to_string())),
                _ = shutdown_requested(shutdown) => Err(SessionEnd::Shutdown),
            }
        };

        let end = match reconciled {
            Err(end) => end,
            Ok(()) => self.wait_for_end(&mut disconnected, shutdown).await,
        };

        self.teardown().await;
        end
    }

    async fn wait_for_end(
        &mut self,
        disconnected: &mut oneshot::Receiver<()>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        tokio::select! {
            _ = disconnected => SessionEnd::Lost("device disconnected".to_string()),
            signal = self.signals.recv() => match signal {
                Some(LinkSignal::Failed(reason)) => SessionEnd::Lost(reason),
                Some(LinkSignal::ReconnectRequested) => SessionEnd::ReconnectRequested,
                None => SessionEnd::Lost("link handle dropped".to_string()),
            },
            _ = shutdown_requested(shutdown) => SessionEnd::Shutdown,
        }
    }

    /// Mark the link down (aborting in-flight sends), then close it
    async fn teardown(&self) {
        self.link.set_state(LinkState::Disconnected);
        let link = self.link.lock_slot().await.take();
        if let Some(link) = link {
            if time::timeout(self.link.timings().write_timeout, link.close()).await.is_err() {
                warn!(target: "ledbridge-agent", "Timed out closing device link");
            }
        }
    }
}

/// Resolves once shutdown is requested (or its sender is gone)
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
