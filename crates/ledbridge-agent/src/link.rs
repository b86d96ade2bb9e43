// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared handle to the device link
//!
//! Every write goes through one async mutex, so frames from the reconciler,
//! the controller and the keepalive never interleave. The link state lives
//! in a watch channel: senders observe it to abort when the link drops, and
//! the MQTT side observes it to publish availability.
//!
//! Only the supervisor installs or removes the link. Everyone else reports
//! failures and reconnect requests through [`LinkSignals`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ledbridge_core::CommandFrame;
use tokio::sync::{mpsc, watch, Mutex, MutexGuard};
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::transport::LightLink;

/// Connection state of the device link (owned by the supervisor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Events for the supervisor from anyone holding a [`LinkHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSignal {
    /// A send failed; the link must be torn down
    Failed(String),
    /// Drop the link and connect again right away
    ReconnectRequested,
}

/// Receiving side of [`LinkSignal`]s, owned by the supervisor
pub struct LinkSignals {
    rx: mpsc::UnboundedReceiver<LinkSignal>,
}

impl LinkSignals {
    pub async fn recv(&mut self) -> Option<LinkSignal> {
        self.rx.recv().await
    }

    /// Discard signals left over from a previous session
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Write pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    /// Deadline for a single characteristic write
    pub write_timeout: Duration,
    /// Minimum gap between two frames; controllers drop frames sent back to back
    pub frame_delay: Duration,
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            frame_delay: Duration::from_millis(100),
        }
    }
}

pub(crate) type LinkSlot = Option<Arc<dyn LightLink>>;

pub struct LinkHandle {
    state: watch::Sender<LinkState>,
    link: Mutex<LinkSlot>,
    signals: mpsc::UnboundedSender<LinkSignal>,
    timings: LinkTimings,
    last_write: parking_lot::Mutex<Instant>,
    /// Earliest instant the next frame may go out
    next_frame: parking_lot::Mutex<Option<Instant>>,
}

impl LinkHandle {
    pub fn new(timings: LinkTimings) -> (Arc<Self>, LinkSignals) {
        let (state, _) = watch::channel(LinkState::Disconnected);
        let (signals, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            state,
            link: Mutex::new(None),
            signals,
            timings,
            last_write: parking_lot::Mutex::new(Instant::now()),
            next_frame: parking_lot::Mutex::new(None),
        });
        (handle, LinkSignals { rx })
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn timings(&self) -> LinkTimings {
        self.timings
    }

    /// Time since the last successful write
    pub fn idle_for(&self) -> Duration {
        self.last_write.lock().elapsed()
    }

    /// Send frames in order, waiting for any in-flight send to finish first.
    ///
    /// # Errors
    /// * `NotConnected` - link is not up; nothing was written
    /// * `WriteFailed` / `WriteTimeout` / `LinkLost` - the supervisor has
    ///   already been told to tear the link down
    pub async fn send(&self, frames: &[CommandFrame]) -> Result<()> {
        let slot = self.link.lock().await;
        let link = self.connected_link(&slot)?;
        self.send_on(&link, frames).await
    }

    /// Like [`send`](Self::send) but gives up immediately (`None`) if another
    /// send holds the link.
    pub async fn send_if_idle(&self, frames: &[CommandFrame]) -> Option<Result<()>> {
        let slot = self.link.try_lock().ok()?;
        let link = match self.connected_link(&slot) {
            Ok(link) => link,
            Err(e) => return Some(Err(e)),
        };
        Some(self.send_on(&link, frames).await)
    }

    /// Ask the supervisor to drop the link and reconnect
    pub fn request_reconnect(&self) {
        // The supervisor owns the receiver for the life of the process
        let _ = self.signals.send(LinkSignal::ReconnectRequested);
    }

    fn connected_link(&self, slot: &LinkSlot) -> Result<Arc<dyn LightLink>> {
        match slot {
            Some(link) if self.is_connected() => Ok(Arc::clone(link)),
            _ => Err(BridgeError::NotConnected),
        }
    }

    /// Write frames on `link`; the caller holds the link mutex.
    ///
    /// Frames are spaced `frame_delay` apart, across calls too, with no
    /// trailing pause. Aborts with `LinkLost` as soon as the state leaves
    /// `Connected`.
    pub(crate) async fn send_on(&self, link: &Arc<dyn LightLink>, frames: &[CommandFrame]) -> Result<()> {
        let mut state_rx = self.state.subscribe();

        for frame in frames {
            let ready = *self.next_frame.lock();
            if let Some(ready) = ready {
                tokio::select! {
                    biased;
                    _ = state_rx.wait_for(|s| *s != LinkState::Connected) => {
                        return Err(BridgeError::LinkLost);
                    }
                    _ = time::sleep_until(ready) => {}
                }
            }

            let write = time::timeout(self.timings.write_timeout, link.write(frame));
            let result = tokio::select! {
                biased;
                _ = state_rx.wait_for(|s| *s != LinkState::Connected) => {
                    return Err(BridgeError::LinkLost);
                }
                result = write => result,
            };

            match result {
                Ok(Ok(())) => {
                    debug!(target: "ledbridge-agent", "Sent {}", frame);
                    let now = Instant::now();
                    *self.last_write.lock() = now;
                    *self.next_frame.lock() = Some(now + self.timings.frame_delay);
                }
                Ok(Err(e)) => return Err(self.fail(BridgeError::WriteFailed(e))),
                Err(_) => {
                    return Err(self.fail(BridgeError::WriteTimeout(self.timings.write_timeout)))
                }
            }
        }
        Ok(())
    }

    /// Mark the link down and tell the supervisor
    fn fail(&self, error: BridgeError) -> BridgeError {
        warn!(target: "ledbridge-agent", "Link failure: {}", error);
        self.state.send_if_modified(|state| {
            let was_connected = *state == LinkState::Connected;
            if was_connected {
                *state = LinkState::Disconnected;
            }
            was_connected
        });
        let _ = self.signals.send(LinkSignal::Failed(error.to_string()));
        error
    }

    pub(crate) fn set_state(&self, state: LinkState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    pub(crate) async fn lock_slot(&self) -> MutexGuard<'_, LinkSlot> {
        self.link.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use async_trait::async_trait;
    use ledbridge_core::{CommandEncoder, DesiredState, DeviceProfile};

    #[derive(Default)]
    struct RecordingLink {
        written: parking_lot::Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl LightLink for RecordingLink {
        async fn write(&self, frame: &CommandFrame) -> std::result::Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.written.lock().push(frame.as_bytes().to_vec());
            Ok(())
        }

        async fn close(&self) {}
    }

    fn frames() -> Vec<CommandFrame> {
        CommandEncoder::new(DeviceProfile::elk_bledom()).encode(&DesiredState::default(), true)
    }

    async fn connected(link: Arc<RecordingLink>) -> (Arc<LinkHandle>, LinkSignals) {
        let (handle, signals) = LinkHandle::new(LinkTimings::default());
        *handle.lock_slot().await = Some(link);
        handle.set_state(LinkState::Connected);
        (handle, signals)
    }

    #[tokio::test]
    async fn test_send_when_disconnected() {
        let (handle, _signals) = LinkHandle::new(LinkTimings::default());
        assert!(matches!(handle.send(&frames()).await, Err(BridgeError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_writes_in_order() {
        let link = Arc::new(RecordingLink::default());
        let (handle, _signals) = connected(Arc::clone(&link)).await;

        handle.send(&frames()).await.unwrap();

        let written = link.written.lock();
        let expected: Vec<Vec<u8>> = frames().iter().map(|f| f.as_bytes().to_vec()).collect();
        assert_eq!(*written, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_spaced_without_trailing_pause() {
        let link = Arc::new(RecordingLink::default());
        let (handle, _signals) = connected(Arc::clone(&link)).await;

        let started = Instant::now();
        handle.send(&frames()).await.unwrap();
        // Three frames, two gaps
        assert_eq!(started.elapsed(), Duration::from_millis(200));

        // The gap also holds across sends
        handle.send(&frames()[..1]).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_aborts_send() {
        let link = Arc::new(RecordingLink::default());
        let (handle, _signals) = connected(Arc::clone(&link)).await;

        let sender = Arc::clone(&handle);
        let send = tokio::spawn(async move { sender.send(&frames()).await });
        time::sleep(Duration::from_millis(50)).await;
        handle.set_state(LinkState::Disconnected);

        assert!(matches!(send.await.unwrap(), Err(BridgeError::LinkLost)));
        assert_eq!(link.written.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_disconnects_and_signals() {
        let link = Arc::new(RecordingLink {
            fail: true,
            ..RecordingLink::default()
        });
        let (handle, mut signals) = connected(link).await;

        let result = handle.send(&frames()).await;
        assert!(matches!(result, Err(BridgeError::WriteFailed(_))));
        assert_eq!(handle.state(), LinkState::Disconnected);
        assert!(matches!(signals.recv().await, Some(LinkSignal::Failed(_))));
    }

    #[tokio::test]
    async fn test_send_if_idle_skips_when_busy() {
        let link = Arc::new(RecordingLink::default());
        let (handle, _signals) = connected(link).await;

        let _busy = handle.lock_slot().await;
        assert!(handle.send_if_idle(&frames()).await.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_request_reaches_supervisor() {
        let (handle, mut signals) = LinkHandle::new(LinkTimings::default());
        handle.request_reconnect();
        assert_eq!(signals.recv().await, Some(LinkSignal::ReconnectRequested));
        assert_eq!(signals.drain(), 0);
    }
}
