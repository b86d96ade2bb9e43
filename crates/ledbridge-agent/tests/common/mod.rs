// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory transport and sink doubles shared by integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledbridge_agent::{
    Bridge, BridgeSettings, LightLink, LightTransport, LinkHandle, LinkSession, LinkState,
    StateSink, TransportError,
};
use ledbridge_core::{CommandFrame, DesiredState, DeviceProfile, StateStore};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How the next connect attempt behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    Succeed,
    Fail,
    /// Never completes; only the connect timeout ends it
    Hang,
}

/// Scripted transport. Once the script runs out every connect succeeds.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<ConnectStep>>,
    attempts: Mutex<Vec<Instant>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
    disconnect: Mutex<Option<oneshot::Sender<()>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(steps: impl IntoIterator<Item = ConnectStep>) -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().extend(steps);
        Arc::new(transport)
    }

    /// Instants of every connect attempt so far
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Raw frames written across all sessions
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    pub fn clear_written(&self) {
        self.written.lock().clear();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Writes started while set never complete
    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Simulate the peer dropping the current session
    pub fn drop_link(&self) {
        if let Some(tx) = self.disconnect.lock().take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
impl LightTransport for MockTransport {
    async fn connect(&self) -> Result<LinkSession, TransportError> {
        self.attempts.lock().push(Instant::now());
        let step = self.script.lock().pop_front().unwrap_or(ConnectStep::Succeed);

        match step {
            ConnectStep::Fail => Err(TransportError::DeviceNotFound("BE:58:2C:00:12:34".to_string())),
            ConnectStep::Hang => std::future::pending().await,
            ConnectStep::Succeed => {
                let (tx, rx) = oneshot::channel();
                *self.disconnect.lock() = Some(tx);
                Ok(LinkSession {
                    link: Arc::new(MockLink {
                        written: Arc::clone(&self.written),
                        fail_writes: Arc::clone(&self.fail_writes),
                        stall_writes: Arc::clone(&self.stall_writes),
                        closes: Arc::clone(&self.closes),
                    }),
                    disconnected: rx,
                })
            }
        }
    }
}

pub struct MockLink {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_writes: Arc<AtomicBool>,
    stall_writes: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl LightLink for MockLink {
    async fn write(&self, frame: &CommandFrame) -> Result<(), TransportError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Backend("write rejected".to_string()));
        }
        self.written.lock().push(frame.as_bytes().to_vec());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every published state
#[derive(Default)]
pub struct MockSink {
    published: Mutex<Vec<DesiredState>>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<DesiredState> {
        self.published.lock().clone()
    }

    pub fn last(&self) -> Option<DesiredState> {
        self.published.lock().last().copied()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

#[async_trait]
impl StateSink for MockSink {
    async fn publish_state(&self, state: &DesiredState) -> Result<(), TransportError> {
        self.published.lock().push(*state);
        Ok(())
    }
}

/// Settings with the keepalive off so only the scenario writes frames
pub fn quiet_settings() -> BridgeSettings {
    BridgeSettings {
        keepalive: None,
        ..BridgeSettings::default()
    }
}

/// A bridge running on the mocks
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub sink: Arc<MockSink>,
    pub store: Arc<StateStore>,
    pub link: Arc<LinkHandle>,
    pub inbound: mpsc::Sender<Vec<u8>>,
    pub shutdown: watch::Sender<bool>,
    pub task: JoinHandle<ledbridge_agent::Result<()>>,
}

impl Harness {
    pub fn start(transport: Arc<MockTransport>, initial: DesiredState, settings: BridgeSettings) -> Self {
        let store = Arc::new(StateStore::new(initial));
        let bridge = Bridge::new(Arc::clone(&store), DeviceProfile::elk_bledom(), settings);
        Self::start_bridge(transport, bridge)
    }

    pub fn start_bridge(transport: Arc<MockTransport>, bridge: Bridge) -> Self {
        let sink = MockSink::new();
        let store = bridge.store();
        let link = bridge.link();
        let (inbound, inbound_rx) = mpsc::channel(32);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let transport_dyn: Arc<dyn LightTransport> = Arc::clone(&transport) as Arc<dyn LightTransport>;
        let sink_dyn: Arc<dyn StateSink> = Arc::clone(&sink) as Arc<dyn StateSink>;
        let task = tokio::spawn(bridge.run(transport_dyn, sink_dyn, inbound_rx, shutdown_rx));

        Self {
            transport,
            sink,
            store,
            link,
            inbound,
            shutdown,
            task,
        }
    }

    pub async fn send(&self, raw: &str) {
        self.inbound
            .send(raw.as_bytes().to_vec())
            .await
            .expect("controller should be running");
    }

    pub async fn wait_connected(&self) {
        let link = Arc::clone(&self.link);
        wait_until(move || link.state() == LinkState::Connected).await;
    }

    /// Wait for a (re)connect to finish reconciling: `frames` written and
    /// the state republished
    pub async fn wait_reconciled(&self, frames: usize) {
        self.wait_connected().await;
        wait_until(|| self.transport.written().len() == frames).await;
        wait_until(|| self.sink.last().is_some()).await;
    }

    pub async fn stop(self) -> ledbridge_agent::Result<()> {
        let _ = self.shutdown.send(true);
        self.task.await.expect("bridge task panicked")
    }
}

/// Poll `condition` every 10ms (virtual time under `start_paused`)
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..100_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Let every runnable task make progress without advancing time much
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
