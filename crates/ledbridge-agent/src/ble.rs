// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bluetooth LE binding (btleplug)
//!
//! Connect scans for the configured address, connects, discovers services
//! and resolves the write characteristic. Disconnects are observed through
//! the adapter event stream and delivered on the session's oneshot.

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use ledbridge_config::DeviceConfig;
use ledbridge_core::CommandFrame;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TransportError;
use crate::transport::{LightLink, LightTransport, LinkSession};

fn backend(e: btleplug::Error) -> TransportError {
    TransportError::Backend(e.to_string())
}

/// Opens links to a single controller by MAC address
pub struct BleTransport {
    address: String,
    characteristic: Uuid,
    /// First adapter, resolved lazily and reused across reconnects
    adapter: Mutex<Option<Adapter>>,
}

impl BleTransport {
    /// # Errors
    /// `Backend` if `characteristic` is not a UUID
    pub fn new(address: &str, characteristic: &str) -> Result<Self, TransportError> {
        let characteristic = Uuid::parse_str(characteristic)
            .map_err(|e| TransportError::Backend(format!("invalid characteristic UUID: {}", e)))?;
        Ok(Self {
            address: address.to_uppercase(),
            characteristic,
            adapter: Mutex::new(None),
        })
    }

    pub fn from_config(device: &DeviceConfig) -> Result<Self, TransportError> {
        Self::new(&device.address, &device.characteristic)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn adapter(&self) -> Result<Adapter, TransportError> {
        let mut cached = self.adapter.lock().await;
        if let Some(adapter) = cached.as_ref() {
            return Ok(adapter.clone());
        }

        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;
        if let Ok(info) = adapter.adapter_info().await {
            info!(target: "ledbridge-ble", "Using Bluetooth adapter {}", info);
        }
        *cached = Some(adapter.clone());
        Ok(adapter)
    }

    fn matches(&self, peripheral: &Peripheral) -> bool {
        peripheral.address().to_string().eq_ignore_ascii_case(&self.address)
    }

    /// Scan until the configured address shows up. Unbounded; the caller's
    /// connect timeout cuts it off.
    async fn find_peripheral(&self, adapter: &Adapter) -> Result<Peripheral, TransportError> {
        for peripheral in adapter.peripherals().await.map_err(backend)? {
            if self.matches(&peripheral) {
                debug!(target: "ledbridge-ble", "{} already known to the adapter", self.address);
                return Ok(peripheral);
            }
        }

        let mut events = adapter.events().await.map_err(backend)?;
        adapter.start_scan(ScanFilter::default()).await.map_err(backend)?;
        debug!(target: "ledbridge-ble", "Scanning for {}", self.address);

        let found = loop {
            match events.next().await {
                Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                    let Ok(peripheral) = adapter.peripheral(&id).await else {
                        continue;
                    };
                    if self.matches(&peripheral) {
                        break Ok(peripheral);
                    }
                }
                Some(_) => {}
                None => break Err(TransportError::DeviceNotFound(self.address.clone())),
            }
        };

        if let Err(e) = adapter.stop_scan().await {
            debug!(target: "ledbridge-ble", "Failed to stop scan: {}", e);
        }
        found
    }

    fn find_characteristic(&self, peripheral: &Peripheral) -> Option<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == self.characteristic)
    }

    /// Forward `DeviceDisconnected` for `id` to the session. Stops on its own
    /// once the session is dropped.
    async fn watch_disconnect(
        &self,
        adapter: &Adapter,
        id: PeripheralId,
    ) -> Result<oneshot::Receiver<()>, TransportError> {
        let mut events = adapter.events().await.map_err(backend)?;
        let (mut tx, rx) = oneshot::channel();
        let address = self.address.clone();

        tokio::spawn(async move {
            let disconnected = loop {
                tokio::select! {
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => break true,
                        Some(_) => {}
                        None => break true,
                    },
                    _ = tx.closed() => break false,
                }
            };
            if disconnected {
                debug!(target: "ledbridge-ble", "{} disconnected", address);
                let _ = tx.send(());
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl LightTransport for BleTransport {
    async fn connect(&self) -> Result<LinkSession, TransportError> {
        let adapter = self.adapter().await?;
        let peripheral = self.find_peripheral(&adapter).await?;

        // Subscribe before connecting so an early drop is not missed
        let disconnected = self.watch_disconnect(&adapter, peripheral.id()).await?;

        if !peripheral.is_connected().await.map_err(backend)? {
            peripheral.connect().await.map_err(backend)?;
        }
        peripheral.discover_services().await.map_err(backend)?;

        let Some(characteristic) = self.find_characteristic(&peripheral) else {
            if let Err(e) = peripheral.disconnect().await {
                debug!(target: "ledbridge-ble", "Disconnect after failed lookup: {}", e);
            }
            return Err(TransportError::CharacteristicNotFound(self.characteristic.to_string()));
        };

        info!(target: "ledbridge-ble", "Connected to {} (characteristic {})", self.address, characteristic.uuid);

        let link = BleLink {
            peripheral,
            characteristic,
            address: self.address.clone(),
        };
        Ok(LinkSession {
            link: Arc::new(link),
            disconnected,
        })
    }
}

struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
    address: String,
}

#[async_trait]
impl LightLink for BleLink {
    async fn write(&self, frame: &CommandFrame) -> Result<(), TransportError> {
        self.peripheral
            .write(&self.characteristic, frame.as_bytes(), WriteType::WithoutResponse)
            .await
            .map_err(backend)
    }

    async fn close(&self) {
        match self.peripheral.disconnect().await {
            Ok(()) => debug!(target: "ledbridge-ble", "Disconnected from {}", self.address),
            Err(e) => warn!(target: "ledbridge-ble", "Disconnect from {} failed: {}", self.address, e),
        }
    }
}
