// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! MQTT binding (rumqttc)
//!
//! One task drives the rumqttc event loop. It forwards command-topic
//! publishes to the controller, mirrors the device link state onto the
//! retained availability topic, and re-announces everything on each ConnAck.
//! Everything published from inside the loop uses `try_publish`: awaiting the
//! request channel from the task that drains it would deadlock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ledbridge_config::{HomeAssistantConfig, LedbridgeConfig, MqttConfig};
use ledbridge_core::{DesiredState, StateStore};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::homeassistant;
use crate::link::LinkState;
use crate::reconnect::ReconnectStrategy;
use crate::supervisor::shutdown_requested;
use crate::transport::StateSink;

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

/// Capacity of the client request channel
const REQUEST_CAPACITY: usize = 32;

/// Bound on flushing the goodbye messages at shutdown
const SHUTDOWN_FLUSH: Duration = Duration::from_secs(2);

/// Availability payload for a link state; `Connecting` keeps the last one
pub fn availability_for(state: LinkState) -> Option<&'static str> {
    match state {
        LinkState::Connected => Some(ONLINE),
        LinkState::Disconnected => Some(OFFLINE),
        LinkState::Connecting => None,
    }
}

pub fn mqtt_options(mqtt: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(mqtt.client_id.clone(), mqtt.host.clone(), mqtt.port);
    options.set_keep_alive(mqtt.keep_alive());
    options.set_clean_session(true);
    if let Some(username) = &mqtt.username {
        options.set_credentials(username.clone(), mqtt.password.clone().unwrap_or_default());
    }
    options.set_last_will(LastWill::new(
        mqtt.availability_topic(),
        OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    options
}

/// Publishes desired state to the retained state topic
#[derive(Clone)]
pub struct MqttStateSink {
    client: AsyncClient,
    topic: String,
}

#[async_trait]
impl StateSink for MqttStateSink {
    async fn publish_state(&self, state: &DesiredState) -> Result<(), TransportError> {
        // Queued, never awaited: callers must not stall behind the broker
        self.client
            .try_publish(self.topic.as_str(), QoS::AtLeastOnce, true, state.to_json())
            .map_err(|e| TransportError::Backend(e.to_string()))
    }
}

/// The broker session
pub struct MqttBinding {
    client: AsyncClient,
    eventloop: EventLoop,
    mqtt: MqttConfig,
    homeassistant: HomeAssistantConfig,
    device_address: String,
    backoff: ReconnectStrategy,
    /// Last availability payload sent this session
    availability: Option<&'static str>,
}

impl MqttBinding {
    pub fn new(config: &LedbridgeConfig) -> Self {
        let (client, eventloop) = AsyncClient::new(mqtt_options(&config.mqtt), REQUEST_CAPACITY);
        Self {
            client,
            eventloop,
            mqtt: config.mqtt.clone(),
            homeassistant: config.homeassistant.clone(),
            device_address: config.device.address.clone(),
            backoff: ReconnectStrategy::new(
                config.link.backoff_base(),
                config.link.backoff_max(),
                0,
            ),
            availability: None,
        }
    }

    pub fn state_sink(&self) -> MqttStateSink {
        MqttStateSink {
            client: self.client.clone(),
            topic: self.mqtt.state_topic(),
        }
    }

    /// Drive the session until shutdown.
    ///
    /// * `inbound` - command-topic payloads for the controller
    /// * `store` - republished on every (re)connect
    /// * `link_state` - drives the availability topic
    pub async fn run(
        mut self,
        inbound: mpsc::Sender<Vec<u8>>,
        store: Arc<StateStore>,
        mut link_state: watch::Receiver<LinkState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(target: "ledbridge-mqtt", "Connecting to broker {}:{}", self.mqtt.host, self.mqtt.port);
        let command_topic = self.mqtt.command_topic();
        let mut link_open = true;

        loop {
            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!(target: "ledbridge-mqtt", "Connected to broker ({:?})", ack.code);
                        self.backoff.reset();
                        self.on_connected(&store, *link_state.borrow());
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == command_topic => {
                        forward(&inbound, publish.payload.to_vec());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.availability = None;
                        let delay = self.backoff.next_backoff().unwrap_or(self.backoff.base());
                        warn!(target: "ledbridge-mqtt", "Broker connection error: {}; retrying in {:?}", e, delay);
                        tokio::select! {
                            _ = time::sleep(delay) => {}
                            _ = shutdown_requested(&mut shutdown) => break,
                        }
                    }
                },
                changed = link_state.changed(), if link_open => match changed {
                    Ok(()) => {
                        let state = *link_state.borrow_and_update();
                        if let Some(payload) = availability_for(state) {
                            self.publish_availability(payload);
                        }
                    }
                    Err(_) => link_open = false,
                },
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.close().await;
    }

    fn on_connected(&mut self, store: &StateStore, link: LinkState) {
        if let Err(e) = self.client.try_subscribe(self.mqtt.command_topic(), QoS::AtLeastOnce) {
            error!(target: "ledbridge-mqtt", "Subscribe to {} failed: {}", self.mqtt.command_topic(), e);
        }

        // Fresh session: the retained value may be a stale last will
        self.availability = None;
        self.publish_availability(availability_for(link).unwrap_or(OFFLINE));

        let state = store.current();
        if let Err(e) =
            self.client
                .try_publish(self.mqtt.state_topic(), QoS::AtLeastOnce, true, state.to_json())
        {
            warn!(target: "ledbridge-mqtt", "Could not republish state: {}", e);
        }

        if self.homeassistant.discovery {
            let topic = homeassistant::discovery_topic(&self.homeassistant);
            let payload =
                homeassistant::discovery_payload(&self.homeassistant, &self.mqtt, &self.device_address);
            match self
                .client
                .try_publish(topic.as_str(), QoS::AtLeastOnce, true, payload.to_string())
            {
                Ok(()) => debug!(target: "ledbridge-mqtt", "Published discovery config to {}", topic),
                Err(e) => warn!(target: "ledbridge-mqtt", "Could not publish discovery config: {}", e),
            }
        }
    }

    fn publish_availability(&mut self, payload: &'static str) {
        if self.availability == Some(payload) {
            return;
        }
        match self.client.try_publish(
            self.mqtt.availability_topic(),
            QoS::AtLeastOnce,
            true,
            payload,
        ) {
            Ok(()) => {
                debug!(target: "ledbridge-mqtt", "Availability: {}", payload);
                self.availability = Some(payload);
            }
            Err(e) => warn!(target: "ledbridge-mqtt", "Could not publish availability: {}", e),
        }
    }

    /// Say goodbye and let the event loop flush it
    async fn close(mut self) {
        self.availability = None;
        self.publish_availability(OFFLINE);
        if let Err(e) = self.client.try_disconnect() {
            debug!(target: "ledbridge-mqtt", "Disconnect request failed: {}", e);
        }

        let eventloop = &mut self.eventloop;
        let flushed = time::timeout(SHUTDOWN_FLUSH, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!(target: "ledbridge-mqtt", "Timed out flushing broker session");
        }
        info!(target: "ledbridge-mqtt", "Broker session closed");
    }
}

/// Hand a payload to the controller without blocking the event loop
fn forward(inbound: &mpsc::Sender<Vec<u8>>, payload: Vec<u8>) {
    match inbound.try_send(payload) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(target: "ledbridge-mqtt", "Inbound queue full; dropping command");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(target: "ledbridge-mqtt", "Controller gone; dropping command");
        }
    }
}
