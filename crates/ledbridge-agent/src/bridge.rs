// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wiring of store, encoder, link supervision, controller and keepalive

use std::sync::Arc;
use std::time::Duration;

use ledbridge_config::{validate_config, DeviceConfig, LedbridgeConfig, LinkConfig};
use ledbridge_core::{CommandEncoder, DeviceProfile, ProfileDefinition, ProfileError, StateStore};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::BridgeController;
use crate::error::Result;
use crate::keepalive::KeepaliveService;
use crate::link::{LinkHandle, LinkSignals, LinkTimings};
use crate::supervisor::{LinkSupervisor, SupervisorSettings};
use crate::transport::{LightTransport, StateSink};

/// Build the device profile named in the config, applying frame overrides
pub fn device_profile(device: &DeviceConfig) -> std::result::Result<DeviceProfile, ProfileError> {
    let mut def = if device.profile == "custom" {
        ProfileDefinition {
            name: "custom".to_string(),
            wake: String::new(),
            off: String::new(),
            color: String::new(),
            brightness: None,
            keepalive: None,
            brightness_min: 0,
            brightness_max: 0,
        }
    } else {
        DeviceProfile::builtin_definition(&device.profile)?
    };

    if let Some(frames) = &device.frames {
        if let Some(wake) = &frames.wake {
            def.wake = wake.clone();
        }
        if let Some(off) = &frames.off {
            def.off = off.clone();
        }
        if let Some(color) = &frames.color {
            def.color = color.clone();
        }
        if let Some(brightness) = &frames.brightness {
            def.brightness = Some(brightness.clone());
        }
        if let Some(keepalive) = &frames.keepalive {
            def.keepalive = Some(keepalive.clone());
        }
        if let Some(min) = frames.brightness_min {
            def.brightness_min = min;
        }
        if let Some(max) = frames.brightness_max {
            def.brightness_max = max;
        }
    }

    DeviceProfile::from_definition(&def)
}

/// Runtime knobs derived from `[link]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    pub supervisor: SupervisorSettings,
    pub timings: LinkTimings,
    /// `None` disables the keepalive
    pub keepalive: Option<Duration>,
    pub reconnect_on_power_on: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

impl BridgeSettings {
    pub fn from_config(link: &LinkConfig) -> Self {
        Self {
            supervisor: SupervisorSettings {
                backoff_base: link.backoff_base(),
                backoff_max: link.backoff_max(),
                max_retries: link.max_retries,
                connect_timeout: link.connect_timeout(),
            },
            timings: LinkTimings {
                write_timeout: link.write_timeout(),
                frame_delay: link.frame_delay(),
            },
            keepalive: link.keepalive_interval(),
            reconnect_on_power_on: link.reconnect_on_power_on,
        }
    }
}

/// The device side of the bridge, ready to run against a transport and sink
pub struct Bridge {
    store: Arc<StateStore>,
    encoder: CommandEncoder,
    link: Arc<LinkHandle>,
    signals: LinkSignals,
    settings: BridgeSettings,
}

impl Bridge {
    pub fn new(store: Arc<StateStore>, profile: DeviceProfile, settings: BridgeSettings) -> Self {
        let (link, signals) = LinkHandle::new(settings.timings);
        Self {
            store,
            encoder: CommandEncoder::new(profile),
            link,
            signals,
            settings,
        }
    }

    /// Validate the config and build the bridge it describes
    ///
    /// # Errors
    /// * `Config` - invalid or incomplete configuration
    /// * `Profile` - frame templates that cannot drive a controller
    pub fn from_config(config: &LedbridgeConfig) -> Result<Self> {
        validate_config(config)?;
        let profile = device_profile(&config.device)?;
        info!(target: "ledbridge-agent", "Using device profile '{}' for {}", profile.name(), config.device.address);

        let store = match &config.state.path {
            Some(path) => StateStore::with_persistence(path),
            None => StateStore::default(),
        };

        Ok(Self::new(
            Arc::new(store),
            profile,
            BridgeSettings::from_config(&config.link),
        ))
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    pub fn link(&self) -> Arc<LinkHandle> {
        Arc::clone(&self.link)
    }

    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    /// Run until shutdown (or a fatal supervisor error).
    ///
    /// `inbound` carries raw payloads from the command topic.
    pub async fn run(
        self,
        transport: Arc<dyn LightTransport>,
        sink: Arc<dyn StateSink>,
        inbound: mpsc::Receiver<Vec<u8>>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let Bridge {
            store,
            encoder,
            link,
            signals,
            settings,
        } = self;

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let controller = BridgeController::new(
            Arc::clone(&store),
            encoder.clone(),
            Arc::clone(&link),
            Arc::clone(&sink),
            settings.reconnect_on_power_on,
        );
        tasks.push(tokio::spawn(controller.run(inbound, shutdown.clone())));

        if let Some(interval) = settings.keepalive {
            let keepalive =
                KeepaliveService::new(Arc::clone(&link), Arc::clone(&store), encoder.clone(), interval);
            tasks.push(tokio::spawn(keepalive.run(shutdown.clone())));
        }

        let supervisor = LinkSupervisor::new(
            transport,
            link,
            signals,
            store,
            encoder,
            sink,
            settings.supervisor,
        );
        let result = supervisor.run(shutdown).await;

        if result.is_err() {
            for task in &tasks {
                task.abort();
            }
        }
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    debug!(target: "ledbridge-agent", "Bridge task ended abnormally: {}", e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledbridge_config::FramesConfig;

    #[test]
    fn test_builtin_profile_with_keepalive_override() {
        let device = DeviceConfig {
            profile: "lotus".to_string(),
            frames: Some(FramesConfig {
                keepalive: Some("7e0000000000000000ef".to_string()),
                ..FramesConfig::default()
            }),
            ..DeviceConfig::default()
        };
        let profile = device_profile(&device).unwrap();
        assert_eq!(profile.name(), "lotus");
        assert!(profile.has_keepalive());
    }

    #[test]
    fn test_custom_profile_needs_frames() {
        let device = DeviceConfig {
            profile: "custom".to_string(),
            ..DeviceConfig::default()
        };
        assert!(device_profile(&device).is_err());

        let device = DeviceConfig {
            profile: "custom".to_string(),
            frames: Some(FramesConfig {
                wake: Some("cc2333".to_string()),
                off: Some("cc2433".to_string()),
                color: Some("56{r}{g}{b}{brightness}aa".to_string()),
                brightness_min: Some(1),
                brightness_max: Some(255),
                ..FramesConfig::default()
            }),
            ..DeviceConfig::default()
        };
        assert!(matches!(
            device_profile(&device),
            Err(ProfileError::InconsistentFraming { .. })
        ));
    }

    #[test]
    fn test_settings_from_link_config() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.supervisor.backoff_base, Duration::from_secs(5));
        assert_eq!(settings.timings.frame_delay, Duration::from_millis(100));
        assert_eq!(settings.keepalive, Some(Duration::from_secs(10)));
        assert!(settings.reconnect_on_power_on);
    }

    #[test]
    fn test_from_config_requires_address() {
        let mut config = LedbridgeConfig::default();
        config.mqtt.host = "broker".to_string();
        assert!(matches!(
            Bridge::from_config(&config),
            Err(crate::BridgeError::Config(_))
        ));
    }
}
