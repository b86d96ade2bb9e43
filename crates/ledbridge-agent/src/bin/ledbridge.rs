// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! ledbridge daemon: MQTT <-> BLE RGB light controller bridge

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, FromArgMatches, Parser};
use ledbridge_agent::{BleTransport, Bridge, MqttBinding, StateSink};
use ledbridge_config::{load_config, validate_config, LedbridgeConfig};
use ledbridge_observability::{debug_flags_help, init_logging, parse_debug_flags, LoggingSettings};
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Bridge a Bluetooth LE RGB light controller to an MQTT broker
#[derive(Parser, Debug)]
#[command(name = "ledbridge", version, author, long_about = None)]
struct Args {
    /// Path to ledbridge.toml (searched for when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override a config value, e.g. `--set mqtt.port=1884` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    // --debug-<crate> flags are open-ended, so they bypass clap
    let (debug_args, cli_args): (Vec<String>, Vec<String>) =
        std::env::args().partition(|arg| arg.starts_with("--debug-"));
    let matches = Args::command()
        .after_help(debug_flags_help())
        .get_matches_from(cli_args);
    let args = Args::from_arg_matches(&matches)?;
    let debug_flags = parse_debug_flags(debug_args);

    let overrides = parse_overrides(&args.overrides)?;
    let config = load_config(args.config.as_deref(), Some(&overrides))
        .context("failed to load configuration")?;
    validate_config(&config).context("invalid configuration")?;

    let logging = LoggingSettings {
        level: config.logging.level.clone(),
        format: config.logging.format.parse()?,
        directory: config.logging.directory.clone(),
    };
    let _guard = init_logging(&logging, &debug_flags)?;

    info!(target: "ledbridge-agent", "ledbridge v{} starting", ledbridge_agent::VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(run(config));

    match &result {
        Ok(()) => info!(target: "ledbridge-agent", "ledbridge stopped"),
        Err(e) => error!(target: "ledbridge-agent", "ledbridge failed: {:#}", e),
    }
    result
}

fn parse_overrides(raw: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut overrides = HashMap::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            bail!("--set expects KEY=VALUE, got '{}'", item);
        };
        overrides.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(overrides)
}

async fn run(config: LedbridgeConfig) -> anyhow::Result<()> {
    let bridge = Bridge::from_config(&config)?;
    let transport = Arc::new(BleTransport::from_config(&config.device)?);
    let mqtt = MqttBinding::new(&config);
    let sink: Arc<dyn StateSink> = Arc::new(mqtt.state_sink());

    let (inbound_tx, inbound_rx) = mpsc::channel(config.mqtt.inbound_queue);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mqtt_task = tokio::spawn(mqtt.run(
        inbound_tx,
        bridge.store(),
        bridge.link().subscribe(),
        shutdown_rx.clone(),
    ));
    let mut bridge_task = tokio::spawn(bridge.run(transport, sink, inbound_rx, shutdown_rx));

    let finished_early = tokio::select! {
        _ = wait_for_signal() => None,
        result = &mut bridge_task => Some(result),
    };

    info!(target: "ledbridge-agent", "Shutting down");
    let _ = shutdown_tx.send(true);

    let bridge_result = match finished_early {
        Some(result) => result,
        None => bridge_task.await,
    };
    if let Err(e) = mqtt_task.await {
        warn!(target: "ledbridge-agent", "MQTT task ended abnormally: {}", e);
    }

    bridge_result.context("bridge task panicked")??;
    Ok(())
}

/// SIGINT, or SIGTERM on unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = signal::ctrl_c() => log_signal_result(result, "SIGINT"),
                    _ = term.recv() => info!(target: "ledbridge-agent", "Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!(target: "ledbridge-agent", "Cannot listen for SIGTERM: {}", e),
        }
    }

    log_signal_result(signal::ctrl_c().await, "SIGINT");
}

fn log_signal_result(result: std::io::Result<()>, name: &str) {
    match result {
        Ok(()) => info!(target: "ledbridge-agent", "Received {}", name),
        Err(e) => error!(target: "ledbridge-agent", "Signal handler failed ({}); shutting down", e),
    }
}
