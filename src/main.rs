use std::sync::Arc;

use coreiot_agent::device::DeviceState;
use coreiot_agent::mqtt::{InboundMessage, MqttClient};
use coreiot_agent::{config, spawn_device_tasks};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const INBOUND_CHANNEL_CAPACITY: usize = 32;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting coreiot-agent (mqtt={}:{}, client_id={}, telemetry every {}s)",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        config.mqtt.client_id,
        config.telemetry.interval_secs,
    );

    let cancel = CancellationToken::new();
    let state = Arc::new(DeviceState::default());
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_CHANNEL_CAPACITY);

    let mqtt_client = MqttClient::new(&config, inbound_tx);
    let publisher = mqtt_client.publisher();
    let mqtt_handle = tokio::spawn(mqtt_client.run(cancel.clone()));

    let device_handles = spawn_device_tasks(
        state,
        publisher,
        inbound_rx,
        config.telemetry_interval(),
        &cancel,
    );

    shutdown_signal().await;
    cancel.cancel();

    for handle in device_handles {
        if let Err(e) = handle.await {
            warn!("Device task ended abnormally: {}", e);
        }
    }
    if let Err(e) = mqtt_handle.await {
        warn!("MQTT task ended abnormally: {}", e);
    }
    info!("coreiot-agent stopped");
}

async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    let sigint = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = sigint => info!("Received SIGINT, shutting down"),
        _ = sigterm => info!("Received SIGTERM, shutting down"),
    }
}
