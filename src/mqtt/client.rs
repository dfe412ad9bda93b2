use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, Incoming, MqttOptions, Outgoing, QoS,
    SubscribeReasonCode,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connection::{Backoff, ConnectionState, ConnectionTracker, rpc_request_id};
use crate::config::Config;
use crate::error::{ConnectionError, PublishError};

const REQUEST_CHANNEL_CAPACITY: usize = 100;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// An RPC request delivered by the broker.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub request_id: String,
    pub payload: Vec<u8>,
}

/// Non-blocking hand-off of a QoS 1 publish to the transport.
pub trait Outbound: Send + Sync {
    fn enqueue(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClientError>;
}

impl Outbound for AsyncClient {
    fn enqueue(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClientError> {
        self.try_publish(topic, QoS::AtLeastOnce, false, payload)
    }
}

/// Cloneable publish handle shared by the telemetry loop and the command
/// dispatcher. Publishing while not connected drops the message.
#[derive(Clone)]
pub struct Publisher {
    outbound: Arc<dyn Outbound>,
    state: watch::Receiver<ConnectionState>,
}

impl Publisher {
    pub fn new(outbound: Arc<dyn Outbound>, state: watch::Receiver<ConnectionState>) -> Self {
        Self { outbound, state }
    }

    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let state = *self.state.borrow();
        let result = if state.can_publish() {
            let len = payload.len();
            self.outbound
                .enqueue(topic, payload)
                .map(|()| len)
                .map_err(PublishError::from)
        } else {
            Err(PublishError::NotConnected(state))
        };

        match result {
            Ok(len) => {
                debug!("Published {} ({} bytes)", topic, len);
                Ok(())
            }
            Err(e) => {
                warn!("Dropped publish to {}: {}", topic, e);
                Err(e)
            }
        }
    }

    pub fn publish_json<T: Serialize>(&self, topic: &str, value: &T) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, payload)
    }
}

/// Owns the single broker session: connects, re-subscribes after every
/// reconnect, and forwards RPC requests to the dispatcher.
pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    tracker: ConnectionTracker,
    backoff: Backoff,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl MqttClient {
    pub fn new(config: &Config, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        let mut mqttopts = MqttOptions::new(
            &config.mqtt.client_id,
            &config.mqtt.broker_host,
            config.mqtt.broker_port,
        );
        mqttopts.set_keep_alive(Duration::from_secs(u64::from(config.mqtt.keep_alive_secs)));
        mqttopts.set_clean_session(true);
        mqttopts.set_credentials(&config.mqtt.username, &config.mqtt.access_token);

        let (client, eventloop) = AsyncClient::new(mqttopts, REQUEST_CHANNEL_CAPACITY);

        Self {
            client,
            eventloop,
            tracker: ConnectionTracker::new(),
            backoff: Backoff::new(
                INITIAL_BACKOFF,
                Duration::from_secs(config.mqtt.max_backoff_secs),
            ),
            inbound_tx,
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(Arc::new(self.client.clone()), self.tracker.subscribe())
    }

    /// Drive the session until `cancel` fires. Transport failures never end
    /// the loop; they move the session back to connecting and back off.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.tracker.connecting();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.eventloop.poll() => {
                    match event {
                        Ok(event) => self.handle_event(event),
                        Err(e) => {
                            let delay = self.handle_error(ConnectionError::from(e));
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }

        self.shutdown().await;
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Incoming::ConnAck(_)) => {
                self.backoff.reset();
                let filter = self.tracker.connack();
                if let Err(e) = self.client.try_subscribe(filter, QoS::AtLeastOnce) {
                    error!("Failed to subscribe to {}: {}", filter, e);
                }
            }
            Event::Incoming(Incoming::SubAck(suback)) => {
                let granted = suback
                    .return_codes
                    .iter()
                    .all(|code| matches!(code, SubscribeReasonCode::Success(_)));
                self.tracker.suback(granted);
            }
            Event::Incoming(Incoming::Publish(publish)) => {
                let Some(request_id) = rpc_request_id(&publish.topic) else {
                    debug!("Discarding message on unexpected topic {}", publish.topic);
                    return;
                };
                let msg = InboundMessage {
                    request_id: request_id.to_string(),
                    payload: publish.payload.to_vec(),
                };
                if let Err(e) = self.inbound_tx.try_send(msg) {
                    warn!("Dropping RPC request {}: {}", request_id, e);
                }
            }
            Event::Incoming(Incoming::Disconnect) => {
                self.tracker.dropped();
            }
            _ => {}
        }
    }

    fn handle_error(&mut self, err: ConnectionError) -> Duration {
        self.tracker.dropped();
        let delay = self.backoff.next_delay();
        warn!("MQTT connection error: {}. Reconnecting in {:?}", err, delay);
        delay
    }

    async fn shutdown(mut self) {
        if self.tracker.state().can_publish() {
            if let Err(e) = self.client.try_disconnect() {
                warn!("Failed to queue MQTT disconnect: {}", e);
            } else {
                let flush = async {
                    loop {
                        match self.eventloop.poll().await {
                            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                };
                if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await.is_err() {
                    warn!("Timed out flushing MQTT disconnect");
                }
            }
        }
        self.tracker.closed();
        info!("MQTT session closed");
    }
}
