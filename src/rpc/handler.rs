use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{AttributeUpdate, RpcRequest};
use crate::device::{DeviceState, VALUE_ATTRIBUTE};
use crate::error::DecodeError;
use crate::mqtt::{ATTRIBUTES_TOPIC, InboundMessage, Publisher};

const SET_VALUE: &str = "setValue";

/// A validated request, ready to apply.
#[derive(Debug, PartialEq)]
pub enum Command {
    SetValue(Value),
}

/// Validate an RPC payload. Only decoding and validation fail here; applying
/// a command happens afterwards and is not covered by this error.
pub fn decode(payload: &[u8]) -> Result<Command, DecodeError> {
    let request: RpcRequest = serde_json::from_slice(payload)?;
    let method = request.method.ok_or(DecodeError::MissingMethod)?;
    match method.as_str() {
        SET_VALUE => request
            .params
            .map(Command::SetValue)
            .ok_or(DecodeError::MissingParams(method)),
        _ => Err(DecodeError::UnknownMethod(method)),
    }
}

pub struct CommandHandler {
    state: Arc<DeviceState>,
}

impl CommandHandler {
    pub fn new(state: Arc<DeviceState>) -> Self {
        Self { state }
    }

    /// Apply a `setValue` request to the device state. Anything that does not
    /// decode to a known command is logged and leaves the state untouched.
    pub fn handle(&self, payload: &[u8]) -> Option<AttributeUpdate> {
        let command = match decode(payload) {
            Ok(command) => command,
            Err(e) => {
                debug!("Discarding RPC request: {}", e);
                return None;
            }
        };

        match command {
            Command::SetValue(value) => {
                self.state.set_attribute(VALUE_ATTRIBUTE, value.clone());
                info!("Applied setValue: {}", value);
                Some(AttributeUpdate { value })
            }
        }
    }

    /// Consume RPC requests until cancelled, reporting each applied command
    /// on the attributes topic.
    pub async fn run(
        self,
        mut inbound_rx: mpsc::Receiver<InboundMessage>,
        publisher: Publisher,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = inbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    debug!(
                        "Received RPC request {}: {}",
                        msg.request_id,
                        String::from_utf8_lossy(&msg.payload)
                    );
                    if let Some(update) = self.handle(&msg.payload) {
                        // Drop-on-disconnect is logged by the publisher.
                        let _ = publisher.publish_json(ATTRIBUTES_TOPIC, &update);
                    }
                }
            }
        }
        debug!("Command dispatcher stopped");
    }
}
