pub mod config;
pub mod device;
pub mod error;
pub mod mqtt;
pub mod rpc;
pub mod telemetry;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::DeviceState;
use crate::mqtt::{InboundMessage, Publisher};
use crate::rpc::handler::CommandHandler;
use crate::telemetry::TelemetryLoop;

/// Start the telemetry loop and the RPC dispatcher. Both share `state` and
/// stop when `cancel` fires.
pub fn spawn_device_tasks(
    state: Arc<DeviceState>,
    publisher: Publisher,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    interval: Duration,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let telemetry = TelemetryLoop::new(Arc::clone(&state), publisher.clone(), interval);
    let commands = CommandHandler::new(state);

    vec![
        tokio::spawn(telemetry.run(cancel.clone())),
        tokio::spawn(commands.run(inbound_rx, publisher, cancel.clone())),
    ]
}
