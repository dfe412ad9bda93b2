use std::sync::{Arc, Mutex};

use rumqttc::ClientError;
use tokio::sync::watch;

use crate::mqtt::client::Outbound;
use crate::mqtt::{ConnectionState, Publisher};

/// Records every enqueued publish instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingOutbound {
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<serde_json::Value> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| serde_json::from_slice(&payload).unwrap())
            .collect()
    }
}

impl Outbound for RecordingOutbound {
    fn enqueue(&self, topic: &str, payload: Vec<u8>) -> Result<(), ClientError> {
        self.sent.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

/// A publisher backed by a [`RecordingOutbound`], with the connection state
/// driven by the returned sender.
pub fn recording_publisher(
    initial: ConnectionState,
) -> (
    Publisher,
    Arc<RecordingOutbound>,
    watch::Sender<ConnectionState>,
) {
    let outbound = Arc::new(RecordingOutbound::default());
    let (tx, rx) = watch::channel(initial);
    (Publisher::new(outbound.clone(), rx), outbound, tx)
}
