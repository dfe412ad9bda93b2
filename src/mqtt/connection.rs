use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

pub const TELEMETRY_TOPIC: &str = "v1/devices/me/telemetry";
pub const ATTRIBUTES_TOPIC: &str = "v1/devices/me/attributes";
pub const RPC_REQUEST_FILTER: &str = "v1/devices/me/rpc/request/+";

const RPC_REQUEST_PREFIX: &str = "v1/devices/me/rpc/request/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl ConnectionState {
    /// Whether outbound publishes are accepted in this state.
    pub fn can_publish(self) -> bool {
        matches!(self, Self::Connected | Self::Subscribed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
        };
        f.write_str(name)
    }
}

/// Owns the session state and broadcasts every change to watchers. Pure
/// bookkeeping: the event loop in `client` feeds broker events in and sends
/// the subscription it asks for.
pub struct ConnectionTracker {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    fn transition(&self, next: ConnectionState) {
        let prev = self.tx.send_replace(next);
        if prev != next {
            info!("MQTT connection state: {} -> {}", prev, next);
        }
    }

    /// A connect attempt is starting, either the first one or after a drop.
    pub fn connecting(&self) {
        self.transition(ConnectionState::Connecting);
    }

    /// The broker accepted the session. Returns the filter to subscribe:
    /// subscriptions do not survive a clean session, so every ConnAck
    /// re-subscribes.
    pub fn connack(&self) -> &'static str {
        self.transition(ConnectionState::Connected);
        RPC_REQUEST_FILTER
    }

    /// `granted` is false when the broker refused the filter.
    pub fn suback(&self, granted: bool) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        if granted {
            self.transition(ConnectionState::Subscribed);
        } else {
            error!("Broker rejected subscription to {}", RPC_REQUEST_FILTER);
        }
    }

    /// Transport-level failure: the client will reconnect on its next poll.
    pub fn dropped(&self) {
        if self.state() != ConnectionState::Disconnected {
            self.transition(ConnectionState::Connecting);
        }
    }

    /// Deliberate close on shutdown.
    pub fn closed(&self) {
        self.transition(ConnectionState::Disconnected);
    }
}

/// Exponential reconnect delay: 1s, 2s, 4s, ... up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial.min(max),
        }
    }

    /// Delay to wait now; doubles the delay for the following call.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }
}

/// Extract the request id from `v1/devices/me/rpc/request/{id}`.
pub fn rpc_request_id(topic: &str) -> Option<&str> {
    let id = topic.strip_prefix(RPC_REQUEST_PREFIX)?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}
