use thiserror::Error;

/// Startup configuration problems. The only error that terminates the process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be > 0")]
    Zero(&'static str),
}

/// The transport could not establish or keep a session with the broker.
#[derive(Debug, Error)]
#[error("broker connection failed: {0}")]
pub struct ConnectionError(#[from] pub rumqttc::ConnectionError);

/// An inbound RPC payload that cannot be acted on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("payload has no method")]
    MissingMethod,

    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    #[error("method {0:?} requires params")]
    MissingParams(String),
}

/// An outbound message that was dropped instead of sent.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("not connected (state: {0})")]
    NotConnected(crate::mqtt::ConnectionState),

    #[error("client rejected request: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}
