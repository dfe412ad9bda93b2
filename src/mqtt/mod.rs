pub mod client;
pub mod connection;

pub use client::{InboundMessage, MqttClient, Publisher};
pub use connection::{ATTRIBUTES_TOPIC, ConnectionState, TELEMETRY_TOPIC};
