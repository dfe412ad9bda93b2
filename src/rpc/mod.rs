pub mod handler;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decoded body of a message on `v1/devices/me/rpc/request/{id}`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub method: Option<String>,
    /// `null` and absent both decode to `None`.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Report of an applied command, published to `v1/devices/me/attributes`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeUpdate {
    pub value: Value,
}
