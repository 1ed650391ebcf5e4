//! Decoded dispatch event

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::GatewayEventType;

/// A dispatch frame after decoding, as handed to event handlers
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    /// Shard that received the event
    pub shard_id: u32,
    /// Wire name (`t`)
    pub name: String,
    /// Sequence number (`s`)
    pub sequence: Option<u64>,
    /// Event body (`d`)
    pub data: Value,
}

impl GatewayEvent {
    pub fn new(shard_id: u32, name: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            shard_id,
            name: name.into(),
            sequence,
            data,
        }
    }

    /// Known event type, if any
    pub fn kind(&self) -> Option<GatewayEventType> {
        GatewayEventType::from_str(&self.name)
    }

    pub fn is(&self, kind: GatewayEventType) -> bool {
        self.name == kind.as_str()
    }

    /// Decode the body into a typed value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}
