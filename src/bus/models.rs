//! Wire formats exchanged with the node server and the bus server

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Channel type of the storage service that carries audio records.
pub const STORAGE_SERVICE: u32 = 8;

/// Message type of a delivered supply.
pub const MESSAGE_SUPPLY: &str = "Supply";
/// Message type sent after connecting to subscribe to a channel.
pub const MESSAGE_SUBSCRIBE: &str = "Subscribe";

/// Outer frame of every websocket text message.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WireMessage {
    #[serde(rename = "MessageType")]
    pub message_type: String,
    #[serde(rename = "Data", default)]
    pub data: Option<serde_json::Value>,
}

/// A published supply as delivered by the bus.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Supply {
    #[serde(rename = "Id", default)]
    pub id: u64,
    #[serde(rename = "SenderId", default)]
    pub sender_id: u64,
    #[serde(rename = "SupplyName", default)]
    pub supply_name: String,
    #[serde(rename = "Cdata", default)]
    pub cdata: Option<Content>,
}

/// Opaque content attached to a supply.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Content {
    #[serde(rename = "Entity", with = "base64_bytes")]
    pub entity: Vec<u8>,
}

/// What the subscription callback sees of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub supply_name: String,
    pub payload: Option<Vec<u8>>,
}

impl From<Supply> for Envelope {
    fn from(supply: Supply) -> Self {
        Envelope {
            supply_name: supply.supply_name,
            payload: supply.cdata.map(|c| c.entity),
        }
    }
}

/// The record schema published on the storage channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AudioRecord {
    #[serde(rename = "Bucket", default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Raw little-endian 32-bit float PCM.
    #[serde(rename = "Samples", with = "base64_bytes")]
    pub samples: Vec<u8>,
}

impl AudioRecord {
    /// Decodes an envelope payload into a record.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Body of the `Subscribe` message.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubscribeData {
    #[serde(rename = "NodeId")]
    pub node_id: String,
    #[serde(rename = "ChannelType")]
    pub channel_type: u32,
    #[serde(rename = "Arguments", default)]
    pub arguments: String,
}

/// Node registration request sent to the node server.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegisterRequest {
    #[serde(rename = "NodeName")]
    pub node_name: String,
    #[serde(rename = "NodeId")]
    pub node_id: String,
    #[serde(rename = "ChannelTypes")]
    pub channel_types: Vec<u32>,
}

/// Node server reply naming the bus server to connect to.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegisterResponse {
    #[serde(rename = "ServerUrl")]
    pub server_url: String,
}

/// Serde adapter storing bytes as standard base64 text.
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}
