use crate::connection::UserId;
use crate::error::Error;
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event name carried by heartbeat frames so clients can tell them apart from data.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// A single chunk written to a client's streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `data: <json>\n\n`
    Data(Value),
    /// `event: heartbeat\ndata: \n\n`
    Heartbeat,
}

impl Frame {
    /// Initial frame written as soon as a client subscribes.
    pub fn connected() -> Self {
        Frame::Data(json!({ "type": "connected" }))
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Frame::Heartbeat)
    }

    /// Encodes the frame using Server-Sent-Events framing.
    ///
    /// Compact JSON never contains a raw newline, so a data payload always
    /// fits on a single `data:` line.
    pub fn encode(&self) -> String {
        match self {
            Frame::Data(payload) => format!("data: {payload}\n\n"),
            Frame::Heartbeat => format!("event: {HEARTBEAT_EVENT}\ndata: \n\n"),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode())
    }
}

/// Typed notification payloads produced from domain events.
///
/// Serialized as `{"type": "<name>", "data": {...}}`, the shape clients
/// switch on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    BillCreated { bill_id: String, bill: Value },
    PaymentReceived { bill_id: String, payment: Value },
    ReminderSent { bill_id: String, reminder: Value },
    BillSettled { bill_id: String },
}

impl Event {
    pub fn to_payload(&self) -> Result<Value, Error> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Wire shape published on the shared pub/sub channel: `{"userId": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub user_id: UserId,
    pub data: Value,
}

impl Envelope {
    pub fn new(user_id: impl Into<UserId>, data: Value) -> Self {
        Self {
            user_id: user_id.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a message received from the broker. Anything that is not a
    /// `{userId, data}` object with a non-empty user id is rejected.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        if envelope.user_id.is_empty() {
            return Err(<serde_json::Error as serde::de::Error>::custom("empty userId").into());
        }
        Ok(envelope)
    }
}
