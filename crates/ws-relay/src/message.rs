//! Wire format for relayed messages
//!
//! Frames are JSON objects. `toUserId` names the recipient; the relay stamps
//! `fromUserId` with the sender's session identity before forwarding. Every
//! other field is opaque and forwarded untouched, in its original order.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field naming the recipient
pub const TO_USER_ID: &str = "toUserId";
/// Field the relay stamps with the sender identity
pub const FROM_USER_ID: &str = "fromUserId";

/// A parsed inbound frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    fields: Map<String, Value>,
}

impl InboundMessage {
    /// Parse a raw text frame
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(Error::Parse("empty payload".to_string()));
        }
        match serde_json::from_str::<Value>(raw)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::Parse(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Recipient named by the payload.
    ///
    /// Numbers and booleans are read as their text form, so `42` addresses
    /// user `"42"`. Null, arrays and objects count as absent.
    pub fn to_user_id(&self) -> Option<String> {
        match self.fields.get(TO_USER_ID)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Sender identity, if one has been stamped (or claimed by the payload)
    pub fn from_user_id(&self) -> Option<&str> {
        self.fields.get(FROM_USER_ID).and_then(Value::as_str)
    }

    /// Overwrite the sender identity. Whatever the payload claimed is dropped.
    pub fn with_sender(mut self, user_id: &str) -> Self {
        self.fields.retain(|key, _| key != FROM_USER_ID);
        self.fields
            .insert(FROM_USER_ID.to_string(), Value::String(user_id.to_string()));
        self
    }

    /// Opaque field lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Serialize back to a text frame
    pub fn to_wire(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// True for empty or whitespace-only identities
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
