use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Role of a message author.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the whole conversation.
    System,

    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Capitalized name used when showing history.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// A single chat message.
///
/// The JSON form is `{"role": ..., "content": ...}` both on the wire and in
/// the conversation file, so history round-trips without transformation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// The role of the message.
    pub role: Role,

    /// The text of the message.
    pub content: String,
}

impl Message {
    /// Create a new `Message` with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new system `Message`.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user `Message`.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant `Message`.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Encode as a two-field JSON object.  Never fails.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "role": self.role.as_str(),
            "content": self.content,
        })
    }

    /// Decode from a JSON object with string `role` and `content` fields.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::malformed_message(format!(
                "expected an object, found {value}"
            )));
        };
        let role = match object.get("role") {
            Some(Value::String(role)) => role,
            Some(other) => {
                return Err(Error::malformed_message(format!(
                    "role must be a string, found {other}"
                )));
            }
            None => return Err(Error::malformed_message("missing role")),
        };
        let role = match role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => {
                return Err(Error::malformed_message(format!("unknown role {other:?}")));
            }
        };
        let content = match object.get("content") {
            Some(Value::String(content)) => content.clone(),
            Some(other) => {
                return Err(Error::malformed_message(format!(
                    "content must be a string, found {other}"
                )));
            }
            None => return Err(Error::malformed_message("missing content")),
        };
        Ok(Self { role, content })
    }
}

/// Encode an ordered message sequence as a JSON array.
pub fn encode_messages(messages: &[Message]) -> Value {
    Value::Array(messages.iter().map(Message::to_json).collect())
}

/// Decode a JSON array into an ordered message sequence.
pub fn decode_messages(value: &Value) -> Result<Vec<Message>> {
    let Some(items) = value.as_array() else {
        return Err(Error::malformed_message(format!(
            "expected an array of messages, found {value}"
        )));
    };
    items.iter().map(Message::from_json).collect()
}
