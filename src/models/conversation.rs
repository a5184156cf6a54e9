//! Conversation records owned by the knowledge-base service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::Role;
use super::{deserialize_id_string, deserialize_lenient_id};

/// Conversation summary as returned by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Durable conversation id.
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub id: Option<i64>,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Last update time as sent by the service.
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<String>,
}

/// A persisted message inside a conversation detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Server-assigned message id.
    #[serde(deserialize_with = "deserialize_id_string")]
    pub id: String,
    /// Author.
    pub role: Role,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Creation time as sent by the service.
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Conversation with its messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    /// Summary fields.
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Messages in chronological order.
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}
