//! Chat message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Author of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The person asking.
    User,
    /// The language model answering.
    Assistant,
}

/// A message in a conversation.
///
/// The assistant message is created empty alongside its stream session and
/// is the artifact that survives once the session ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id, or a `local-` placeholder until one is known.
    pub id: String,
    /// Author of the message.
    pub role: Role,
    /// Message text (markdown).
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Free-form metadata (`aborted`, `error`, `references`, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// Construct a user message with a local placeholder id.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, local_id(), content.into())
    }

    /// Construct an empty assistant message bound to `local_id`.
    #[must_use]
    pub fn assistant_placeholder(local_id: impl Into<String>) -> Self {
        Self::new(Role::Assistant, local_id.into(), String::new())
    }

    fn new(role: Role, id: String, content: String) -> Self {
        Self {
            id,
            role,
            content,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Whether the id is still a client-side placeholder.
    #[must_use]
    pub fn has_local_id(&self) -> bool {
        self.id.starts_with(LOCAL_ID_PREFIX)
    }
}

const LOCAL_ID_PREFIX: &str = "local-";

/// Generate a client-side placeholder id.
#[must_use]
pub fn local_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}
