//! Out-of-band progress notifications and their correlation to sessions.
//!
//! Progress records arrive on a channel independent of the answer stream
//! and carry no ordering guarantee relative to chunks. They are matched to
//! a live session purely by identity, in this order:
//!
//! 1. `clientRequestId`, when both sides carry one;
//! 2. `assistantMessageId`, when both sides carry one;
//! 3. `conversationId`, where a session still waiting for its id matches a
//!    notification that does not know the conversation either.
//!
//! The first rule whose fields are present on both sides decides; a
//! notification no rule accepts is dropped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::deserialize_lenient_id;
use crate::{AppError, Result};

/// Record tag used on the progress channel.
pub const PROGRESS_EVENT: &str = "chat_progress";

/// Capacity of the progress fan-out; slow receivers skip older records.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

/// A stage update for an in-flight answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    /// Request id of the answer, when the emitter knows it.
    #[serde(default, alias = "client_request_id")]
    pub client_request_id: Option<String>,
    /// Assistant message id, when the emitter knows it.
    #[serde(
        default,
        alias = "assistant_message_id",
        deserialize_with = "deserialize_lenient_id"
    )]
    pub assistant_message_id: Option<i64>,
    /// Conversation id, when the emitter knows it.
    #[serde(default, alias = "conversation_id", deserialize_with = "deserialize_lenient_id")]
    pub conversation_id: Option<i64>,
    /// Pipeline step (`retrieve`, `rerank`, `generate`, ...).
    #[serde(default)]
    pub step: Option<String>,
    /// Step status (`running`, `done`, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Human-readable stage message.
    #[serde(default)]
    pub message: String,
}

impl ProgressNotification {
    /// Parse a raw progress-channel record.
    ///
    /// Returns `Ok(None)` for records tagged with anything other than
    /// [`PROGRESS_EVENT`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Decode`] when a `chat_progress` record has
    /// ill-typed fields.
    pub fn from_record(record: &Value) -> Result<Option<Self>> {
        match record.get("event").and_then(Value::as_str) {
            Some(PROGRESS_EVENT) => {}
            other => {
                debug!(event = ?other, "progress channel: skipping non-progress record");
                return Ok(None);
            }
        }
        serde_json::from_value(record.clone())
            .map(Some)
            .map_err(|e| AppError::Decode(format!("invalid progress record: {e}")))
    }
}

/// Identity fields of a live session, as seen by the correlator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIdentity<'a> {
    /// Request id generated when the question was submitted.
    pub client_request_id: Option<&'a str>,
    /// Assistant message id, once bound.
    pub assistant_message_id: Option<i64>,
    /// Conversation id, once bound.
    pub conversation_id: Option<i64>,
}

/// Which identity rule accepted a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Request ids are equal.
    ClientRequestId,
    /// Assistant message ids are equal.
    AssistantMessageId,
    /// Conversation ids are equal, or both are still unknown.
    ConversationId,
}

/// Decide whether `note` belongs to the session identified by `session`.
///
/// Rules are tried in order and the first one that matches wins. A rule
/// that does not match hands over to the next.
#[must_use]
pub fn correlate(session: SessionIdentity<'_>, note: &ProgressNotification) -> Option<MatchRule> {
    let note_request = note
        .client_request_id
        .as_deref()
        .filter(|id| !id.is_empty());
    if note_request.is_some() && session.client_request_id == note_request {
        return Some(MatchRule::ClientRequestId);
    }

    if note.assistant_message_id.is_some()
        && session.assistant_message_id == note.assistant_message_id
    {
        return Some(MatchRule::AssistantMessageId);
    }

    match (session.conversation_id, note.conversation_id) {
        (Some(ours), Some(theirs)) if ours == theirs => Some(MatchRule::ConversationId),
        (None, None) => Some(MatchRule::ConversationId),
        _ => None,
    }
}

/// Fan-out for progress notifications pushed by collaborators.
///
/// Every live turn subscribes and applies the notifications that correlate
/// to its own session.
#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    tx: broadcast::Sender<ProgressNotification>,
}

impl ProgressPublisher {
    /// Create a publisher with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Push a notification to every live turn. Returns the number of
    /// turns that received it.
    pub fn publish(&self, note: ProgressNotification) -> usize {
        self.tx.send(note).unwrap_or(0)
    }

    /// Parse and push a raw progress-channel record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Decode`] for malformed `chat_progress` records.
    pub fn publish_record(&self, record: &Value) -> Result<usize> {
        Ok(ProgressNotification::from_record(record)?.map_or(0, |note| self.publish(note)))
    }

    /// Subscribe to notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressNotification> {
        self.tx.subscribe()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new()
    }
}
