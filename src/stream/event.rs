//! Classification of decoded frames into typed stream events.
//!
//! Every frame payload goes through [`interpret_frame`] exactly once; code
//! downstream of it only ever sees a [`StreamEvent`] and never inspects raw
//! payload shape again.
//!
//! # Wire shapes
//!
//! | Payload                                        | Maps to                          |
//! |------------------------------------------------|----------------------------------|
//! | `[DONE]`                                       | [`StreamEvent::Done`] (empty)    |
//! | `{"event":"meta","data":{...}}`                | [`StreamEvent::Meta`]            |
//! | `{"event":"chunk","data":{"delta":"..."}}`     | [`StreamEvent::Chunk`]           |
//! | `{"event":"progress" / "chat_progress",...}`   | [`StreamEvent::Progress`]        |
//! | `{"event":"done","data":{...}}`                | [`StreamEvent::Done`]            |
//! | `{"event":"error","data":{"message":"..."}}`   | [`StreamEvent::Error`]           |
//! | `{"choices":[{"delta":{"content":"..."}}]}`    | [`StreamEvent::PassthroughDelta`]|
//! | *(any other tag)*                              | Skipped; logged at `DEBUG`       |
//!
//! The tag is read from the payload's `event` (or `type`) field, falling
//! back to the frame's `event:` line. Fields may sit under `data` or at
//! the top level of the payload.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::deserialize_lenient_id;
use crate::session::progress::ProgressNotification;
use crate::stream::codec::Frame;
use crate::{AppError, Result};

/// Sentinel payload used by upstream-compatible streams to end an answer.
pub const DONE_SENTINEL: &str = "[DONE]";

/// SSE's implicit event type; a frame naming it carries no chat tag.
const SSE_DEFAULT_EVENT: &str = "message";

/// Identity bindings announced at the start of an answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaPayload {
    /// Durable conversation id.
    #[serde(default, alias = "conversation_id", deserialize_with = "deserialize_lenient_id")]
    pub conversation_id: Option<i64>,
    /// Server id of the assistant message being streamed.
    #[serde(
        default,
        alias = "assistant_message_id",
        deserialize_with = "deserialize_lenient_id"
    )]
    pub assistant_message_id: Option<i64>,
    /// Echo of the request id the client sent.
    #[serde(default, alias = "client_request_id")]
    pub client_request_id: Option<String>,
    /// Extra metadata merged into the session.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// Final bindings and content sent when an answer completes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonePayload {
    /// Durable conversation id.
    #[serde(default, alias = "conversation_id", deserialize_with = "deserialize_lenient_id")]
    pub conversation_id: Option<i64>,
    /// Authoritative final content; the accumulated buffer is used when absent.
    #[serde(default)]
    pub content: Option<String>,
    /// Server id of the assistant message.
    #[serde(
        default,
        alias = "assistant_message_id",
        deserialize_with = "deserialize_lenient_id"
    )]
    pub assistant_message_id: Option<i64>,
    /// Extra metadata merged into the session.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// A typed event decoded from the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Identity bindings for the session.
    Meta(MetaPayload),
    /// A piece of answer text.
    Chunk {
        /// Text to append.
        delta: String,
    },
    /// Stage update for the in-flight answer.
    Progress(ProgressNotification),
    /// The answer is complete.
    Done(DonePayload),
    /// The service reported a failure.
    Error {
        /// Human-readable failure message.
        message: String,
    },
    /// Answer text in chat-completion shape (`choices[0].delta.content`).
    PassthroughDelta {
        /// Text to append.
        delta: String,
    },
}

impl StreamEvent {
    /// Short name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Meta(_) => "meta",
            Self::Chunk { .. } => "chunk",
            Self::Progress(_) => "progress",
            Self::Done(_) => "done",
            Self::Error { .. } => "error",
            Self::PassthroughDelta { .. } => "passthrough_delta",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChunkData {
    #[serde(default, alias = "content")]
    delta: String,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Classify one decoded frame.
///
/// # Return value
///
/// - `Ok(Some(event))`: the frame carries a recognized event.
/// - `Ok(None)`: keep-alive frame, empty chunk, or unknown tag
///   (silently skipped; unknown tags are logged at `DEBUG` level).
/// - `Err(AppError::Decode(...))`: the payload is not valid JSON or a
///   recognized event has an ill-typed field.
///
/// # Errors
///
/// Returns [`AppError::Decode`] for malformed payloads. Callers drop the
/// frame and keep decoding.
pub fn interpret_frame(frame: &Frame) -> Result<Option<StreamEvent>> {
    let Some(payload) = frame.payload() else {
        return Ok(None);
    };
    interpret_payload(frame.event.as_deref(), &payload)
}

/// Classify a joined `data:` payload, with the frame's `event:` line as a
/// fallback tag.
///
/// # Errors
///
/// Returns [`AppError::Decode`] for malformed payloads.
pub fn interpret_payload(frame_event: Option<&str>, payload: &str) -> Result<Option<StreamEvent>> {
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(Some(StreamEvent::Done(DonePayload::default())));
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| AppError::Decode(format!("malformed json: {e}")))?;

    let tag = value
        .get("event")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .or(frame_event.filter(|event| *event != SSE_DEFAULT_EVENT));

    let Some(tag) = tag else {
        return Ok(passthrough_delta(&value));
    };

    let data = value.get("data").cloned().unwrap_or_else(|| value.clone());

    match tag {
        "meta" => Ok(Some(StreamEvent::Meta(decode_field(tag, data)?))),
        "chunk" => {
            let chunk: ChunkData = decode_field(tag, data)?;
            if chunk.delta.is_empty() {
                Ok(None)
            } else {
                Ok(Some(StreamEvent::Chunk { delta: chunk.delta }))
            }
        }
        "progress" | "chat_progress" => {
            Ok(Some(StreamEvent::Progress(decode_field(tag, data)?)))
        }
        "done" => Ok(Some(StreamEvent::Done(decode_field(tag, data)?))),
        "error" => {
            let err: ErrorData = decode_field(tag, data)?;
            Ok(Some(StreamEvent::Error {
                message: err
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "the service reported an error".to_owned()),
            }))
        }
        other => {
            debug!(event = other, "stream reader: skipping unknown event tag");
            Ok(None)
        }
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn decode_field<T>(tag: &str, data: Value) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let data = if data.is_null() {
        Value::Object(Map::new())
    } else {
        data
    };
    serde_json::from_value(data)
        .map_err(|e| AppError::Decode(format!("invalid {tag} payload: {e}")))
}

/// Extract `choices[0].delta.content` from a chat-completion chunk.
fn passthrough_delta(value: &Value) -> Option<StreamEvent> {
    let delta = value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)?;
    if delta.is_empty() {
        return None;
    }
    Some(StreamEvent::PassthroughDelta {
        delta: delta.to_owned(),
    })
}
