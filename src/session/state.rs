//! Stream session state machine.
//!
//! One [`StreamSession`] holds the mutable state of a single streamed
//! answer: its identities, the growing text buffer, the latest stage, and
//! its lifecycle. The orchestrator owns it exclusively for the duration of
//! the answer; decoded events are applied to it in arrival order.
//!
//! ```text
//! Init ──(any event)──▶ Active ──done──▶ Completed
//!   │                     ├──error / transport failure──▶ Failed
//!   └──────abort──────────┴──abort──▶ Aborted
//! ```
//!
//! Terminal states absorb everything: events, progress and abort requests
//! applied after a terminal transition are no-ops.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::models::message::Message;
use crate::models::reference::ReferenceDescriptor;
use crate::session::progress::{ProgressNotification, SessionIdentity};
use crate::session::render::RenderSnapshot;
use crate::stream::event::{DonePayload, MetaPayload, StreamEvent};

/// Metadata key set when the answer was cut short by an abort request.
pub const META_ABORTED: &str = "aborted";
/// Metadata key set when the answer ended in a failure.
pub const META_ERROR: &str = "error";
/// Metadata key carrying the answer's citations.
pub const META_REFERENCES: &str = "references";

/// Lifecycle of a stream session.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created; nothing received yet.
    Init,
    /// Receiving events.
    Active,
    /// Finished normally.
    Completed,
    /// Ended by an upstream or transport error.
    Failed,
    /// Ended by an abort request.
    Aborted,
}

impl LifecycleState {
    /// Whether no further events may be applied.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// Key scoping at-most-one-active-session and progress correlation.
///
/// Moves at most once, from `Pending` to `Id`, and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// Conversation not yet known to the service.
    Pending,
    /// Durable conversation id.
    Id(i64),
}

impl ConversationKey {
    /// Key for an optional conversation id.
    #[must_use]
    pub fn from_id(conversation_id: Option<i64>) -> Self {
        conversation_id.map_or(Self::Pending, Self::Id)
    }
}

impl Display for ConversationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Id(id) => write!(f, "id:{id}"),
        }
    }
}

/// Latest pipeline stage reported for the answer.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Human-readable stage message.
    pub message: String,
    /// Pipeline step.
    pub step: Option<String>,
    /// Step status.
    pub status: Option<String>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Answer completed with content.
    Completed,
    /// Answer completed without any content; nothing is persisted.
    NoContent,
    /// Answer failed; the message carries the partial text or the error.
    Failed {
        /// Failure message.
        message: String,
    },
    /// Answer aborted; the message carries the text received so far.
    Aborted,
}

/// Effect of applying one input to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Non-terminal state changed; re-render.
    Updated,
    /// Nothing changed.
    Unchanged,
    /// The session reached this terminal state.
    Terminated(LifecycleState),
}

/// Mutable state of one in-flight streamed answer.
#[derive(Debug, Clone)]
pub struct StreamSession {
    request_id: String,
    pending_local_id: String,
    conversation_id: Option<i64>,
    conversation_key: ConversationKey,
    assistant_message_id: Option<i64>,
    buffer: String,
    stage: Stage,
    state: LifecycleState,
    metadata: Map<String, Value>,
    outcome: Option<SessionOutcome>,
}

impl StreamSession {
    /// Start a session for `request_id`, shown under `pending_local_id`
    /// until the service assigns a message id.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        pending_local_id: impl Into<String>,
        conversation_id: Option<i64>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            pending_local_id: pending_local_id.into(),
            conversation_id,
            conversation_key: ConversationKey::from_id(conversation_id),
            assistant_message_id: None,
            buffer: String::new(),
            stage: Stage::default(),
            state: LifecycleState::Init,
            metadata: Map::new(),
            outcome: None,
        }
    }

    /// Client request id sent with the question.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Durable conversation id, once bound.
    #[must_use]
    pub fn conversation_id(&self) -> Option<i64> {
        self.conversation_id
    }

    /// Current conversation key.
    #[must_use]
    pub fn conversation_key(&self) -> ConversationKey {
        self.conversation_key
    }

    /// Server id of the assistant message, once bound.
    #[must_use]
    pub fn assistant_message_id(&self) -> Option<i64> {
        self.assistant_message_id
    }

    /// Id the answer is displayed under right now.
    #[must_use]
    pub fn message_id(&self) -> String {
        self.assistant_message_id
            .map_or_else(|| self.pending_local_id.clone(), |id| id.to_string())
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Latest stage.
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Merged metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// How the session ended, once terminal.
    #[must_use]
    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    /// Whether no further input will be applied.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Identity used for progress correlation.
    #[must_use]
    pub fn identity(&self) -> SessionIdentity<'_> {
        SessionIdentity {
            client_request_id: Some(self.request_id.as_str()),
            assistant_message_id: self.assistant_message_id,
            conversation_id: self.conversation_id,
        }
    }

    /// Apply one decoded stream event.
    pub fn apply(&mut self, event: StreamEvent) -> Transition {
        if self.is_terminal() {
            debug!(
                request_id = %self.request_id,
                event = event.kind(),
                "session already terminal, ignoring event"
            );
            return Transition::Unchanged;
        }

        match event {
            StreamEvent::Meta(meta) => {
                self.activate();
                self.apply_meta(meta);
                Transition::Updated
            }
            StreamEvent::Chunk { delta } | StreamEvent::PassthroughDelta { delta } => {
                self.activate();
                self.buffer.push_str(&delta);
                Transition::Updated
            }
            StreamEvent::Progress(note) => {
                self.activate();
                self.set_stage(&note);
                Transition::Updated
            }
            StreamEvent::Done(done) => self.complete(done),
            StreamEvent::Error { message } => {
                self.buffer.clone_from(&message);
                self.terminate_failed(message)
            }
        }
    }

    /// Apply a correlated out-of-band progress notification.
    ///
    /// Touches only the stage; the buffer and lifecycle are left alone.
    pub fn apply_progress(&mut self, note: &ProgressNotification) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        self.set_stage(note);
        Transition::Updated
    }

    /// Abort the answer, keeping the text received so far.
    pub fn abort(&mut self) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        self.metadata.insert(META_ABORTED.into(), Value::Bool(true));
        self.state = LifecycleState::Aborted;
        self.outcome = Some(SessionOutcome::Aborted);
        info!(
            request_id = %self.request_id,
            chars = self.buffer.chars().count(),
            "session aborted"
        );
        Transition::Terminated(LifecycleState::Aborted)
    }

    /// Fail the answer because the connection broke.
    ///
    /// Partial text is kept; the error message is shown only when nothing
    /// was received.
    pub fn fail_transport(&mut self, message: impl Into<String>) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        let message = message.into();
        if self.buffer.trim().is_empty() {
            self.buffer.clone_from(&message);
        }
        self.terminate_failed(message)
    }

    /// Finalize after the transport closed without a `done` event.
    pub fn finish_stream(&mut self) -> Transition {
        if self.is_terminal() {
            return Transition::Unchanged;
        }
        debug!(
            request_id = %self.request_id,
            "stream closed without done event, finalizing from buffer"
        );
        self.complete(DonePayload::default())
    }

    /// Read-only view for the render collaborator.
    #[must_use]
    pub fn snapshot(&self) -> RenderSnapshot {
        RenderSnapshot {
            message_id: self.message_id(),
            content: self.buffer.clone(),
            stage: self.stage.clone(),
            lifecycle_state: self.state,
            references: self.references(),
        }
    }

    /// Citations announced in the metadata. Malformed entries are skipped.
    #[must_use]
    pub fn references(&self) -> Vec<ReferenceDescriptor> {
        self.metadata
            .get(META_REFERENCES)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merge the final state into the assistant placeholder created with
    /// the session.
    ///
    /// Returns `None` when there is nothing worth keeping: a completed
    /// answer without content, or an abort before any text arrived. Also
    /// returns `None` while the session is still live.
    #[must_use]
    pub fn finalize(&self, mut placeholder: Message) -> Option<Message> {
        match self.outcome.as_ref()? {
            SessionOutcome::NoContent => return None,
            SessionOutcome::Aborted if self.buffer.trim().is_empty() => return None,
            _ => {}
        }
        if let Some(id) = self.assistant_message_id {
            placeholder.id = id.to_string();
        }
        placeholder.content.clone_from(&self.buffer);
        for (key, value) in &self.metadata {
            placeholder.metadata.insert(key.clone(), value.clone());
        }
        Some(placeholder)
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn activate(&mut self) {
        if self.state == LifecycleState::Init {
            self.state = LifecycleState::Active;
        }
    }

    fn apply_meta(&mut self, meta: MetaPayload) {
        if let Some(echo) = meta.client_request_id.as_deref() {
            if echo != self.request_id {
                warn!(
                    request_id = %self.request_id,
                    echoed = echo,
                    "meta event echoes a different client request id"
                );
            }
        }
        self.bind_conversation(meta.conversation_id);
        self.bind_assistant_message(meta.assistant_message_id);
        self.merge_metadata(meta.metadata);
    }

    fn complete(&mut self, done: DonePayload) -> Transition {
        self.bind_conversation(done.conversation_id);
        self.bind_assistant_message(done.assistant_message_id);
        self.merge_metadata(done.metadata);

        let final_content = done.content.unwrap_or_else(|| self.buffer.clone());
        if final_content.trim().is_empty() {
            self.state = LifecycleState::Completed;
            self.outcome = Some(SessionOutcome::NoContent);
            info!(request_id = %self.request_id, "session completed without content");
            return Transition::Terminated(LifecycleState::Completed);
        }

        self.buffer = final_content;
        self.state = LifecycleState::Completed;
        self.outcome = Some(SessionOutcome::Completed);
        info!(
            request_id = %self.request_id,
            conversation_key = %self.conversation_key,
            chars = self.buffer.chars().count(),
            "session completed"
        );
        Transition::Terminated(LifecycleState::Completed)
    }

    fn terminate_failed(&mut self, message: String) -> Transition {
        self.metadata.insert(META_ERROR.into(), Value::Bool(true));
        self.state = LifecycleState::Failed;
        warn!(request_id = %self.request_id, error = %message, "session failed");
        self.outcome = Some(SessionOutcome::Failed { message });
        Transition::Terminated(LifecycleState::Failed)
    }

    /// Bind the conversation once; later conflicting ids are logged and
    /// ignored.
    fn bind_conversation(&mut self, conversation_id: Option<i64>) {
        let Some(incoming) = conversation_id else {
            return;
        };
        match self.conversation_id {
            None => {
                self.conversation_id = Some(incoming);
                self.conversation_key = ConversationKey::Id(incoming);
                debug!(
                    request_id = %self.request_id,
                    conversation_key = %self.conversation_key,
                    "conversation bound"
                );
            }
            Some(bound) if bound != incoming => {
                warn!(
                    request_id = %self.request_id,
                    bound,
                    incoming,
                    "conflicting conversation id, keeping first binding"
                );
            }
            Some(_) => {}
        }
    }

    fn bind_assistant_message(&mut self, assistant_message_id: Option<i64>) {
        let Some(incoming) = assistant_message_id else {
            return;
        };
        match self.assistant_message_id {
            None => self.assistant_message_id = Some(incoming),
            Some(bound) if bound != incoming => {
                warn!(
                    request_id = %self.request_id,
                    bound,
                    incoming,
                    "conflicting assistant message id, keeping first binding"
                );
            }
            Some(_) => {}
        }
    }

    fn merge_metadata(&mut self, metadata: Option<Map<String, Value>>) {
        if let Some(metadata) = metadata {
            self.metadata.extend(metadata);
        }
    }

    fn set_stage(&mut self, note: &ProgressNotification) {
        self.stage.message.clone_from(&note.message);
        if note.step.is_some() {
            self.stage.step.clone_from(&note.step);
        }
        if note.status.is_some() {
            self.stage.status.clone_from(&note.status);
        }
    }
}
