//! Session orchestrator.
//!
//! Owns the at-most-one-active-session rule, builds a turn for each
//! submitted question, and drives the read loop that feeds transport bytes
//! through the frame decoder and event interpreter into the session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ClientConfig;
use crate::models::conversation::ConversationDetail;
use crate::models::message::{local_id, Message};
use crate::persistence::conversation_store::HttpConversationStore;
use crate::persistence::ConversationStore;
use crate::session::progress::{correlate, ProgressNotification, ProgressPublisher};
use crate::session::render::RenderSink;
use crate::session::state::{
    ConversationKey, LifecycleState, SessionOutcome, StreamSession, Transition,
};
use crate::stream::cancel::AbortHandle;
use crate::stream::codec::{Frame, FrameDecoder};
use crate::stream::event::interpret_frame;
use crate::transport::http::HttpTransport;
use crate::transport::{ByteStream, ChatTransport, StreamRequest};
use crate::{AppError, Result};

type ActiveKeys = Arc<Mutex<HashSet<ConversationKey>>>;

/// Entry point for asking questions.
///
/// Cheap to clone; clones share the active-session set and the progress
/// fan-out.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn ConversationStore>,
    config: Arc<ClientConfig>,
    active: ActiveKeys,
    progress: ProgressPublisher,
}

impl Orchestrator {
    /// Build an orchestrator over explicit collaborators.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn ConversationStore>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            store,
            config: Arc::new(config),
            active: Arc::default(),
            progress: ProgressPublisher::new(),
        }
    }

    /// Build an orchestrator talking HTTP to the configured service.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if an HTTP client cannot be built.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        let store = Arc::new(HttpConversationStore::new(&config)?);
        Ok(Self::new(transport, store, config))
    }

    /// Fan-out that out-of-band progress records are published to.
    #[must_use]
    pub fn progress_publisher(&self) -> &ProgressPublisher {
        &self.progress
    }

    /// Conversation store collaborator.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Whether a session is streaming under `key`.
    #[must_use]
    pub fn is_active(&self, key: ConversationKey) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    /// Claim the session slot for a question and prepare its turn.
    ///
    /// Nothing is sent until [`PendingTurn::run`] is awaited.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionBusy`] while another answer for the same
    /// conversation key is still streaming.
    pub fn begin(
        &self,
        question: impl Into<String>,
        conversation_id: Option<i64>,
    ) -> Result<PendingTurn> {
        let key = ConversationKey::from_id(conversation_id);
        let slot = SessionSlot::claim(&self.active, key)?;

        let question = question.into();
        let request = StreamRequest::new(&self.config, question.clone(), conversation_id);
        let placeholder_id = local_id();
        let session = StreamSession::new(
            request.client_request_id.clone(),
            placeholder_id.clone(),
            conversation_id,
        );

        debug!(
            request_id = %request.client_request_id,
            conversation_key = %key,
            "turn prepared"
        );

        Ok(PendingTurn {
            user: Message::user(question),
            placeholder: Message::assistant_placeholder(placeholder_id),
            session,
            request,
            abort: AbortHandle::new(),
            slot,
            progress_rx: self.progress.subscribe(),
            transport: Arc::clone(&self.transport),
            store: Arc::clone(&self.store),
        })
    }

    /// Submit a question and stream its answer to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SessionBusy`] when the conversation is busy.
    /// Failures of the answer itself are reported in
    /// [`ChatTurn::outcome`], not as errors.
    pub async fn ask(
        &self,
        question: impl Into<String>,
        conversation_id: Option<i64>,
        sink: &dyn RenderSink,
    ) -> Result<ChatTurn> {
        Ok(self.begin(question, conversation_id)?.run(sink).await)
    }
}

/// Result of one question/answer exchange.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    /// Client request id of the turn.
    pub request_id: String,
    /// The question as submitted.
    pub user: Message,
    /// The committed answer; `None` when there was nothing to keep.
    pub assistant: Option<Message>,
    /// How the answer ended.
    pub outcome: SessionOutcome,
    /// Final lifecycle state.
    pub state: LifecycleState,
    /// Conversation the turn belongs to, once known.
    pub conversation_id: Option<i64>,
    /// Conversation as refreshed after the turn, when the refresh worked.
    pub conversation: Option<ConversationDetail>,
}

/// A submitted question whose answer has not been read yet.
pub struct PendingTurn {
    user: Message,
    placeholder: Message,
    session: StreamSession,
    request: StreamRequest,
    abort: AbortHandle,
    slot: SessionSlot,
    progress_rx: broadcast::Receiver<ProgressNotification>,
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn ConversationStore>,
}

impl PendingTurn {
    /// Handle that aborts this turn. Clone it before calling
    /// [`run`](Self::run).
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Outbound request that will be sent.
    #[must_use]
    pub fn request(&self) -> &StreamRequest {
        &self.request
    }

    /// Session state before the first read.
    #[must_use]
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Stream the answer to completion, abort or failure.
    ///
    /// Renders to `sink` after every applied event, commits the answer,
    /// releases the session slot and refreshes the conversation.
    pub async fn run(self, sink: &dyn RenderSink) -> ChatTurn {
        let span = info_span!(
            "chat_turn",
            request_id = %self.request.client_request_id,
            conversation_key = %self.slot.key,
        );
        self.execute(sink).instrument(span).await
    }

    async fn execute(mut self, sink: &dyn RenderSink) -> ChatTurn {
        info!("submitting question");
        self.drive(sink).await;
        if !self.session.is_terminal() {
            self.session.finish_stream();
            sink.render(&self.session.snapshot());
        }

        let Self {
            user,
            placeholder,
            session,
            request,
            slot,
            store,
            ..
        } = self;
        drop(slot);

        let assistant = session.finalize(placeholder);
        let outcome = session
            .outcome()
            .cloned()
            .unwrap_or(SessionOutcome::NoContent);
        let conversation_id = session.conversation_id();

        let conversation = match conversation_id {
            Some(id) => match store.refresh(id).await {
                Ok(detail) => Some(detail),
                Err(err) => {
                    warn!(conversation_id = id, error = %err, "conversation refresh failed");
                    None
                }
            },
            None => None,
        };

        ChatTurn {
            request_id: request.client_request_id,
            user,
            assistant,
            outcome,
            state: session.state(),
            conversation_id,
            conversation,
        }
    }

    /// Read loop. Returns once the session is terminal or the stream ends.
    async fn drive(&mut self, sink: &dyn RenderSink) {
        if self.abort.is_aborted() {
            self.apply_abort(sink);
            return;
        }

        let opened = tokio::select! {
            biased;
            () = self.abort.aborted() => None,
            opened = self.transport.open_stream(&self.request) => Some(opened),
        };
        let mut stream: ByteStream = match opened {
            None => {
                self.apply_abort(sink);
                return;
            }
            Some(Ok(stream)) => stream,
            Some(Err(err)) => {
                self.apply_transport_failure(&err, sink);
                return;
            }
        };

        let mut decoder = FrameDecoder::new();
        let mut progress_open = true;

        while !self.session.is_terminal() {
            if self.abort.is_aborted() {
                self.apply_abort(sink);
                break;
            }

            tokio::select! {
                biased;

                () = self.abort.aborted() => {
                    self.apply_abort(sink);
                }

                note = self.progress_rx.recv(), if progress_open => match note {
                    Ok(note) => self.apply_out_of_band(&note, sink),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "progress receiver lagged, notifications dropped");
                    }
                    Err(RecvError::Closed) => progress_open = false,
                },

                item = stream.next() => match item {
                    Some(Ok(bytes)) => match decoder.push(&bytes) {
                        Ok(frames) => self.apply_frames(frames, sink).await,
                        Err(err) => self.apply_transport_failure(&err, sink),
                    },
                    Some(Err(err)) => self.apply_transport_failure(&err, sink),
                    None => {
                        match decoder.finish() {
                            Ok(frames) => self.apply_frames(frames, sink).await,
                            Err(err) => self.apply_transport_failure(&err, sink),
                        }
                        if self.session.finish_stream() != Transition::Unchanged {
                            sink.render(&self.session.snapshot());
                        }
                        break;
                    }
                },
            }
        }
        // Dropping the body here is the best-effort cancel of the request.
        drop(stream);
    }

    async fn apply_frames(&mut self, frames: Vec<Frame>, sink: &dyn RenderSink) {
        for frame in frames {
            if self.session.is_terminal() {
                break;
            }
            if self.abort.is_aborted() {
                self.apply_abort(sink);
                break;
            }

            let event = match interpret_frame(&frame) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "dropping malformed frame");
                    continue;
                }
            };

            let before = self.session.conversation_key();
            if self.session.apply(event) == Transition::Unchanged {
                continue;
            }
            let after = self.session.conversation_key();
            if after != before {
                self.slot.rekey(after);
            }
            sink.render(&self.session.snapshot());

            if let (ConversationKey::Pending, ConversationKey::Id(conversation_id)) = (before, after)
            {
                self.notify_bound(conversation_id).await;
            }
        }
    }

    /// Tell the store about the new binding unless an abort arrives first.
    async fn notify_bound(&self, conversation_id: i64) {
        tokio::select! {
            biased;

            () = self.abort.aborted() => {
                debug!(conversation_id, "abort requested while notifying binding");
            }

            result = self.store.conversation_bound(conversation_id) => {
                if let Err(err) = result {
                    warn!(conversation_id, error = %err, "conversation store rejected binding");
                }
            }
        }
    }

    fn apply_out_of_band(&mut self, note: &ProgressNotification, sink: &dyn RenderSink) {
        let Some(rule) = correlate(self.session.identity(), note) else {
            return;
        };
        debug!(?rule, step = ?note.step, "progress correlated");
        if self.session.apply_progress(note) != Transition::Unchanged {
            sink.render(&self.session.snapshot());
        }
    }

    fn apply_abort(&mut self, sink: &dyn RenderSink) {
        if self.session.abort() != Transition::Unchanged {
            sink.render(&self.session.snapshot());
        }
    }

    /// A transport failure while an abort is pending is the abort itself.
    fn apply_transport_failure(&mut self, err: &AppError, sink: &dyn RenderSink) {
        if self.abort.is_aborted() {
            debug!(error = %err, "transport closed after abort request");
            self.apply_abort(sink);
            return;
        }
        if self.session.fail_transport(err.to_string()) != Transition::Unchanged {
            sink.render(&self.session.snapshot());
        }
    }
}

/// Membership of one session in the active set; released on drop.
struct SessionSlot {
    active: ActiveKeys,
    key: ConversationKey,
}

impl SessionSlot {
    fn claim(active: &ActiveKeys, key: ConversationKey) -> Result<Self> {
        let inserted = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        if !inserted {
            return Err(AppError::SessionBusy(format!(
                "an answer is still streaming for conversation {key}"
            )));
        }
        Ok(Self {
            active: Arc::clone(active),
            key,
        })
    }

    /// Move the slot to the key learned from the stream. Keeps the old key
    /// if the new one is already held elsewhere.
    fn rekey(&mut self, key: ConversationKey) {
        if key == self.key {
            return;
        }
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key) {
            warn!(
                conversation_key = %key,
                "conversation already has a streaming answer, keeping pending slot"
            );
            return;
        }
        active.remove(&self.key);
        self.key = key;
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
