//! Conversation persistence collaborator.
//!
//! The knowledge-base service owns conversations and messages. The chat
//! core only tells the store when a session learns its conversation id and
//! asks it to refresh once a turn is over.

pub mod conversation_store;

use std::future::Future;
use std::pin::Pin;

use crate::models::conversation::{Conversation, ConversationDetail};
use crate::Result;

/// Boxed future returned by [`ConversationStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Access to the service-owned conversation records.
pub trait ConversationStore: Send + Sync {
    /// List conversations, most recent first.
    fn list_conversations(&self) -> StoreFuture<'_, Vec<Conversation>>;

    /// Fetch one conversation with its messages.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`](crate::AppError::NotFound) for an
    /// unknown id.
    fn get_conversation(&self, conversation_id: i64) -> StoreFuture<'_, ConversationDetail>;

    /// Delete one conversation.
    fn delete_conversation(&self, conversation_id: i64) -> StoreFuture<'_, ()>;

    /// Notification that a session learned its durable conversation id.
    fn conversation_bound(&self, _conversation_id: i64) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Refresh a conversation after a turn completed.
    fn refresh(&self, conversation_id: i64) -> StoreFuture<'_, ConversationDetail> {
        self.get_conversation(conversation_id)
    }
}
