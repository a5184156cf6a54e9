//! HTTP-backed conversation store.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use super::{ConversationStore, StoreFuture};
use crate::config::ClientConfig;
use crate::models::conversation::{Conversation, ConversationDetail};
use crate::{AppError, Result};

/// List responses come either bare or wrapped in `{"conversations": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConversationList {
    Bare(Vec<Conversation>),
    Wrapped { conversations: Vec<Conversation> },
}

/// Conversation store talking to the knowledge-base service.
#[derive(Debug, Clone)]
pub struct HttpConversationStore {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpConversationStore {
    /// Build a store for the configured service.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.server.connect_timeout_seconds))
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn fetch_list(&self) -> Result<Vec<Conversation>> {
        let url = self.config.conversations_url();
        let list: ConversationList = self.get_json(&url, "conversation list").await?;
        Ok(match list {
            ConversationList::Bare(items) | ConversationList::Wrapped { conversations: items } => {
                items
            }
        })
    }

    async fn fetch_detail(&self, conversation_id: i64) -> Result<ConversationDetail> {
        let url = self.config.conversation_url(conversation_id);
        self.get_json(&url, &format!("conversation {conversation_id}"))
            .await
    }

    async fn remove(&self, conversation_id: i64) -> Result<()> {
        let url = self.config.conversation_url(conversation_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|err| AppError::Persistence(format!("delete failed: {err}")))?;
        check_status(response.status(), &format!("conversation {conversation_id}"))?;
        info!(conversation_id, "conversation deleted");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!(url, "fetching {what}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| AppError::Persistence(format!("fetch {what} failed: {err}")))?;
        check_status(response.status(), what)?;
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Persistence(format!("invalid {what} body: {err}")))
    }
}

fn check_status(status: StatusCode, what: &str) -> Result<()> {
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(what.to_owned()));
    }
    if !status.is_success() {
        return Err(AppError::Persistence(format!("{what}: service returned {status}")));
    }
    Ok(())
}

impl ConversationStore for HttpConversationStore {
    fn list_conversations(&self) -> StoreFuture<'_, Vec<Conversation>> {
        Box::pin(self.fetch_list())
    }

    fn get_conversation(&self, conversation_id: i64) -> StoreFuture<'_, ConversationDetail> {
        Box::pin(self.fetch_detail(conversation_id))
    }

    fn delete_conversation(&self, conversation_id: i64) -> StoreFuture<'_, ()> {
        Box::pin(self.remove(conversation_id))
    }

    fn conversation_bound(&self, conversation_id: i64) -> StoreFuture<'_, ()> {
        debug!(conversation_id, "conversation id now known");
        Box::pin(async { Ok(()) })
    }
}
