//! Outbound streaming request and the transport seam.
//!
//! The [`ChatTransport`] trait decouples the orchestrator from how the
//! answer stream is obtained. [`http::HttpTransport`] posts to the
//! knowledge-base service; tests substitute in-memory streams.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{ClientConfig, ModelConfig};
use crate::Result;

/// Body bytes of a streamed answer, delivered in arbitrary slices.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Model selection sent with a question.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSelection {
    /// Model source id.
    pub source_id: String,
    /// Model id within the source.
    pub model_id: String,
    /// Provider-facing model name.
    pub api_model: String,
    /// Provider name.
    pub provider_name: String,
    /// API key, when the provider requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Provider endpoint override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Whether the provider requires an API key.
    pub requires_api_key: bool,
}

impl From<&ModelConfig> for ModelSelection {
    fn from(model: &ModelConfig) -> Self {
        Self {
            source_id: model.source_id.clone(),
            model_id: model.model_id.clone(),
            api_model: model.api_model.clone(),
            provider_name: model.provider_name.clone(),
            api_key: model.api_key.clone(),
            api_url: model.api_url.clone(),
            requires_api_key: model.requires_api_key,
        }
    }
}

/// Body of `POST <stream-endpoint>`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    /// The user's question.
    pub question: String,
    /// Target conversation; `null` starts a new one.
    pub conversation_id: Option<i64>,
    /// Request id used to correlate progress notifications.
    pub client_request_id: String,
    /// Number of fragments to retrieve.
    pub top_k: u32,
    /// Model selection.
    pub model: ModelSelection,
    /// Whether to search document summaries first.
    pub use_summary_search: bool,
}

impl StreamRequest {
    /// Build a request from configuration with a fresh client request id.
    #[must_use]
    pub fn new(config: &ClientConfig, question: impl Into<String>, conversation_id: Option<i64>) -> Self {
        Self {
            question: question.into(),
            conversation_id,
            client_request_id: Uuid::new_v4().to_string(),
            top_k: config.retrieval.top_k,
            model: ModelSelection::from(&config.model),
            use_summary_search: config.retrieval.use_summary_search,
        }
    }
}

/// Source of answer streams.
pub trait ChatTransport: Send + Sync {
    /// Submit `request` and return the response body as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) when the
    /// request cannot be sent or the service rejects it.
    fn open_stream<'a>(
        &'a self,
        request: &'a StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ByteStream>> + Send + 'a>>;
}
