//! HTTP transport for the streaming answer endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tracing::{debug, warn};

use super::{ByteStream, ChatTransport, StreamRequest};
use crate::config::ClientConfig;
use crate::{AppError, Result};

/// Posts questions to the knowledge-base service with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    stream_url: String,
}

impl HttpTransport {
    /// Build a transport for the configured service.
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
            stream_url: config.stream_url(),
        })
    }

    /// Endpoint this transport posts to.
    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    async fn post(&self, request: &StreamRequest) -> Result<ByteStream> {
        debug!(
            url = %self.stream_url,
            client_request_id = %request.client_request_id,
            "opening answer stream"
        );

        let response = self
            .client
            .post(&self.stream_url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "answer stream rejected");
            return Err(AppError::Transport(format!(
                "stream endpoint returned {status}: {}",
                body.trim()
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AppError::from));
        Ok(Box::pin(body))
    }
}

impl ChatTransport for HttpTransport {
    fn open_stream<'a>(
        &'a self,
        request: &'a StreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ByteStream>> + Send + 'a>> {
        Box::pin(self.post(request))
    }
}
