//! Client configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name under which API keys are stored.
pub const KEYRING_SERVICE: &str = "kbase-chat";

/// Environment variable consulted when the keychain has no API key.
pub const API_KEY_ENV: &str = "KBASE_CHAT_API_KEY";

/// Knowledge-base service endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Base URL of the knowledge-base service, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Path of the streaming answer endpoint.
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Path of the conversation list endpoint.
    #[serde(default = "default_conversations_path")]
    pub conversations_path: String,
    /// Path prefix of the single-conversation endpoint (`{path}/{id}`).
    #[serde(default = "default_conversation_path")]
    pub conversation_path: String,
    /// TCP connect timeout; the stream itself has no read timeout.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_stream_path() -> String {
    "/api/chat/stream".into()
}

fn default_conversations_path() -> String {
    "/api/chat/conversations".into()
}

fn default_conversation_path() -> String {
    "/api/chat/conversation".into()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Language model selection forwarded with every question.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// Identifier of the configured model source.
    pub source_id: String,
    /// Identifier of the model within its source.
    pub model_id: String,
    /// Model name as the provider API expects it.
    pub api_model: String,
    /// Provider name (`ollama`, `openai`, ...).
    pub provider_name: String,
    /// Optional provider endpoint override.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Whether the provider needs an API key.
    #[serde(default)]
    pub requires_api_key: bool,
    /// API key (populated at runtime, never read from the file).
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Retrieval knobs forwarded with every question.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RetrievalConfig {
    /// Number of fragments the backend retrieves per question.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Whether the backend searches document summaries first.
    #[serde(default)]
    pub use_summary_search: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            use_summary_search: false,
        }
    }
}

fn default_top_k() -> u32 {
    5
}

/// Roots used when matching and resolving citation paths.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReferenceConfig {
    /// Local knowledge-base root that relative paths are joined to.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// External mount prefixes stripped to obtain root-relative paths.
    #[serde(default)]
    pub external_roots: Vec<String>,
}

/// Client configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Service endpoints.
    pub server: ServerConfig,
    /// Model selection.
    pub model: ModelConfig,
    /// Retrieval settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Citation path settings.
    #[serde(default)]
    pub references: ReferenceConfig,
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the model API key from OS keychain with env-var fallback.
    ///
    /// Does nothing when the model does not require a key.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a key is required and neither the
    /// keychain nor the environment provides one.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if !self.model.requires_api_key {
            return Ok(());
        }
        let entry = format!("{}_api_key", self.model.provider_name);
        self.model.api_key = Some(load_credential(&entry, API_KEY_ENV).await?);
        Ok(())
    }

    /// Full URL of the streaming answer endpoint.
    #[must_use]
    pub fn stream_url(&self) -> String {
        join_url(&self.server.base_url, &self.server.stream_path)
    }

    /// Full URL of the conversation list endpoint.
    #[must_use]
    pub fn conversations_url(&self) -> String {
        join_url(&self.server.base_url, &self.server.conversations_path)
    }

    /// Full URL of a single conversation.
    #[must_use]
    pub fn conversation_url(&self, conversation_id: i64) -> String {
        format!(
            "{}/{conversation_id}",
            join_url(&self.server.base_url, &self.server.conversation_path)
        )
    }

    fn validate(&mut self) -> Result<()> {
        reqwest::Url::parse(&self.server.base_url)
            .map_err(|err| AppError::Config(format!("server.base_url invalid: {err}")))?;

        if self.retrieval.top_k == 0 {
            return Err(AppError::Config(
                "retrieval.top_k must be greater than zero".into(),
            ));
        }

        if self.model.api_model.trim().is_empty() {
            return Err(AppError::Config("model.api_model must not be empty".into()));
        }

        if let Some(root) = &self.references.project_root {
            let canonical = root.canonicalize().map_err(|err| {
                AppError::Config(format!("references.project_root invalid: {err}"))
            })?;
            self.references.project_root = Some(canonical);
        }

        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain {KEYRING_SERVICE} or {env_key} env var"
        ))),
    }
}
