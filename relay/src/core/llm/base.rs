use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Item of a streamed reply.
///
/// A well-formed stream is zero or more `Token`s followed by exactly one of
/// `Finished` or `Failed`. Consumers treat a closed channel like `Finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Token(String),
    Finished,
    Failed(LlmError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Stream error: {0}")]
    StreamError(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// A chat model that streams its reply fragment by fragment.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a reply to `messages`.
    ///
    /// Returns once the request has been accepted. Fragments arrive on the
    /// returned receiver; dropping it abandons the generation.
    async fn stream_reply(
        &self,
        messages: &[ChatMessage],
    ) -> LlmResult<mpsc::Receiver<GenerationEvent>>;

    fn model_name(&self) -> &str;
}
