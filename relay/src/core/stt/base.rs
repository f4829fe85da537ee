use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::queue::QueueReader;

/// Whether the recognizer may still revise a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// Provisional result, likely to be revised.
    Partial,
    /// Committed result, never revised.
    Final,
}

/// A recognized text segment as returned by the recognition service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub finality: Finality,
}

impl TranscriptEvent {
    pub fn new(text: impl Into<String>, finality: Finality) -> Self {
        Self {
            text: text.into(),
            finality,
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self::new(text, Finality::Partial)
    }

    pub fn committed(text: impl Into<String>) -> Self {
        Self::new(text, Finality::Final)
    }

    #[inline]
    pub fn is_final(&self) -> bool {
        self.finality == Finality::Final
    }
}

/// Errors raised by the speech-recognition side of the pipeline.
///
/// Any error that reaches the transcription stream ends recognition for the
/// rest of the call; there is no reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum STTError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid audio format: {0}")]
    InvalidAudioFormat(String),
}

/// A remote recognition service able to run one bidirectional session.
///
/// `run_session` consumes audio from `audio` until the queue is closed and
/// forwards every recognition result, in service order, to `results`. It
/// returns `Ok(())` when the service ends the session normally and an error
/// when the transport fails.
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn run_session(
        &self,
        audio: QueueReader<Bytes>,
        results: mpsc::Sender<TranscriptEvent>,
    ) -> Result<(), STTError>;

    fn provider_name(&self) -> &'static str;
}
