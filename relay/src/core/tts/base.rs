use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::llm::WordChunk;
use crate::core::queue::QueueReader;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TTSError {
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
}

pub type TTSResult<T> = Result<T, TTSError>;

/// How word chunks reach the synthesis service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    /// One HTTP request per chunk.
    #[default]
    Request,
    /// One long-lived socket per call.
    Streaming,
}

impl SynthesisMode {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "streaming" | "stream" | "websocket" | "ws" => Self::Streaming,
            "request" | "http" | "rest" => Self::Request,
            _ => Self::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Streaming => "streaming",
        }
    }
}

/// Raw synthesized audio: 16-bit little-endian mono PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub pcm: Bytes,
    pub sample_rate: u32,
}

/// Output of a synthesis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Audio(SynthesizedAudio),
    /// One chunk could not be synthesized. Later chunks are still attempted.
    ChunkFailed { text: String, error: TTSError },
}

/// One-shot text to speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> TTSResult<Bytes>;

    /// Sample rate of the PCM returned by [`synthesize`](Self::synthesize).
    fn sample_rate(&self) -> u32;
}

/// A synthesis strategy driving one call's chunk sequence to completion.
///
/// `run` pulls chunks in order until the queue is drained and closed, and
/// returns when there is no more audio to deliver or `events` is closed.
#[async_trait]
pub trait SynthesisBackend: Send {
    async fn run(
        self: Box<Self>,
        chunks: QueueReader<WordChunk>,
        events: mpsc::Sender<SynthesisEvent>,
    );

    fn mode(&self) -> &'static str;
}

pub type BoxedSynthesisBackend = Box<dyn SynthesisBackend>;
