//! Request/response synthesis.
//!
//! A [`TTSRequestBuilder`] knows how to phrase one HTTP request for a
//! provider; [`TTSProvider`] sends it and returns the audio body.
//! [`RequestResponseBackend`] turns any [`SpeechSynthesizer`] into a
//! [`SynthesisBackend`] that makes one call per word chunk.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::base::{
    SpeechSynthesizer, SynthesisBackend, SynthesisEvent, SynthesizedAudio, TTSError, TTSResult,
};
use crate::core::llm::WordChunk;
use crate::core::queue::QueueReader;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider-specific request construction.
pub trait TTSRequestBuilder: Send + Sync {
    fn build_http_request(&self, client: &reqwest::Client, text: &str) -> reqwest::RequestBuilder;

    fn sample_rate(&self) -> u32;
}

/// Generic HTTP synthesizer over a request builder.
pub struct TTSProvider<B> {
    client: reqwest::Client,
    builder: B,
}

impl<B: TTSRequestBuilder> TTSProvider<B> {
    pub fn new(client: reqwest::Client, builder: B) -> Self {
        Self { client, builder }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }
}

#[async_trait]
impl<B: TTSRequestBuilder> SpeechSynthesizer for TTSProvider<B> {
    async fn synthesize(&self, text: &str) -> TTSResult<Bytes> {
        let response = self
            .builder
            .build_http_request(&self.client, text)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TTSError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TTSError::ProviderError(format!("HTTP {status}: {body}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| TTSError::NetworkError(e.to_string()))
    }

    fn sample_rate(&self) -> u32 {
        self.builder.sample_rate()
    }
}

/// One synthesis request per non-empty chunk, strictly in submission order.
pub struct RequestResponseBackend {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl RequestResponseBackend {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl SynthesisBackend for RequestResponseBackend {
    async fn run(
        self: Box<Self>,
        mut chunks: QueueReader<WordChunk>,
        events: mpsc::Sender<SynthesisEvent>,
    ) {
        let sample_rate = self.synthesizer.sample_rate();

        while let Some(chunk) = chunks.pull().await {
            if chunk.is_end_of_turn() {
                debug!("End of turn reached synthesis");
                continue;
            }

            let event = match self.synthesizer.synthesize(chunk.text()).await {
                Ok(pcm) if pcm.is_empty() => continue,
                Ok(pcm) => SynthesisEvent::Audio(SynthesizedAudio { pcm, sample_rate }),
                Err(error) => {
                    warn!(error = %error, text = chunk.text(), "Synthesis failed for chunk");
                    SynthesisEvent::ChunkFailed {
                        text: chunk.into_text(),
                        error,
                    }
                }
            };

            if events.send(event).await.is_err() {
                debug!("Synthesis consumer gone, stopping");
                break;
            }
        }
    }

    fn mode(&self) -> &'static str {
        "request"
    }
}
