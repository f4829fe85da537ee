//! Amazon Transcribe Streaming recognizer.
//!
//! Runs one bidirectional session per call: PCM audio is pushed as
//! `AudioEvent`s and transcript results are read back from the result
//! stream. Credentials come from the config when both key and secret are
//! set, otherwise from the default AWS provider chain.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_transcribestreaming::Client as TranscribeClient;
use aws_sdk_transcribestreaming::primitives::Blob;
use aws_sdk_transcribestreaming::types::{
    AudioEvent, AudioStream, LanguageCode, MediaEncoding, Transcript, TranscriptResultStream,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::base::{Finality, RecognitionService, STTError, TranscriptEvent};
use crate::core::codec::PCM_SAMPLE_WIDTH;
use crate::core::queue::QueueReader;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const MIN_SAMPLE_RATE: u32 = 8000;
const MAX_SAMPLE_RATE: u32 = 48000;

/// Settings for [`AwsTranscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsTranscribeConfig {
    pub region: String,
    pub language_code: String,
    pub sample_rate: u32,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for AwsTranscribeConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            language_code: "en-US".to_string(),
            sample_rate: 8000,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl AwsTranscribeConfig {
    pub fn validate(&self) -> Result<(), STTError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(STTError::ConfigurationError(format!(
                "sample rate {} Hz is outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}",
                self.sample_rate
            )));
        }
        if self.region.trim().is_empty() {
            return Err(STTError::ConfigurationError(
                "AWS region must not be empty".to_string(),
            ));
        }
        if let LanguageCode::Unknown(_) = LanguageCode::from(self.language_code.as_str()) {
            return Err(STTError::ConfigurationError(format!(
                "unsupported language code: {}",
                self.language_code
            )));
        }
        Ok(())
    }

    fn has_explicit_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

pub struct AwsTranscribe {
    config: AwsTranscribeConfig,
}

impl AwsTranscribe {
    pub fn new(config: AwsTranscribeConfig) -> Result<Self, STTError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AwsTranscribeConfig {
        &self.config
    }

    async fn client(&self) -> TranscribeClient {
        let region = aws_config::Region::new(self.config.region.clone());

        let sdk_config = if self.config.has_explicit_credentials() {
            let credentials = aws_credential_types::Credentials::new(
                self.config.access_key_id.as_deref().unwrap_or_default(),
                self.config.secret_access_key.as_deref().unwrap_or_default(),
                None,
                None,
                "voice-relay",
            );
            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(credentials)
                .load()
                .await
        } else {
            aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await
        };

        TranscribeClient::new(&sdk_config)
    }
}

#[async_trait]
impl RecognitionService for AwsTranscribe {
    async fn run_session(
        &self,
        mut audio: QueueReader<Bytes>,
        results: mpsc::Sender<TranscriptEvent>,
    ) -> Result<(), STTError> {
        let client = self.client().await;

        let audio_stream = async_stream::stream! {
            while let Some(frame) = audio.pull().await {
                if frame.len() % PCM_SAMPLE_WIDTH != 0 {
                    debug!("Skipping misaligned audio frame of {} bytes", frame.len());
                    continue;
                }
                let event = AudioEvent::builder()
                    .audio_chunk(Blob::new(frame.to_vec()))
                    .build();
                yield Ok(AudioStream::AudioEvent(event));
            }
            debug!("Audio queue drained, ending Transcribe input stream");
        };

        let request = client
            .start_stream_transcription()
            .language_code(LanguageCode::from(self.config.language_code.as_str()))
            .media_sample_rate_hertz(self.config.sample_rate as i32)
            .media_encoding(MediaEncoding::Pcm)
            .audio_stream(audio_stream.into());

        let output = tokio::time::timeout(CONNECT_TIMEOUT, request.send())
            .await
            .map_err(|_| STTError::ConnectionFailed("Amazon Transcribe connect timed out".to_string()))?
            .map_err(|e| {
                STTError::ConnectionFailed(format!("Amazon Transcribe rejected the session: {e}"))
            })?;

        if let Some(session_id) = output.session_id() {
            info!(session_id, "Amazon Transcribe session started");
        }

        let mut result_stream = output.transcript_result_stream;
        loop {
            match result_stream.recv().await {
                Ok(Some(TranscriptResultStream::TranscriptEvent(event))) => {
                    let Some(transcript) = event.transcript else {
                        continue;
                    };
                    for result in transcript_events(transcript) {
                        if results.send(result).await.is_err() {
                            debug!("Transcript consumer gone, ending session");
                            return Ok(());
                        }
                    }
                }
                Ok(Some(_)) => debug!("Ignoring unknown Transcribe event"),
                Ok(None) => {
                    info!("Amazon Transcribe stream ended");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Amazon Transcribe stream error");
                    return Err(STTError::ProviderError(format!(
                        "Amazon Transcribe stream error: {e}"
                    )));
                }
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "aws-transcribe"
    }
}

/// Best alternative of every result, in order. Blank transcripts are skipped.
fn transcript_events(transcript: Transcript) -> Vec<TranscriptEvent> {
    transcript
        .results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|result| {
            let finality = if result.is_partial {
                Finality::Partial
            } else {
                Finality::Final
            };
            let text = result
                .alternatives
                .unwrap_or_default()
                .into_iter()
                .next()?
                .transcript?;
            if text.trim().is_empty() {
                return None;
            }
            Some(TranscriptEvent::new(text, finality))
        })
        .collect()
}
