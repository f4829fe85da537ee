//! Mock collaborators for the call pipeline
//!
//! - `ScriptedRecognizer` answers each audio frame with the next scripted
//!   transcript event and counts the frames it was sent
//! - `ScriptedChat` hands every reply channel to the test so token delivery
//!   is driven step by step
//! - `RecordingBackend` reports every word chunk it receives and answers
//!   text chunks with a short burst of PCM

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use voice_relay::core::llm::{
    ChatMessage, ChatModel, GenerationEvent, LlmError, LlmResult, WordChunk,
};
use voice_relay::core::queue::QueueReader;
use voice_relay::core::stt::{RecognitionService, STTError, TranscriptEvent};
use voice_relay::core::tts::{SynthesisBackend, SynthesisEvent, SynthesizedAudio};

/// Telephony frame size: 20 ms at 8 kHz.
pub const FRAME_LEN: usize = 160;

/// Samples returned for each synthesized chunk, at 8 kHz.
pub const SYNTH_SAMPLES: usize = 80;

// =============================================================================
// Recognizer
// =============================================================================

#[derive(Default)]
pub struct ScriptedRecognizer {
    script: Mutex<VecDeque<TranscriptEvent>>,
    frames: AtomicUsize,
    sessions: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(script: Vec<TranscriptEvent>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionService for ScriptedRecognizer {
    async fn run_session(
        &self,
        mut audio: QueueReader<Bytes>,
        results: mpsc::Sender<TranscriptEvent>,
    ) -> Result<(), STTError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        while let Some(_frame) = audio.pull().await {
            self.frames.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            if let Some(event) = next
                && results.send(event).await.is_err()
            {
                break;
            }
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

// =============================================================================
// Chat model
// =============================================================================

/// One `stream_reply` call as seen by the test.
#[derive(Debug)]
pub struct ReplyTurn {
    pub messages: Vec<ChatMessage>,
    pub tokens: mpsc::Sender<GenerationEvent>,
}

impl ReplyTurn {
    pub async fn token(&self, text: &str) {
        self.tokens
            .send(GenerationEvent::Token(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn finish(self) {
        let _ = self.tokens.send(GenerationEvent::Finished).await;
    }

    pub async fn fail(self) {
        let _ = self
            .tokens
            .send(GenerationEvent::Failed(LlmError::StreamError(
                "connection reset".to_string(),
            )))
            .await;
    }

    pub fn caller_text(&self) -> &str {
        &self.messages.last().unwrap().content
    }
}

pub struct ScriptedChat {
    turns: mpsc::UnboundedSender<ReplyTurn>,
    refuse: AtomicBool,
}

impl ScriptedChat {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ReplyTurn>) {
        let (turns, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                turns,
                refuse: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Make every following `stream_reply` fail before any token.
    pub fn refuse_replies(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn stream_reply(
        &self,
        messages: &[ChatMessage],
    ) -> LlmResult<mpsc::Receiver<GenerationEvent>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(LlmError::ApiError {
                status: 503,
                message: "overloaded".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(16);
        let _ = self.turns.send(ReplyTurn {
            messages: messages.to_vec(),
            tokens: tx,
        });
        Ok(rx)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

// =============================================================================
// Synthesis backend
// =============================================================================

pub struct RecordingBackend {
    chunks: mpsc::UnboundedSender<WordChunk>,
}

impl RecordingBackend {
    pub fn new() -> (Box<Self>, mpsc::UnboundedReceiver<WordChunk>) {
        let (chunks, rx) = mpsc::unbounded_channel();
        (Box::new(Self { chunks }), rx)
    }
}

#[async_trait]
impl SynthesisBackend for RecordingBackend {
    async fn run(
        self: Box<Self>,
        mut chunks: QueueReader<WordChunk>,
        events: mpsc::Sender<SynthesisEvent>,
    ) {
        while let Some(chunk) = chunks.pull().await {
            let speak = !chunk.is_end_of_turn();
            let _ = self.chunks.send(chunk);
            if !speak {
                continue;
            }
            let pcm: Vec<u8> = (0..SYNTH_SAMPLES as i16)
                .flat_map(|i| (i * 100).to_le_bytes())
                .collect();
            let event = SynthesisEvent::Audio(SynthesizedAudio {
                pcm: Bytes::from(pcm),
                sample_rate: 8000,
            });
            if events.send(event).await.is_err() {
                return;
            }
        }
    }

    fn mode(&self) -> &'static str {
        "recording"
    }
}
