//! Per-call conversation pipeline.
//!
//! ```text
//! call audio -> codec -> TranscriptionStream -> final transcript -> ChatModel
//!      ^                                                                |
//!      +-- codec <- SynthesisStream <- WordChunk <- TokenReassembler <--+
//! ```
//!
//! A [`CallPipeline`] moves `Created -> Listening -> Closed`. While listening,
//! two tasks run: the conversation task turns final transcripts into model
//! turns and word chunks, and the audio-out task turns synthesized PCM into
//! telephony frames. Only one model turn is in flight at a time; finals that
//! arrive during a turn wait until that turn's end-of-turn marker has been
//! queued for synthesis.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::core::codec;
use crate::core::llm::{
    ChatModel, Conversation, GenerationEvent, TokenReassembler, WordChunk,
};
use crate::core::queue::QueueWriter;
use crate::core::stt::{
    RecognitionService, TranscriptUpdates, TranscriptionStream, TranscriptionUpdate,
};
use crate::core::tts::{BoxedSynthesisBackend, SynthesisEvent, SynthesisStream};

/// Settings a pipeline needs from the relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub recognizer_sample_rate: u32,
    pub audio_queue_capacity: usize,
    pub chunk_queue_capacity: usize,
    pub persona: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recognizer_sample_rate: 8000,
            audio_queue_capacity: 64,
            chunk_queue_capacity: 32,
            persona: crate::core::llm::DEFAULT_PERSONA.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Listening,
    Closed,
}

pub struct CallPipeline {
    config: PipelineConfig,
    recognizer: Arc<dyn RecognitionService>,
    chat: Arc<dyn ChatModel>,
    synthesis_backend: Option<BoxedSynthesisBackend>,
    outbound: Option<mpsc::Sender<Bytes>>,
    state: PipelineState,
    transcription: Option<TranscriptionStream>,
    synthesis: Option<SynthesisStream>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CallPipeline {
    /// Create a pipeline for one call.
    ///
    /// `outbound` receives mu-law frames at telephony rate, ready to be
    /// written to the call.
    pub fn new(
        config: PipelineConfig,
        recognizer: Arc<dyn RecognitionService>,
        chat: Arc<dyn ChatModel>,
        synthesis_backend: BoxedSynthesisBackend,
        outbound: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            config,
            recognizer,
            chat,
            synthesis_backend: Some(synthesis_backend),
            outbound: Some(outbound),
            state: PipelineState::Created,
            transcription: None,
            synthesis: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Begin listening. `description` seeds the conversation's system
    /// instruction. Only valid once, from `Created`.
    pub fn start(&mut self, description: &str) {
        if self.state != PipelineState::Created {
            warn!(state = ?self.state, "Ignoring start on a pipeline that already started");
            return;
        }
        let (Some(backend), Some(outbound)) =
            (self.synthesis_backend.take(), self.outbound.take())
        else {
            return;
        };

        let (transcription, updates) =
            TranscriptionStream::new(self.recognizer.clone(), self.config.audio_queue_capacity);
        let (synthesis, synthesis_events) =
            SynthesisStream::spawn(backend, self.config.chunk_queue_capacity);

        let conversation = ConversationTask {
            updates,
            chat: self.chat.clone(),
            chunks: synthesis.writer(),
            conversation: Conversation::new(&self.config.persona, description),
            cancel: self.cancel.clone(),
        };
        self.tasks.push(tokio::spawn(conversation.run()));
        self.tasks.push(tokio::spawn(forward_audio(
            synthesis_events,
            outbound,
            self.cancel.clone(),
        )));

        self.transcription = Some(transcription);
        self.synthesis = Some(synthesis);
        self.state = PipelineState::Listening;
        info!(
            model = self.chat.model_name(),
            synthesis = self.synthesis.as_ref().map(|s| s.mode()).unwrap_or_default(),
            "Call pipeline listening"
        );
    }

    /// Push one inbound telephony frame (mu-law, 8 kHz).
    ///
    /// Malformed frames are logged and dropped. Ignored unless listening.
    pub async fn push_audio(&mut self, frame: &[u8]) {
        if self.state != PipelineState::Listening {
            trace!(state = ?self.state, "Dropping inbound audio");
            return;
        }
        let Some(transcription) = self.transcription.as_mut() else {
            return;
        };

        match codec::to_recognizer_format(frame, self.config.recognizer_sample_rate) {
            Ok(pcm) => transcription.push(pcm).await,
            Err(e) => warn!(error = %e, "Dropping malformed inbound frame"),
        }
    }

    /// Tear the call down. When this returns no task of the call is alive
    /// and nothing more is written to `outbound`.
    pub async fn close(&mut self) {
        if self.state == PipelineState::Closed {
            return;
        }
        self.state = PipelineState::Closed;
        self.cancel.cancel();

        if let Some(mut transcription) = self.transcription.take() {
            transcription.close().await;
        }
        if let Some(mut synthesis) = self.synthesis.take() {
            synthesis.close().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        self.synthesis_backend = None;
        self.outbound = None;

        info!("Call pipeline closed");
    }
}

impl Drop for CallPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

// =============================================================================
// Conversation task
// =============================================================================

struct ActiveTurn {
    caller_text: String,
    reply: String,
    reassembler: TokenReassembler,
    events: mpsc::Receiver<GenerationEvent>,
}

struct ConversationTask {
    updates: TranscriptUpdates,
    chat: Arc<dyn ChatModel>,
    chunks: QueueWriter<WordChunk>,
    conversation: Conversation,
    cancel: CancellationToken,
}

impl ConversationTask {
    async fn run(mut self) {
        let mut queued: VecDeque<String> = VecDeque::new();
        let mut active: Option<ActiveTurn> = None;
        let mut listening = true;

        loop {
            while active.is_none() {
                let Some(text) = queued.pop_front() else {
                    break;
                };
                active = self.begin_turn(text).await;
                if self.cancel.is_cancelled() {
                    return;
                }
            }

            if active.is_none() && !listening {
                debug!("No more transcripts, conversation task done");
                return;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                update = self.updates.next(), if listening => match update {
                    Some(TranscriptionUpdate::Transcript(event)) if event.is_final() => {
                        let text = event.text.trim().to_string();
                        if text.is_empty() {
                            continue;
                        }
                        if active.is_some() {
                            info!(transcript = %text, "Reply still streaming, deferring final transcript");
                        }
                        queued.push_back(text);
                    }
                    Some(TranscriptionUpdate::Transcript(event)) => {
                        trace!(transcript = %event.text, "Ignoring partial transcript");
                    }
                    Some(TranscriptionUpdate::Failed(e)) => {
                        error!(error = %e, "Speech recognition lost for the rest of the call");
                        listening = false;
                    }
                    None => listening = false,
                },
                event = next_generation_event(&mut active) => {
                    match event {
                        Some(GenerationEvent::Token(token)) => {
                            if let Some(turn) = active.as_mut() {
                                turn.reply.push_str(&token);
                                if let Some(chunk) = turn.reassembler.push(&token) {
                                    self.forward_chunk(chunk).await;
                                }
                            }
                        }
                        Some(GenerationEvent::Failed(e)) => {
                            error!(error = %e, "Reply generation failed");
                            if let Some(turn) = active.take() {
                                self.finish_turn(turn).await;
                            }
                        }
                        Some(GenerationEvent::Finished) | None => {
                            if let Some(turn) = active.take() {
                                self.finish_turn(turn).await;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Submit `caller_text` to the model. A turn that cannot start still
    /// closes with an end-of-turn marker.
    async fn begin_turn(&mut self, caller_text: String) -> Option<ActiveTurn> {
        info!(transcript = %caller_text, "Submitting caller turn");
        let messages = self.conversation.messages_for(&caller_text);

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = self.chat.stream_reply(&messages) => result,
        };

        match result {
            Ok(events) => Some(ActiveTurn {
                caller_text,
                reply: String::new(),
                reassembler: TokenReassembler::new(),
                events,
            }),
            Err(e) => {
                error!(error = %e, "Failed to start reply generation");
                self.forward_chunk(WordChunk::end_of_turn()).await;
                self.conversation.record_turn(caller_text, String::new());
                None
            }
        }
    }

    async fn finish_turn(&mut self, mut turn: ActiveTurn) {
        for chunk in turn.reassembler.finish() {
            self.forward_chunk(chunk).await;
        }
        debug!(chars = turn.reply.len(), "Reply complete");
        self.conversation.record_turn(turn.caller_text, turn.reply);
    }

    async fn forward_chunk(&self, chunk: WordChunk) {
        trace!(chunk = chunk.text(), "Forwarding word chunk");
        if let Err(e) = self.chunks.push(chunk).await {
            debug!(error = %e, "Synthesis stopped, dropping word chunk");
        }
    }
}

async fn next_generation_event(active: &mut Option<ActiveTurn>) -> Option<GenerationEvent> {
    match active {
        Some(turn) => turn.events.recv().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Audio-out task
// =============================================================================

async fn forward_audio(
    mut events: mpsc::Receiver<SynthesisEvent>,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };

        match event {
            Some(SynthesisEvent::Audio(audio)) => {
                let frame = match codec::to_telephony_format(&audio.pcm, audio.sample_rate) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed synthesized audio");
                        continue;
                    }
                };
                if frame.is_empty() || cancel.is_cancelled() {
                    continue;
                }
                if outbound.send(frame).await.is_err() {
                    debug!("Call audio writer gone, stopping audio-out");
                    return;
                }
            }
            Some(SynthesisEvent::ChunkFailed { text, error }) => {
                warn!(error = %error, chunk = %text, "Skipping audio for failed chunk");
            }
            None => return,
        }
    }
}
