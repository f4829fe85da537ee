//! Per-call transcription stream.
//!
//! Wraps a [`RecognitionService`] with the call-level lifecycle
//! `Idle -> Streaming -> Closed`. The remote session is opened lazily by the
//! first audio push, results are exposed as a single lazy sequence of
//! [`TranscriptionUpdate`], and once closed the stream never reopens.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::base::{RecognitionService, STTError, TranscriptEvent};
use crate::core::queue::{self, QueueWriter};

/// Lifecycle of a transcription stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionState {
    /// No audio seen yet, no remote session held.
    Idle,
    /// Remote session open and accepting audio.
    Streaming,
    /// Call ended or the session failed. Audio is dropped.
    Closed,
}

/// One item of the transcript sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionUpdate {
    Transcript(TranscriptEvent),
    /// Terminal: the recognition session failed and will not come back.
    Failed(STTError),
}

/// Consumer side of a transcription stream.
///
/// Yields nothing once the owning stream has been closed, even if results
/// were still buffered.
pub struct TranscriptUpdates {
    rx: mpsc::Receiver<TranscriptionUpdate>,
    cancel: CancellationToken,
}

impl TranscriptUpdates {
    pub async fn next(&mut self) -> Option<TranscriptionUpdate> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            update = self.rx.recv() => update,
        }
    }
}

pub struct TranscriptionStream {
    service: Arc<dyn RecognitionService>,
    capacity: usize,
    state: Arc<Mutex<TranscriptionState>>,
    audio: Option<QueueWriter<Bytes>>,
    updates_tx: Option<mpsc::Sender<TranscriptionUpdate>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TranscriptionStream {
    /// Create an idle stream and its update sequence.
    ///
    /// `capacity` bounds both the audio queue towards the service and the
    /// result buffer towards the consumer.
    pub fn new(service: Arc<dyn RecognitionService>, capacity: usize) -> (Self, TranscriptUpdates) {
        let (updates_tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let stream = Self {
            service,
            capacity,
            state: Arc::new(Mutex::new(TranscriptionState::Idle)),
            audio: None,
            updates_tx: Some(updates_tx),
            cancel: cancel.clone(),
            task: None,
        };

        (stream, TranscriptUpdates { rx, cancel })
    }

    pub fn state(&self) -> TranscriptionState {
        *self.state.lock()
    }

    /// Push one frame of recognizer-format audio.
    ///
    /// Opens the remote session on the first call. Waits while the audio
    /// queue is full. Frames pushed after close are dropped silently.
    pub async fn push(&mut self, frame: Bytes) {
        match self.state() {
            TranscriptionState::Closed => {
                trace!("Transcription closed, dropping {} bytes", frame.len());
                return;
            }
            TranscriptionState::Idle => self.open(),
            TranscriptionState::Streaming => {}
        }

        let Some(audio) = &self.audio else {
            return;
        };

        if audio.push(frame).await.is_err() {
            debug!("Recognition session gone, closing transcription stream");
            *self.state.lock() = TranscriptionState::Closed;
            self.audio = None;
        }
    }

    fn open(&mut self) {
        let Some(updates) = self.updates_tx.take() else {
            *self.state.lock() = TranscriptionState::Closed;
            return;
        };

        let (writer, reader) = queue::bounded("audio-in", self.capacity);
        let (results_tx, mut results_rx) = mpsc::channel::<TranscriptEvent>(self.capacity);
        self.audio = Some(writer);
        *self.state.lock() = TranscriptionState::Streaming;

        let service = self.service.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();

        info!(
            provider = service.provider_name(),
            "Opening recognition session"
        );

        let task = tokio::spawn(async move {
            let session = service.run_session(reader, results_tx);
            tokio::pin!(session);

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break None,
                    Some(event) = results_rx.recv() => {
                        if updates.send(TranscriptionUpdate::Transcript(event)).await.is_err() {
                            break None;
                        }
                    }
                    result = &mut session => break Some(result),
                }
            };

            if let Some(result) = outcome {
                while let Ok(event) = results_rx.try_recv() {
                    if cancel.is_cancelled()
                        || updates
                            .send(TranscriptionUpdate::Transcript(event))
                            .await
                            .is_err()
                    {
                        break;
                    }
                }

                match result {
                    Ok(()) => info!("Recognition session ended"),
                    Err(e) => {
                        error!(error = %e, "Recognition session failed, transcription stops for this call");
                        let _ = updates.send(TranscriptionUpdate::Failed(e)).await;
                    }
                }
            }

            *state.lock() = TranscriptionState::Closed;
        });

        self.task = Some(task);
    }

    /// Close the stream and the remote session. Idempotent.
    pub async fn close(&mut self) {
        *self.state.lock() = TranscriptionState::Closed;
        self.cancel.cancel();
        self.audio = None;
        self.updates_tx = None;

        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("Transcription stream closed");
        }
    }
}

impl Drop for TranscriptionStream {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
