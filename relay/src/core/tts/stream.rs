//! Per-call synthesis stream.
//!
//! Owns the word-chunk queue feeding a [`SynthesisBackend`] and the task
//! running it. Audio comes back on a separate channel, in the order of the
//! chunks that produced it.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::base::{BoxedSynthesisBackend, SynthesisEvent};
use crate::core::llm::WordChunk;
use crate::core::queue::{self, QueueClosed, QueueWriter};

pub struct SynthesisStream {
    chunks: QueueWriter<WordChunk>,
    task: Option<JoinHandle<()>>,
    mode: &'static str,
}

impl SynthesisStream {
    /// Start `backend` behind a chunk queue of `capacity` entries.
    pub fn spawn(
        backend: BoxedSynthesisBackend,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<SynthesisEvent>) {
        let (chunks, reader) = queue::bounded("word-chunks", capacity);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let mode = backend.mode();

        info!(mode, "Starting synthesis stream");
        let task = tokio::spawn(async move {
            backend.run(reader, events_tx).await;
            debug!(mode, "Synthesis backend finished");
        });

        (
            Self {
                chunks,
                task: Some(task),
                mode,
            },
            events_rx,
        )
    }

    /// A writer for the chunk queue. Pushes wait while the queue is full.
    pub fn writer(&self) -> QueueWriter<WordChunk> {
        self.chunks.clone()
    }

    pub async fn push(&self, chunk: WordChunk) -> Result<(), QueueClosed> {
        self.chunks.push(chunk).await
    }

    pub fn mode(&self) -> &'static str {
        self.mode
    }

    /// Abandon in-flight synthesis. Audio not yet delivered is dropped.
    pub async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!(mode = self.mode, "Synthesis stream closed");
        }
    }
}

impl Drop for SynthesisStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
