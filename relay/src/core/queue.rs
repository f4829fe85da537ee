//! Bounded FIFO queue shared by the pipeline stages.
//!
//! Every hand-off inside a call pipeline that needs backpressure goes through
//! this one type: audio frames into the recognizer and word chunks into the
//! synthesizer. Writers suspend while the queue is full, so a slow consumer
//! slows its producer instead of losing or reordering data.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Returned when pushing into a queue whose reader is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{stage} queue is closed")]
pub struct QueueClosed {
    /// Name of the pipeline stage that owned the queue.
    pub stage: &'static str,
}

/// Create a bounded queue for one pipeline stage.
///
/// # Panics
///
/// Panics if `capacity` is zero, like [`tokio::sync::mpsc::channel`].
pub fn bounded<T>(stage: &'static str, capacity: usize) -> (QueueWriter<T>, QueueReader<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueWriter { stage, tx }, QueueReader { stage, rx })
}

/// Producer half. Cheap to clone.
#[derive(Debug)]
pub struct QueueWriter<T> {
    stage: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueWriter<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueWriter<T> {
    /// Push an item, waiting while the queue is full.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.tx
            .send(item)
            .await
            .map_err(|_| QueueClosed { stage: self.stage })
    }

    /// Whether the reader has been dropped or closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

/// Consumer half. There is exactly one reader per queue.
#[derive(Debug)]
pub struct QueueReader<T> {
    stage: &'static str,
    rx: mpsc::Receiver<T>,
}

impl<T> QueueReader<T> {
    /// Pull the next item in arrival order.
    ///
    /// Returns `None` once every writer is gone and the queue has drained.
    pub async fn pull(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop accepting new items. Items already queued can still be pulled.
    pub fn close(&mut self) {
        debug!(stage = self.stage, "Closing stage queue");
        self.rx.close();
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_fifo_order() {
        let (writer, mut reader) = bounded("test", 8);
        for i in 0..5 {
            writer.push(i).await.unwrap();
        }
        drop(writer);

        let mut seen = Vec::new();
        while let Some(item) = reader.pull().await {
            seen.push(item);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_push_suspends_when_full() {
        let (writer, mut reader) = bounded("test", 1);
        writer.push(1).await.unwrap();

        let blocked = timeout(Duration::from_millis(50), writer.push(2)).await;
        assert!(blocked.is_err(), "push should wait while the queue is full");

        assert_eq!(reader.pull().await, Some(1));
        timeout(Duration::from_millis(50), writer.push(3))
            .await
            .expect("push should proceed once space frees up")
            .unwrap();
        assert_eq!(reader.pull().await, Some(3));
    }

    #[tokio::test]
    async fn test_push_after_reader_dropped() {
        let (writer, reader) = bounded::<u8>("audio-in", 4);
        drop(reader);

        assert!(writer.is_closed());
        let err = writer.push(1).await.unwrap_err();
        assert_eq!(err.stage, "audio-in");
        assert_eq!(err.to_string(), "audio-in queue is closed");
    }

    #[tokio::test]
    async fn test_close_keeps_queued_items() {
        let (writer, mut reader) = bounded("test", 4);
        writer.push("a").await.unwrap();
        reader.close();

        assert!(writer.push("b").await.is_err());
        assert_eq!(reader.pull().await, Some("a"));
        assert_eq!(reader.pull().await, None);
    }
}
