//! Unbounded, multi-producer, single-consumer operation queue.
//!
//! Backed by a tokio unbounded mpsc channel, so submission never blocks and
//! the order in which `submit` calls complete, across all producers, is the
//! order in which the consumer applies them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::intent::WriteIntent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The consumer has stopped and dropped its end of the queue.
    #[error("write consumer is not running")]
    Closed,
}

/// What travels through the channel.
pub(crate) enum Envelope {
    Intent(WriteIntent),
    /// A JSON-encoded intent, decoded by the consumer.
    Encoded(String),
    /// Resolved once everything queued before it has been handled.
    Barrier(oneshot::Sender<()>),
}

/// Producer handle. Cheap to clone; every clone feeds the same queue.
#[derive(Debug, Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Envelope>,
    depth: Arc<AtomicUsize>,
}

/// Consumer end of the queue. Owned by exactly one [`crate::WriteConsumer`].
pub struct IntentReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
    depth: Arc<AtomicUsize>,
}

/// Create a connected producer/consumer pair.
pub fn channel() -> (WriteQueue, IntentReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        WriteQueue {
            tx,
            depth: depth.clone(),
        },
        IntentReceiver { rx, depth },
    )
}

impl WriteQueue {
    /// Enqueue an intent. Never blocks.
    pub fn submit(&self, intent: WriteIntent) -> Result<(), QueueError> {
        self.send_counted(Envelope::Intent(intent))
    }

    /// Enqueue a JSON-encoded intent. Decoding happens in the consumer;
    /// an undecodable intent is logged and skipped there.
    pub fn submit_encoded(&self, encoded: impl Into<String>) -> Result<(), QueueError> {
        self.send_counted(Envelope::Encoded(encoded.into()))
    }

    /// Wait until every intent submitted before this call has been applied
    /// or skipped.
    pub async fn sync(&self) -> Result<(), QueueError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Envelope::Barrier(done_tx))
            .map_err(|_| QueueError::Closed)?;
        done_rx.await.map_err(|_| QueueError::Closed)
    }

    /// Intents submitted but not yet taken by the consumer.
    pub fn pending(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send_counted(&self, envelope: Envelope) -> Result<(), QueueError> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        self.tx.send(envelope).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            QueueError::Closed
        })
    }
}

impl IntentReceiver {
    pub(crate) async fn recv(&mut self) -> Option<Envelope> {
        let envelope = self.rx.recv().await;
        self.account(&envelope);
        envelope
    }

    /// Refuse further submissions; already queued envelopes stay receivable.
    pub(crate) fn close(&mut self) {
        self.rx.close();
    }

    /// Envelopes currently buffered, barriers included.
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn try_recv(&mut self) -> Option<Envelope> {
        let envelope = self.rx.try_recv().ok();
        self.account(&envelope);
        envelope
    }

    fn account(&self, envelope: &Option<Envelope>) {
        if matches!(envelope, Some(Envelope::Intent(_) | Envelope::Encoded(_))) {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::Table;

    #[tokio::test]
    async fn fifo_across_producers() {
        let (queue, mut receiver) = channel();
        let other = queue.clone();

        queue
            .submit(WriteIntent::update_column(Table::SystemRecords, "a", "heartbeat", "1"))
            .unwrap();
        other
            .submit(WriteIntent::update_column(Table::SystemRecords, "b", "heartbeat", "2"))
            .unwrap();
        queue.submit_encoded("{}").unwrap();
        assert_eq!(queue.pending(), 3);

        let mut ids = Vec::new();
        while let Some(envelope) = receiver.try_recv() {
            match envelope {
                Envelope::Intent(WriteIntent::UpdateColumn { id, .. }) => ids.push(id),
                Envelope::Encoded(raw) => ids.push(raw),
                _ => panic!("unexpected envelope"),
            }
        }
        assert_eq!(ids, vec!["a", "b", "{}"]);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn submit_after_consumer_drop_is_closed() {
        let (queue, receiver) = channel();
        drop(receiver);

        assert!(queue.is_closed());
        let err = queue
            .submit(WriteIntent::merge_telemetry("s1", "k", serde_json::json!(1)))
            .unwrap_err();
        assert_eq!(err, QueueError::Closed);
        assert_eq!(queue.pending(), 0);
        assert_eq!(queue.sync().await, Err(QueueError::Closed));
    }
}
