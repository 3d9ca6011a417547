//! Write consumer — the background task that owns the [`StateWriter`].
//!
//! Dequeues one envelope at a time and applies it. A failing intent is
//! logged and dropped; the loop itself only ends on shutdown or once every
//! producer handle is gone.

use beacon_state::StateWriter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::intent::{Outcome, WriteIntent};
use crate::queue::{self, Envelope, IntentReceiver, WriteQueue};

/// Counters reported when the consumer stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Intents handed to the store, including updates that matched no row.
    pub applied: u64,
    /// Intents dropped because they were malformed or failed to apply.
    pub skipped: u64,
}

pub struct WriteConsumer {
    receiver: IntentReceiver,
    writer: StateWriter,
    stats: ConsumerStats,
}

/// Create the queue and start its consumer task.
pub fn spawn(
    writer: StateWriter,
    shutdown: watch::Receiver<bool>,
) -> (WriteQueue, JoinHandle<ConsumerStats>) {
    let (queue, receiver) = queue::channel();
    let consumer = WriteConsumer::new(receiver, writer);
    let handle = tokio::spawn(consumer.run(shutdown));
    (queue, handle)
}

impl WriteConsumer {
    pub fn new(receiver: IntentReceiver, writer: StateWriter) -> Self {
        Self {
            receiver,
            writer,
            stats: ConsumerStats::default(),
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Run until shutdown is signalled or all producers are dropped.
    ///
    /// On shutdown the queue stops accepting intents and everything already
    /// queued is applied before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!("write consumer started");

        loop {
            // Shutdown is polled first so a busy queue cannot starve it.
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!(
                        pending = self.receiver.len(),
                        "write consumer shutting down, draining queue"
                    );
                    self.receiver.close();
                    self.drain();
                    break;
                }
                envelope = self.receiver.recv() => match envelope {
                    Some(envelope) => self.handle(envelope),
                    None => {
                        info!("all producers dropped, write consumer exiting");
                        break;
                    }
                },
            }
        }

        info!(
            applied = self.stats.applied,
            skipped = self.stats.skipped,
            "write consumer stopped"
        );
        self.stats
    }

    /// Apply everything currently queued without waiting for more.
    pub fn drain(&mut self) {
        while let Some(envelope) = self.receiver.try_recv() {
            self.handle(envelope);
        }
    }

    fn handle(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Intent(intent) => self.process(intent),
            Envelope::Encoded(raw) => match serde_json::from_str::<WriteIntent>(&raw) {
                Ok(intent) => self.process(intent),
                Err(e) => {
                    self.stats.skipped += 1;
                    error!(intent = %raw, error = %e, "unrecognised intent in write queue, skipped");
                }
            },
            Envelope::Barrier(done) => {
                // The waiter may have given up; nothing to do then.
                let _ = done.send(());
            }
        }
    }

    fn process(&mut self, intent: WriteIntent) {
        let op = intent.op();
        match intent.apply(&mut self.writer) {
            Ok(Outcome::Applied) => {
                self.stats.applied += 1;
                debug!(op, "intent applied");
            }
            Ok(Outcome::NoMatchingRow) => {
                self.stats.applied += 1;
                debug!(op, "intent matched no row");
            }
            Err(e) => {
                self.stats.skipped += 1;
                error!(op, error = %e, "intent failed, skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{AccessTier, Table, TierFilter};
    use beacon_state::StateStore;
    use serde_json::json;

    fn start() -> (
        StateStore,
        WriteQueue,
        watch::Sender<bool>,
        JoinHandle<ConsumerStats>,
    ) {
        let store = StateStore::open_in_memory().unwrap();
        let writer = store.take_writer().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue, handle) = spawn(writer, shutdown_rx);
        (store, queue, shutdown_tx, handle)
    }

    #[tokio::test]
    async fn inserted_credential_is_readable() {
        let (store, queue, _shutdown, _handle) = start();

        queue
            .submit(WriteIntent::insert_row(Table::Credentials, ["u1", "hash1", "client"]))
            .unwrap();
        queue.sync().await.unwrap();

        let row = store
            .credential_for("u1", TierFilter::Only(AccessTier::Client))
            .unwrap()
            .unwrap();
        assert_eq!(row.password_hash.as_deref(), Some("hash1"));
    }

    #[tokio::test]
    async fn merge_after_insert() {
        let (store, queue, _shutdown, _handle) = start();

        queue
            .submit(WriteIntent::insert_row(Table::SystemRecords, ["s1", "", "", "{}"]))
            .unwrap();
        queue
            .submit(WriteIntent::merge_telemetry("s1", "temp", json!(42)))
            .unwrap();
        queue.sync().await.unwrap();

        let telemetry = store.telemetry("s1").unwrap().unwrap();
        assert_eq!(serde_json::to_value(&telemetry).unwrap(), json!({"temp": 42}));
    }

    #[tokio::test]
    async fn heartbeat_update_is_readable() {
        let (store, queue, _shutdown, _handle) = start();

        queue
            .submit(WriteIntent::insert_row(Table::SystemRecords, ["s1", "", "", "{}"]))
            .unwrap();
        queue
            .submit(WriteIntent::update_column(Table::SystemRecords, "s1", "heartbeat", "1000"))
            .unwrap();
        queue.sync().await.unwrap();

        assert_eq!(store.heartbeat("s1").unwrap().as_deref(), Some("1000"));
    }

    #[tokio::test]
    async fn merges_keep_unrelated_keys() {
        let (store, queue, _shutdown, _handle) = start();

        queue
            .submit(WriteIntent::insert_row(Table::SystemRecords, ["s1", "", "", "{}"]))
            .unwrap();
        queue
            .submit(WriteIntent::merge_telemetry("s1", "k1", json!("v1")))
            .unwrap();
        queue
            .submit(WriteIntent::merge_telemetry("s1", "k2", json!([1, 2])))
            .unwrap();
        queue.sync().await.unwrap();

        let telemetry = store.telemetry("s1").unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&telemetry).unwrap(),
            json!({"k1": "v1", "k2": [1, 2]})
        );
    }

    #[tokio::test]
    async fn update_of_missing_row_is_noop() {
        let (store, queue, shutdown, handle) = start();

        queue
            .submit(WriteIntent::update_column(Table::SystemRecords, "ghost", "heartbeat", "1"))
            .unwrap();
        queue.sync().await.unwrap();

        assert!(store.system("ghost").unwrap().is_none());
        assert_eq!(store.row_count(Table::SystemRecords).unwrap(), 0);

        shutdown.send(true).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats, ConsumerStats { applied: 1, skipped: 0 });
    }

    #[tokio::test]
    async fn unrecognised_intent_is_skipped() {
        let (store, queue, shutdown, handle) = start();

        queue
            .submit_encoded(r#"{"op":"drop_table","table":"credentials"}"#)
            .unwrap();
        queue.submit_encoded("not even json").unwrap();
        queue
            .submit_encoded(
                r#"{"op":"insert_row","table":"credentials","values":["u2","h","admin"]}"#,
            )
            .unwrap();
        queue.sync().await.unwrap();

        assert_eq!(store.credential_ids().unwrap(), vec!["u2".to_string()]);

        shutdown.send(true).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats, ConsumerStats { applied: 1, skipped: 2 });
    }

    #[tokio::test]
    async fn failing_intents_do_not_stop_the_loop() {
        let (store, queue, shutdown, handle) = start();

        // Field count mismatch.
        queue
            .submit(WriteIntent::insert_row(Table::Credentials, ["u1", "h"]))
            .unwrap();
        // Corrupt telemetry blob, then a merge over it.
        queue
            .submit(WriteIntent::insert_row(Table::SystemRecords, ["s1", "", "", "{oops"]))
            .unwrap();
        queue
            .submit(WriteIntent::merge_telemetry("s1", "k", json!(1)))
            .unwrap();
        // Merge into a system that does not exist.
        queue
            .submit(WriteIntent::merge_telemetry("ghost", "k", json!(1)))
            .unwrap();
        // Later valid intents still land.
        queue
            .submit(WriteIntent::update_column(Table::SystemRecords, "s1", "telemetry", "{}"))
            .unwrap();
        queue
            .submit(WriteIntent::merge_telemetry("s1", "k", json!(2)))
            .unwrap();
        queue.sync().await.unwrap();

        assert_eq!(store.telemetry_value("s1", "k").unwrap(), Some(json!(2)));
        assert!(store.credential("u1").unwrap().is_none());

        shutdown.send(true).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats, ConsumerStats { applied: 3, skipped: 3 });
    }

    #[tokio::test]
    async fn shutdown_drains_queued_intents() {
        let store = StateStore::open_in_memory().unwrap();
        let writer = store.take_writer().unwrap();
        let (queue, receiver) = queue::channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        for i in 0..10 {
            let id = format!("u{i}");
            queue
                .submit(WriteIntent::insert_row(Table::Credentials, [id.as_str(), "h", "client"]))
                .unwrap();
        }
        // Signal before the consumer even starts; queued work still lands.
        shutdown_tx.send(true).unwrap();

        let stats = WriteConsumer::new(receiver, writer).run(shutdown_rx).await;
        assert_eq!(stats.applied, 10);
        assert_eq!(store.credential_ids().unwrap().len(), 10);
        assert_eq!(queue.pending(), 0);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn shutdown_is_honoured_under_sustained_load() {
        let (store, queue, shutdown, handle) = start();
        queue
            .submit(WriteIntent::insert_row(Table::SystemRecords, ["s1", "", "", "{}"]))
            .unwrap();

        let producer = tokio::spawn({
            let queue = queue.clone();
            async move {
                let mut sent = 0u64;
                while queue
                    .submit(WriteIntent::merge_telemetry("s1", "n", json!(sent)))
                    .is_ok()
                {
                    sent += 1;
                    tokio::task::yield_now().await;
                }
                sent
            }
        });

        // Let the producer keep the queue busy for a while.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        shutdown.send(true).unwrap();

        let stats = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("consumer did not stop under load")
            .unwrap();
        let sent = producer.await.unwrap();

        // Every accepted intent was applied; later submits were refused.
        assert_eq!(stats.applied, sent + 1);
        assert_eq!(stats.skipped, 0);
        assert!(queue.is_closed());
        assert_eq!(store.telemetry_value("s1", "n").unwrap(), Some(json!(sent - 1)));
    }

    #[tokio::test]
    async fn exits_when_producers_are_dropped() {
        let (_store, queue, _shutdown, handle) = start();
        queue
            .submit(WriteIntent::insert_row(Table::SystemRecords, ["s1", "", "", "{}"]))
            .unwrap();
        drop(queue);

        let stats = handle.await.unwrap();
        assert_eq!(stats.applied, 1);
    }
}
