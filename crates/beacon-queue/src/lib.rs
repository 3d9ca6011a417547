//! beacon-queue — write serialization for Beacon.
//!
//! Every mutation of the state store travels through this crate:
//!
//! ```text
//! producers (any task)            consumer (one task)
//!   WriteQueue::submit ──┐
//!   WriteQueue::submit ──┼──▶ unbounded FIFO ──▶ WriteConsumer ──▶ StateWriter
//!   WriteQueue::sync   ──┘                          (sole writer)
//! ```
//!
//! The consumer owns the store's only [`StateWriter`](beacon_state::StateWriter),
//! so intents are applied one at a time in global enqueue order. Reads do
//! not go through the queue and may observe state older than an intent that
//! is still pending; [`WriteQueue::sync`] waits for the queue to catch up.
//!
//! The queue is not persisted. Intents still queued when the process exits
//! without a graceful shutdown are lost.

pub mod consumer;
pub mod intent;
pub mod queue;

pub use consumer::{ConsumerStats, WriteConsumer, spawn};
pub use intent::{Outcome, WriteIntent};
pub use queue::{IntentReceiver, QueueError, WriteQueue, channel};
