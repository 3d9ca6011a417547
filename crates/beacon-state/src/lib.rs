//! beacon-state — credential and system record store for Beacon.
//!
//! Backed by [redb](https://docs.rs/redb). Two tables hold the persisted
//! state: `credentials` (id → password hash → access tier) and
//! `system_records` (id → display name → heartbeat → telemetry).
//!
//! # Architecture
//!
//! Rows are JSON-serialized into redb's `&[u8]` value columns, keyed by row
//! id. Access is split in two:
//!
//! - [`StateStore`] is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//!   and only reads. Any task may hold one.
//! - [`StateWriter`] is the single mutating handle. It is handed out once per
//!   opened database via [`StateStore::take_writer`] and is meant to be owned
//!   by the write consumer for the lifetime of the process.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod writer;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
pub use writer::StateWriter;
