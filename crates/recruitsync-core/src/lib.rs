//! recruitsync-core - Core library for RecruitSync
//!
//! The client-side state synchronization layer of the recruitment portal:
//! snapshot model with last-writer-wins acceptance, durable local cache
//! with a pending-write outbox, remote data gateway, multi-channel realtime
//! fan-out, and the periodic reconciliation loop.

pub mod drain;
pub mod error;
pub mod gateway;
pub mod models;
pub mod recon;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use snapshot::{load_initial, Snapshot, SnapshotGate, SnapshotPayload};
