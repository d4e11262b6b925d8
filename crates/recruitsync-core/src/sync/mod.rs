//! Realtime synchronization layer
//!
//! Multi-channel snapshot fan-out (same process, cross-process via the
//! durable store, cross-device via the hosted channel) with a single
//! last-writer-wins acceptance gate in front of the application.

mod client;
mod connectivity;
mod transport;

pub use client::{RealtimeSyncClient, SnapshotCallback, SyncContext};
pub use connectivity::{ConnectivitySignal, StaticConnectivity};
pub use transport::{
    BroadcastTransport, ChannelMessage, HttpChannelTransport, ProcessBroadcast,
    SnapshotSubscription,
};
