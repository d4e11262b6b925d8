//! Snapshot envelope and last-writer-wins acceptance.
//!
//! A [`Snapshot`] is the unit of synchronization: the full state bundle plus
//! a logical clock (`updated_at`, milliseconds) and the writer's client id.
//! Conflict resolution is whole-snapshot last-writer-wins - the snapshot
//! with the highest accepted `updated_at` fully replaces the working copy.
//! The decision lives in [`SnapshotGate`] so a finer-grained merge strategy
//! could replace it without touching the delivery channels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Booking, Candidate, Notification, SystemConfig, User};
use crate::store::LocalCache;
use crate::util::now_ms;

/// Writer identity stamped on the snapshot seeded at first launch.
pub const BOOTSTRAP_WRITER: &str = "bootstrap";

/// The synchronized collections, without the version envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub bookings: Vec<Booking>,
    pub candidates: Vec<Candidate>,
    pub users: Vec<User>,
    /// Pull-only broadcast artifacts; not persisted by the local cache.
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub system_config: SystemConfig,
}

/// The full synchronized state bundle plus logical timestamp and writer.
///
/// Value-equal and immutable once published; an accepted snapshot fully
/// replaces the client's working copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub bookings: Vec<Booking>,
    pub candidates: Vec<Candidate>,
    pub users: Vec<User>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    pub system_config: SystemConfig,
    /// Logical clock (Unix ms); strictly increasing across accepted
    /// snapshots per client
    pub updated_at: i64,
    /// Client or user identifier of the writer
    pub updated_by: String,
}

impl Snapshot {
    /// Stamp a payload with the current time and the given writer identity.
    #[must_use]
    pub fn new(payload: SnapshotPayload, updated_by: impl Into<String>) -> Self {
        Self::with_timestamp(payload, now_ms(), updated_by)
    }

    /// Stamp a payload with an explicit logical timestamp.
    #[must_use]
    pub fn with_timestamp(
        payload: SnapshotPayload,
        updated_at: i64,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            bookings: payload.bookings,
            candidates: payload.candidates,
            users: payload.users,
            notifications: payload.notifications,
            system_config: payload.system_config,
            updated_at,
            updated_by: updated_by.into(),
        }
    }

    /// Parse an untrusted JSON value into a snapshot.
    ///
    /// Structural guard first (the four collection fields must be arrays,
    /// `systemConfig` a non-null object, `updatedAt` a number), then typed
    /// deserialization. Any failure yields `None`; malformed input is
    /// treated as "no update" and never raises an error.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        if !is_valid_shape(value) {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Extract the collections without the version envelope.
    #[must_use]
    pub fn payload(&self) -> SnapshotPayload {
        SnapshotPayload {
            bookings: self.bookings.clone(),
            candidates: self.candidates.clone(),
            users: self.users.clone(),
            notifications: self.notifications.clone(),
            system_config: self.system_config.clone(),
        }
    }
}

/// Shallow structural check of an incoming snapshot value.
#[must_use]
pub fn is_valid_shape(value: &Value) -> bool {
    let all_arrays = ["bookings", "candidates", "users", "notifications"]
        .iter()
        .all(|field| value.get(*field).is_some_and(Value::is_array));

    all_arrays
        && value.get("systemConfig").is_some_and(Value::is_object)
        && value.get("updatedAt").is_some_and(Value::is_number)
}

/// Last-writer-wins acceptance gate.
///
/// Every delivery channel (in-process broadcast, store watcher, cross-device
/// channel, reconciliation) funnels incoming snapshots through one gate, so
/// redundant delivery is harmless: the second arrival of the same snapshot
/// no longer exceeds the watermark.
#[derive(Debug, Clone)]
pub struct SnapshotGate {
    client_id: String,
    last_seen: i64,
}

impl SnapshotGate {
    /// Create a gate for the given local client identity.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            last_seen: 0,
        }
    }

    /// The highest timestamp accepted or published so far.
    #[must_use]
    pub const fn last_seen(&self) -> i64 {
        self.last_seen
    }

    /// The local client identity this gate filters echoes for.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Advance the watermark without accepting anything.
    ///
    /// Called on publish so the publisher never re-accepts its own write
    /// when it is echoed back through a channel.
    pub fn advance(&mut self, timestamp: i64) {
        self.last_seen = self.last_seen.max(timestamp);
    }

    /// Apply the acceptance rule to an already-parsed snapshot.
    ///
    /// Rejects self-echoes and anything at or below the watermark; on
    /// acceptance the watermark advances to the snapshot's timestamp.
    pub fn admit(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        if snapshot.updated_by == self.client_id {
            return None;
        }
        if snapshot.updated_at <= self.last_seen {
            return None;
        }
        self.last_seen = snapshot.updated_at;
        Some(snapshot)
    }

    /// Apply the acceptance rule to an untrusted JSON value.
    pub fn admit_value(&mut self, value: &Value) -> Option<Snapshot> {
        Snapshot::parse(value).and_then(|snapshot| self.admit(snapshot))
    }
}

/// Load the last persisted snapshot, seeding the store on first launch.
///
/// When the cache holds nothing (first run, or storage unavailable), the
/// fallback payload is stamped with the bootstrap writer identity and
/// written back, so callers always receive a well-formed snapshot.
pub async fn load_initial(cache: &LocalCache, fallback: SnapshotPayload) -> Snapshot {
    if let Some(snapshot) = cache.load_snapshot().await {
        return snapshot;
    }
    let seeded = Snapshot::new(fallback, BOOTSTRAP_WRITER);
    cache.save_snapshot(&seeded).await;
    seeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;
    use serde_json::json;

    fn payload_with_candidate(name: &str) -> SnapshotPayload {
        SnapshotPayload {
            candidates: vec![Candidate::new(name, "x@example.com", "Engineer")],
            ..SnapshotPayload::default()
        }
    }

    #[test]
    fn snapshot_json_round_trips() {
        let snapshot = Snapshot::with_timestamp(payload_with_candidate("Ada"), 1000, "client-a");
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value.get("systemConfig").is_some());
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("updatedBy").is_some());

        let parsed = Snapshot::parse(&value).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn parse_rejects_malformed_shapes() {
        // Missing collections entirely
        assert!(Snapshot::parse(&json!({"updatedAt": 1})).is_none());
        // Collection field of the wrong type
        assert!(Snapshot::parse(&json!({
            "bookings": "nope",
            "candidates": [],
            "users": [],
            "notifications": [],
            "systemConfig": {},
            "updatedAt": 1,
            "updatedBy": "x"
        }))
        .is_none());
        // Null config
        assert!(Snapshot::parse(&json!({
            "bookings": [],
            "candidates": [],
            "users": [],
            "notifications": [],
            "systemConfig": null,
            "updatedAt": 1,
            "updatedBy": "x"
        }))
        .is_none());
        // Non-numeric timestamp
        assert!(Snapshot::parse(&json!({
            "bookings": [],
            "candidates": [],
            "users": [],
            "notifications": [],
            "systemConfig": {},
            "updatedAt": "later",
            "updatedBy": "x"
        }))
        .is_none());
    }

    #[test]
    fn gate_accepts_strictly_increasing_timestamps() {
        let mut gate = SnapshotGate::new("self");
        for ts in [10, 20, 30] {
            let snapshot =
                Snapshot::with_timestamp(payload_with_candidate("Ada"), ts, "client-other");
            assert!(gate.admit(snapshot).is_some(), "ts {ts} should be accepted");
        }
        assert_eq!(gate.last_seen(), 30);
    }

    #[test]
    fn gate_rejects_stale_regardless_of_content() {
        let mut gate = SnapshotGate::new("self");
        let fresh = Snapshot::with_timestamp(payload_with_candidate("Ada"), 100, "client-other");
        assert!(gate.admit(fresh).is_some());

        // Equal timestamp: rejected
        let equal = Snapshot::with_timestamp(payload_with_candidate("Eve"), 100, "client-third");
        assert!(gate.admit(equal).is_none());

        // Older timestamp with different content: still rejected
        let older = Snapshot::with_timestamp(payload_with_candidate("Eve"), 99, "client-third");
        assert!(gate.admit(older).is_none());
        assert_eq!(gate.last_seen(), 100);
    }

    #[test]
    fn gate_suppresses_self_echo() {
        let mut gate = SnapshotGate::new("client-aaa");
        gate.advance(1000);

        // Own publish echoed back through a channel: never re-accepted,
        // even with a fresher timestamp.
        let echo = Snapshot::with_timestamp(payload_with_candidate("Ada"), 2000, "client-aaa");
        assert!(gate.admit(echo).is_none());
        assert_eq!(gate.last_seen(), 1000);
    }

    #[test]
    fn gate_advance_is_monotonic() {
        let mut gate = SnapshotGate::new("self");
        gate.advance(500);
        gate.advance(100);
        assert_eq!(gate.last_seen(), 500);
    }

    #[test]
    fn admit_value_silently_drops_garbage() {
        let mut gate = SnapshotGate::new("self");
        assert!(gate.admit_value(&json!(42)).is_none());
        assert!(gate.admit_value(&json!({"bookings": []})).is_none());
        assert_eq!(gate.last_seen(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_initial_seeds_empty_store() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        let seeded = load_initial(&cache, payload_with_candidate("Ada")).await;
        assert_eq!(seeded.updated_by, BOOTSTRAP_WRITER);
        assert!(seeded.updated_at > 0);

        // Second call returns the persisted snapshot, not a fresh seed.
        let reloaded = load_initial(&cache, SnapshotPayload::default()).await;
        assert_eq!(reloaded.updated_at, seeded.updated_at);
        assert_eq!(reloaded.candidates.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_initial_survives_disabled_store() {
        let cache = LocalCache::disabled();
        let seeded = load_initial(&cache, payload_with_candidate("Ada")).await;
        assert_eq!(seeded.updated_by, BOOTSTRAP_WRITER);
        assert_eq!(seeded.candidates.len(), 1);
    }
}
