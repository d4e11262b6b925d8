//! Local persistent cache
//!
//! The durable, on-device projection of the last known snapshot plus the
//! pending-write outbox. Survives restarts and network loss. Storage
//! unavailability is never fatal: a disabled cache answers every call with
//! a neutral "no data" result so callers fall back to remote-only
//! operation.

mod migrations;
mod outbox;

pub use outbox::{FlushReport, OutboxItem};

use std::future::Future;
use std::path::Path;

use libsql::{Builder, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::{
    Booking, Candidate, CollectionKind, SystemConfig, User, CONFIG_SINGLETON_ID,
};
use crate::snapshot::{Snapshot, SnapshotPayload};
use crate::util::now_ms;

/// Key of the single snapshot_meta row.
const SNAPSHOT_META_ID: &str = "snapshot";

/// Durable local cache over a libSQL database.
///
/// Construct with [`LocalCache::open`] (degrades to disabled on failure),
/// [`LocalCache::open_in_memory`] (tests), or [`LocalCache::disabled`].
pub struct LocalCache {
    inner: Option<CacheDb>,
}

struct CacheDb {
    // Kept alive for the lifetime of the connection
    _db: libsql::Database,
    conn: Connection,
}

impl LocalCache {
    /// Open the cache at the given path, creating and migrating as needed.
    ///
    /// Any failure (storage engine unavailable, corrupt file, failed
    /// migration) degrades to the disabled cache instead of erroring.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path_str = path.as_ref().to_string_lossy().to_string();
        match Self::try_open(&path_str).await {
            Ok(cache) => cache,
            Err(error) => {
                tracing::warn!(%error, path = %path_str, "Local cache unavailable, continuing without durable storage");
                Self::disabled()
            }
        }
    }

    /// Open an in-memory cache (useful for testing).
    pub async fn open_in_memory() -> Result<Self> {
        Self::try_open(":memory:").await
    }

    /// A cache with no storage engine behind it. Every read returns "no
    /// data" and every write is a no-op.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { inner: None }
    }

    async fn try_open(path: &str) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        migrations::run(&conn).await?;
        Ok(Self {
            inner: Some(CacheDb { _db: db, conn }),
        })
    }

    /// Whether a storage engine is available.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    fn conn(&self) -> Option<&Connection> {
        self.inner.as_ref().map(|db| &db.conn)
    }

    /// Read the cached collections, or `None` when the store is disabled
    /// or has never been written.
    pub async fn load_payload(&self) -> Option<SnapshotPayload> {
        let conn = self.conn()?;
        match load_payload_inner(conn).await {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(%error, "Failed to read local cache");
                None
            }
        }
    }

    /// Read the full persisted snapshot including its version envelope.
    pub async fn load_snapshot(&self) -> Option<Snapshot> {
        let conn = self.conn()?;
        let meta = match load_meta_inner(conn).await {
            Ok(meta) => meta?,
            Err(error) => {
                tracing::warn!(%error, "Failed to read snapshot meta");
                return None;
            }
        };
        let payload = self.load_payload().await?;
        Some(Snapshot::with_timestamp(payload, meta.0, meta.1))
    }

    /// Atomically replace all cached collections with the snapshot's
    /// contents (clear-then-bulk-write in one transaction).
    ///
    /// Notifications are deliberately not persisted; they are transient
    /// broadcast artifacts. Errors are logged and swallowed.
    pub async fn save_snapshot(&self, snapshot: &Snapshot) {
        let Some(conn) = self.conn() else {
            return;
        };
        if let Err(error) = save_snapshot_inner(conn, snapshot).await {
            conn.execute("ROLLBACK", ()).await.ok();
            tracing::warn!(%error, "Failed to persist snapshot to local cache");
        }
    }

    /// Append one outbox item; the payload is serialized at call time, so
    /// later mutation of the source value cannot affect the queued copy.
    pub async fn queue_outbox<T: Serialize>(&self, kind: CollectionKind, payload: &T) {
        let Some(conn) = self.conn() else {
            return;
        };
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(%error, %kind, "Failed to serialize outbox payload");
                return;
            }
        };
        let item = OutboxItem::new(kind, payload);
        if let Err(error) = outbox::insert(conn, &item).await {
            tracing::warn!(%error, %kind, "Failed to queue outbox item");
        }
    }

    /// Attempt every pending item once, in insertion order.
    ///
    /// The handler performs the remote sync for one item; on success the
    /// item is deleted, on failure it is retained unchanged and the loop
    /// continues with the next item. No retry within a single call.
    ///
    /// Caller contract: keep at most one flush in flight at a time.
    pub async fn flush_outbox<F, Fut>(&self, mut handler: F) -> FlushReport
    where
        F: FnMut(OutboxItem) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let Some(conn) = self.conn() else {
            return FlushReport::default();
        };

        let items = match outbox::pending(conn).await {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(%error, "Failed to read outbox");
                return FlushReport::default();
            }
        };

        let mut report = FlushReport::default();
        for item in items {
            report.attempted += 1;
            let id = item.id.clone();
            let kind = item.kind;
            match handler(item).await {
                Ok(()) => {
                    if let Err(error) = outbox::delete(conn, &id).await {
                        tracing::warn!(%error, id, "Drained outbox item could not be deleted");
                        report.retained += 1;
                    } else {
                        report.drained += 1;
                    }
                }
                Err(error) => {
                    tracing::debug!(%error, id, %kind, "Outbox item failed, retained for retry");
                    report.retained += 1;
                }
            }
        }
        report
    }

    /// Pending outbox items, oldest first.
    pub async fn pending_outbox(&self) -> Vec<OutboxItem> {
        let Some(conn) = self.conn() else {
            return Vec::new();
        };
        outbox::pending(conn).await.unwrap_or_default()
    }

    /// Number of pending outbox items.
    pub async fn outbox_len(&self) -> usize {
        let Some(conn) = self.conn() else {
            return 0;
        };
        outbox::count(conn).await.unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn enum_to_str<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

fn enum_from_str<T: DeserializeOwned + Default>(value: &str) -> T {
    serde_json::from_str(&format!("\"{value}\"")).unwrap_or_default()
}

async fn load_meta_inner(conn: &Connection) -> Result<Option<(i64, String)>> {
    let mut rows = conn
        .query(
            "SELECT updated_at, updated_by FROM snapshot_meta WHERE id = ?",
            [SNAPSHOT_META_ID],
        )
        .await?;

    if let Some(row) = rows.next().await? {
        let updated_at: i64 = row.get(0)?;
        let updated_by: String = row.get(1)?;
        Ok(Some((updated_at, updated_by)))
    } else {
        Ok(None)
    }
}

async fn load_payload_inner(conn: &Connection) -> Result<Option<SnapshotPayload>> {
    // An unwritten cache has no meta row; treat it as empty rather than
    // returning a default payload that would mask "no data".
    if load_meta_inner(conn).await?.is_none() {
        return Ok(None);
    }

    let bookings = load_bookings(conn).await?;
    let candidates = load_candidates(conn).await?;
    let users = load_users(conn).await?;
    let system_config = load_config(conn).await?.unwrap_or_default();

    Ok(Some(SnapshotPayload {
        bookings,
        candidates,
        users,
        notifications: Vec::new(),
        system_config,
    }))
}

async fn load_bookings(conn: &Connection) -> Result<Vec<Booking>> {
    let mut rows = conn
        .query(
            "SELECT id, candidate_id, title, scheduled_at, status, notes FROM bookings",
            (),
        )
        .await?;

    let mut bookings = Vec::new();
    while let Some(row) = rows.next().await? {
        let status: String = row.get(4)?;
        bookings.push(Booking {
            id: row.get(0)?,
            candidate_id: row.get(1)?,
            title: row.get(2)?,
            scheduled_at: row.get(3)?,
            status: enum_from_str(&status),
            notes: row.get(5)?,
        });
    }
    Ok(bookings)
}

async fn load_candidates(conn: &Connection) -> Result<Vec<Candidate>> {
    let mut rows = conn
        .query(
            "SELECT id, full_name, email, phone, role_applied, stage, rating FROM candidates",
            (),
        )
        .await?;

    let mut candidates = Vec::new();
    while let Some(row) = rows.next().await? {
        let stage: String = row.get(5)?;
        let rating: Option<i64> = row.get(6)?;
        candidates.push(Candidate {
            id: row.get(0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            role_applied: row.get(4)?,
            stage: enum_from_str(&stage),
            rating: rating.and_then(|r| u8::try_from(r).ok()),
        });
    }
    Ok(candidates)
}

async fn load_users(conn: &Connection) -> Result<Vec<User>> {
    let mut rows = conn
        .query("SELECT id, full_name, email, role, active FROM users", ())
        .await?;

    let mut users = Vec::new();
    while let Some(row) = rows.next().await? {
        let role: String = row.get(3)?;
        users.push(User {
            id: row.get(0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            role: enum_from_str(&role),
            active: row.get::<i32>(4)? != 0,
        });
    }
    Ok(users)
}

async fn load_config(conn: &Connection) -> Result<Option<SystemConfig>> {
    let mut rows = conn
        .query(
            "SELECT org_name, timezone, booking_window_days, broadcast_enabled
             FROM system_config WHERE id = ?",
            [CONFIG_SINGLETON_ID],
        )
        .await?;

    if let Some(row) = rows.next().await? {
        let window: i64 = row.get(2)?;
        Ok(Some(SystemConfig {
            org_name: row.get(0)?,
            timezone: row.get(1)?,
            booking_window_days: u32::try_from(window).unwrap_or_default(),
            broadcast_enabled: row.get::<i32>(3)? != 0,
        }))
    } else {
        Ok(None)
    }
}

async fn save_snapshot_inner(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    let now = now_ms();

    conn.execute("BEGIN TRANSACTION", ()).await?;

    for table in ["bookings", "candidates", "users", "system_config"] {
        conn.execute(&format!("DELETE FROM {table}"), ()).await?;
    }

    for booking in &snapshot.bookings {
        conn.execute(
            "INSERT INTO bookings (id, candidate_id, title, scheduled_at, status, notes, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                booking.id.as_str(),
                booking.candidate_id.as_str(),
                booking.title.as_str(),
                booking.scheduled_at,
                enum_to_str(&booking.status),
                booking.notes.clone(),
                now
            ],
        )
        .await?;
    }

    for candidate in &snapshot.candidates {
        conn.execute(
            "INSERT INTO candidates (id, full_name, email, phone, role_applied, stage, rating, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                candidate.id.as_str(),
                candidate.full_name.as_str(),
                candidate.email.as_str(),
                candidate.phone.clone(),
                candidate.role_applied.as_str(),
                enum_to_str(&candidate.stage),
                candidate.rating.map(i64::from),
                now
            ],
        )
        .await?;
    }

    for user in &snapshot.users {
        conn.execute(
            "INSERT INTO users (id, full_name, email, role, active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                user.id.as_str(),
                user.full_name.as_str(),
                user.email.as_str(),
                enum_to_str(&user.role),
                i64::from(user.active),
                now
            ],
        )
        .await?;
    }

    conn.execute(
        "INSERT INTO system_config (id, org_name, timezone, booking_window_days, broadcast_enabled, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        libsql::params![
            CONFIG_SINGLETON_ID,
            snapshot.system_config.org_name.as_str(),
            snapshot.system_config.timezone.as_str(),
            i64::from(snapshot.system_config.booking_window_days),
            i64::from(snapshot.system_config.broadcast_enabled),
            now
        ],
    )
    .await?;

    conn.execute(
        "INSERT OR REPLACE INTO snapshot_meta (id, updated_at, updated_by) VALUES (?, ?, ?)",
        libsql::params![
            SNAPSHOT_META_ID,
            snapshot.updated_at,
            snapshot.updated_by.as_str()
        ],
    )
    .await?;

    conn.execute("COMMIT", ()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{BookingStatus, CandidateStage, UserRole};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_snapshot() -> Snapshot {
        let mut candidate = Candidate::new("Ada Lovelace", "ada@example.com", "Backend Engineer");
        candidate.stage = CandidateStage::Interview;
        candidate.rating = Some(4);
        candidate.phone = Some("+44 20 7946 0000".to_string());

        let mut booking = Booking::new(candidate.id.clone(), "Technical interview");
        booking.status = BookingStatus::Confirmed;
        booking.notes = Some("Bring portfolio".to_string());

        let user = User::new("Grace Hopper", "grace@example.com", UserRole::Admin);

        let config = SystemConfig {
            org_name: "Acme Talent".to_string(),
            timezone: "Europe/London".to_string(),
            booking_window_days: 45,
            broadcast_enabled: false,
        };

        Snapshot::with_timestamp(
            SnapshotPayload {
                bookings: vec![booking],
                candidates: vec![candidate],
                users: vec![user],
                notifications: Vec::new(),
                system_config: config,
            },
            1234,
            "client-test",
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_round_trips_snapshot() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        let snapshot = sample_snapshot();

        cache.save_snapshot(&snapshot).await;
        let loaded = cache.load_payload().await.unwrap();

        assert_eq!(loaded.bookings, snapshot.bookings);
        assert_eq!(loaded.candidates, snapshot.candidates);
        assert_eq!(loaded.users, snapshot.users);
        assert_eq!(loaded.system_config, snapshot.system_config);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_snapshot_restores_envelope() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        let snapshot = sample_snapshot();

        cache.save_snapshot(&snapshot).await;
        let loaded = cache.load_snapshot().await.unwrap();

        assert_eq!(loaded.updated_at, 1234);
        assert_eq!(loaded.updated_by, "client-test");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let snapshot = sample_snapshot();

        {
            let cache = LocalCache::open(&path).await;
            assert!(cache.is_available());
            cache.save_snapshot(&snapshot).await;
            cache
                .queue_outbox(CollectionKind::Bookings, &snapshot.bookings)
                .await;
        }

        // A fresh handle over the same file sees everything.
        let reopened = LocalCache::open(&path).await;
        let loaded = reopened.load_snapshot().await.unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(reopened.outbox_len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_cache_loads_none() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        assert!(cache.load_payload().await.is_none());
        assert!(cache.load_snapshot().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_replaces_previous_state() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        cache.save_snapshot(&sample_snapshot()).await;

        // A later snapshot with fewer rows fully replaces the old one.
        let emptier = Snapshot::with_timestamp(SnapshotPayload::default(), 2000, "client-test");
        cache.save_snapshot(&emptier).await;

        let loaded = cache.load_payload().await.unwrap();
        assert!(loaded.bookings.is_empty());
        assert!(loaded.candidates.is_empty());
        assert!(loaded.users.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disabled_cache_degrades_gracefully() {
        let cache = LocalCache::disabled();
        assert!(!cache.is_available());

        assert!(cache.load_payload().await.is_none());
        assert!(cache.load_snapshot().await.is_none());
        cache.save_snapshot(&sample_snapshot()).await;
        cache
            .queue_outbox(CollectionKind::Candidates, &json!([{"id": "c1"}]))
            .await;

        let report = cache.flush_outbox(|_item| async { Ok(()) }).await;
        assert_eq!(report, FlushReport::default());
        assert_eq!(cache.outbox_len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queued_payload_is_deep_copied() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        let mut payload = json!([{"id": "c1", "name": "before"}]);
        cache
            .queue_outbox(CollectionKind::Candidates, &payload)
            .await;

        // Mutating the source after enqueue must not affect the queued copy.
        payload[0]["name"] = json!("after");

        let items = cache.pending_outbox().await;
        assert_eq!(items[0].payload[0]["name"], "before");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_isolates_per_item_failure() {
        let cache = LocalCache::open_in_memory().await.unwrap();
        cache
            .queue_outbox(CollectionKind::Bookings, &json!([{"id": "b1"}]))
            .await;
        cache
            .queue_outbox(CollectionKind::Candidates, &json!([{"id": "c1"}]))
            .await;
        cache
            .queue_outbox(CollectionKind::Users, &json!([{"id": "u1"}]))
            .await;

        let before = cache.pending_outbox().await;
        assert_eq!(before.len(), 3);
        let failing_id = before[1].id.clone();

        // Item 2 fails, items 1 and 3 succeed.
        let report = cache
            .flush_outbox(|item| {
                let fail = item.kind == CollectionKind::Candidates;
                async move {
                    if fail {
                        Err(Error::Gateway("simulated outage".to_string()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.drained, 2);
        assert_eq!(report.retained, 1);

        let after = cache.pending_outbox().await;
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, failing_id);
        assert_eq!(after[0], before[1], "retained item must be unchanged");

        // A later flush with a healthy handler drains the remainder.
        let report = cache.flush_outbox(|_item| async { Ok(()) }).await;
        assert_eq!(report.drained, 1);
        assert_eq!(cache.outbox_len().await, 0);
    }
}
