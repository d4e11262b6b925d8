//! Pending-write outbox
//!
//! Records of unconfirmed local mutations, queued while offline and replayed
//! against the remote gateway when connectivity returns. Entries are
//! append-only until a drain confirms the corresponding sync call; a failed
//! drain leaves the entry untouched, in its original position.

use libsql::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::models::CollectionKind;
use crate::util::now_ms;

/// An unconfirmed local mutation awaiting replay.
///
/// The payload carries the entire collection for its kind, serialized at
/// enqueue time - coarse-grained by design, matching the whole-snapshot
/// sync strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxItem {
    /// Unique id, derived from kind + timestamp + random suffix
    pub id: String,
    /// Which collection the payload replaces remotely
    pub kind: CollectionKind,
    /// Collection contents at enqueue time
    pub payload: Value,
    /// Enqueue timestamp (Unix ms)
    pub updated_at: i64,
}

impl OutboxItem {
    /// Create a new item stamped with the current time.
    #[must_use]
    pub fn new(kind: CollectionKind, payload: Value) -> Self {
        let updated_at = now_ms();
        let suffix = uuid::Uuid::now_v7().simple().to_string();
        Self {
            id: format!("{}-{}-{}", kind.as_str(), updated_at, &suffix[..8]),
            kind,
            payload,
            updated_at,
        }
    }
}

/// Outcome of one `flush_outbox` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Items the handler was invoked for
    pub attempted: usize,
    /// Items confirmed and deleted
    pub drained: usize,
    /// Items retained for the next pass
    pub retained: usize,
}

/// Append one item to the queue.
pub async fn insert(conn: &Connection, item: &OutboxItem) -> Result<()> {
    let payload = serde_json::to_string(&item.payload)?;
    conn.execute(
        "INSERT INTO outbox (id, kind, payload, updated_at) VALUES (?, ?, ?, ?)",
        libsql::params![
            item.id.as_str(),
            item.kind.as_str(),
            payload,
            item.updated_at
        ],
    )
    .await?;
    Ok(())
}

/// All pending items, in insertion order.
pub async fn pending(conn: &Connection) -> Result<Vec<OutboxItem>> {
    let mut rows = conn
        .query(
            "SELECT id, kind, payload, updated_at FROM outbox ORDER BY seq ASC",
            (),
        )
        .await?;

    let mut items = Vec::new();
    while let Some(row) = rows.next().await? {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let updated_at: i64 = row.get(3)?;

        // Rows with an unparseable kind or payload are skipped, not fatal;
        // they would otherwise wedge the drain loop forever.
        let Ok(kind) = kind.parse::<CollectionKind>() else {
            tracing::warn!(id, "Skipping outbox row with unknown kind");
            continue;
        };
        let Ok(payload) = serde_json::from_str(&payload) else {
            tracing::warn!(id, "Skipping outbox row with corrupt payload");
            continue;
        };

        items.push(OutboxItem {
            id,
            kind,
            payload,
            updated_at,
        });
    }

    Ok(items)
}

/// Delete one confirmed item.
pub async fn delete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("DELETE FROM outbox WHERE id = ?", [id]).await?;
    Ok(())
}

/// Number of pending items.
pub async fn count(conn: &Connection) -> Result<usize> {
    let mut rows = conn.query("SELECT COUNT(*) FROM outbox", ()).await?;
    let count: i64 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };
    Ok(usize::try_from(count).unwrap_or(0))
}
