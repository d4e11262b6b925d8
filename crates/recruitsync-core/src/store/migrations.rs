//! Local cache migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: entity tables, config singleton, snapshot meta,
/// and the pending-write outbox.
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // inside one transaction.

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Bookings table
        "CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            candidate_id TEXT NOT NULL,
            title TEXT NOT NULL,
            scheduled_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            notes TEXT,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_bookings_scheduled ON bookings(scheduled_at)",
        // Candidates table
        "CREATE TABLE IF NOT EXISTS candidates (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            role_applied TEXT NOT NULL,
            stage TEXT NOT NULL,
            rating INTEGER,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_candidates_stage ON candidates(stage)",
        // Users table
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            role TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL
        )",
        // Config singleton, keyed by a fixed id
        "CREATE TABLE IF NOT EXISTS system_config (
            id TEXT PRIMARY KEY,
            org_name TEXT NOT NULL,
            timezone TEXT NOT NULL,
            booking_window_days INTEGER NOT NULL,
            broadcast_enabled INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        // Last persisted snapshot envelope
        "CREATE TABLE IF NOT EXISTS snapshot_meta (
            id TEXT PRIMARY KEY,
            updated_at INTEGER NOT NULL,
            updated_by TEXT NOT NULL
        )",
        // Pending-write outbox, drained in insertion order
        "CREATE TABLE IF NOT EXISTS outbox (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated local cache to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v1_creates_outbox_table() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'outbox'
                )",
                (),
            )
            .await
            .unwrap();

        let exists = rows
            .next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0);

        assert!(exists);
    }
}
