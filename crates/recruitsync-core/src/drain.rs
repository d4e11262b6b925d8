//! Outbox drain
//!
//! Replays queued local mutations against the remote gateway, dispatching
//! each item by its collection kind. Runs when connectivity is present;
//! per-item failures are isolated by the cache's flush loop, so one bad
//! item never blocks the rest.

use crate::error::{Error, Result};
use crate::gateway::RemoteGateway;
use crate::models::{Booking, Candidate, CollectionKind, SystemConfig, User};
use crate::store::{FlushReport, LocalCache, OutboxItem};
use crate::sync::ConnectivitySignal;

/// One drain pass over all pending outbox items.
///
/// Skipped entirely while offline (items remain queued for the next
/// attempt). With no backend configured the gateway calls are no-ops that
/// succeed immediately, so the queue drains without network effects and
/// local-only mode behaves identically for callers.
pub async fn drain_outbox(
    cache: &LocalCache,
    gateway: &RemoteGateway,
    connectivity: &dyn ConnectivitySignal,
) -> FlushReport {
    if !connectivity.is_online() {
        return FlushReport::default();
    }

    cache
        .flush_outbox(|item| async move { replay_item(gateway, item).await })
        .await
}

async fn replay_item(gateway: &RemoteGateway, item: OutboxItem) -> Result<()> {
    match item.kind {
        CollectionKind::Bookings => {
            let bookings: Vec<Booking> = serde_json::from_value(item.payload)?;
            gateway.sync_bookings(&bookings).await
        }
        CollectionKind::Candidates => {
            let candidates: Vec<Candidate> = serde_json::from_value(item.payload)?;
            gateway.sync_candidates(&candidates).await
        }
        CollectionKind::Users => {
            let users: Vec<User> = serde_json::from_value(item.payload)?;
            gateway.sync_users(&users).await
        }
        CollectionKind::SystemConfig => {
            let config: SystemConfig = serde_json::from_value(item.payload)?;
            gateway.sync_config(&config).await
        }
        // Notifications are pull-only; nothing to replay upstream.
        CollectionKind::Notifications => Err(Error::InvalidInput(
            "notifications are never queued for upload".to_string(),
        )),
    }
}
