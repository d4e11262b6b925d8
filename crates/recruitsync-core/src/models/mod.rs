//! Data models shared across the sync layer

mod booking;
mod candidate;
mod config;
mod notification;
mod user;

pub use booking::{Booking, BookingStatus};
pub use candidate::{Candidate, CandidateStage};
pub use config::{SystemConfig, CONFIG_SINGLETON_ID};
pub use notification::{Notification, NotificationKind};
pub use user::{User, UserRole};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The top-level collections a snapshot is composed of.
///
/// Outbox items and remote sync calls are addressed by collection, not by
/// individual row. Notifications are pull-only (produced by broadcasts,
/// never queued for upload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionKind {
    Bookings,
    Candidates,
    Users,
    Notifications,
    SystemConfig,
}

impl CollectionKind {
    /// Stable string form used in outbox ids and log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bookings => "bookings",
            Self::Candidates => "candidates",
            Self::Users => "users",
            Self::Notifications => "notifications",
            Self::SystemConfig => "systemConfig",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookings" => Ok(Self::Bookings),
            "candidates" => Ok(Self::Candidates),
            "users" => Ok(Self::Users),
            "notifications" => Ok(Self::Notifications),
            "systemConfig" => Ok(Self::SystemConfig),
            other => Err(format!("unknown collection kind: {other}")),
        }
    }
}

/// Generate a time-sortable entity id (UUID v7).
#[must_use]
pub fn new_entity_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_kind_round_trips_through_str() {
        for kind in [
            CollectionKind::Bookings,
            CollectionKind::Candidates,
            CollectionKind::Users,
            CollectionKind::Notifications,
            CollectionKind::SystemConfig,
        ] {
            let parsed: CollectionKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn collection_kind_rejects_unknown() {
        assert!("snapshots".parse::<CollectionKind>().is_err());
    }

    #[test]
    fn entity_ids_are_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
