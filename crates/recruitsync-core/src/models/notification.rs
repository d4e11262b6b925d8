//! Notification model

use serde::{Deserialize, Serialize};

use super::new_entity_id;
use crate::util::now_ms;

/// Category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Booking,
    Candidate,
    System,
}

/// A broadcast notification shown to portal users.
///
/// Notifications travel inside snapshots but are never written back to the
/// remote backend by this client - they are pull-only artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique identifier
    pub id: String,
    /// Short headline
    pub title: String,
    /// Message body
    pub body: String,
    /// Category
    pub kind: NotificationKind,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Whether the local user has seen it
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Create a new unread notification.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            id: new_entity_id(),
            title: title.into(),
            body: body.into(),
            kind,
            created_at: now_ms(),
            read: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_notification_is_unread() {
        let notice = Notification::new("Update", "Calendar changed", NotificationKind::Booking);
        assert!(!notice.read);
        assert!(notice.created_at > 0);
    }
}
