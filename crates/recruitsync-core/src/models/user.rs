//! Portal user model

use serde::{Deserialize, Serialize};

use super::new_entity_id;

/// Access role of a portal user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full administrative access
    Admin,
    /// Can manage candidates and bookings
    #[default]
    Recruiter,
    /// Read-only access
    Viewer,
}

/// A portal user account.
///
/// The user directory is centrally administered: directory sync is
/// authoritative, unlike candidate/booking sync (see the gateway module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique identifier
    pub id: String,
    /// Full display name
    pub full_name: String,
    /// Login email
    pub email: String,
    /// Access role
    pub role: UserRole,
    /// Whether the account is active
    pub active: bool,
}

impl User {
    /// Create a new active user with the given role.
    #[must_use]
    pub fn new(full_name: impl Into<String>, email: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: new_entity_id(),
            full_name: full_name.into(),
            email: email.into(),
            role,
            active: true,
        }
    }
}
