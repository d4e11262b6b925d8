//! Backend row shapes
//!
//! The hosted backend stores snake_case columns while the application's
//! snapshot JSON is camelCase (`fullName` vs `full_name`). These row structs
//! are the translation seam: explicit conversions in both directions, enum
//! fields carried as plain strings on the wire.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::{Booking, Candidate, Notification, SystemConfig, User, CONFIG_SINGLETON_ID};
use crate::util::now_ms;

fn enum_to_str<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

fn enum_from_str<T: DeserializeOwned + Default>(value: &str) -> T {
    serde_json::from_str(&format!("\"{value}\"")).unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRow {
    pub id: String,
    pub candidate_id: String,
    pub title: String,
    pub scheduled_at: i64,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub updated_at: i64,
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id.clone(),
            candidate_id: booking.candidate_id.clone(),
            title: booking.title.clone(),
            scheduled_at: booking.scheduled_at,
            status: enum_to_str(&booking.status),
            notes: booking.notes.clone(),
            updated_at: now_ms(),
        }
    }
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Self {
            id: row.id,
            candidate_id: row.candidate_id,
            title: row.title,
            scheduled_at: row.scheduled_at,
            status: enum_from_str(&row.status),
            notes: row.notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub role_applied: String,
    pub stage: String,
    #[serde(default)]
    pub rating: Option<u8>,
    pub updated_at: i64,
}

impl From<&Candidate> for CandidateRow {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id.clone(),
            full_name: candidate.full_name.clone(),
            email: candidate.email.clone(),
            phone: candidate.phone.clone(),
            role_applied: candidate.role_applied.clone(),
            stage: enum_to_str(&candidate.stage),
            rating: candidate.rating,
            updated_at: now_ms(),
        }
    }
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            role_applied: row.role_applied,
            stage: enum_from_str(&row.stage),
            rating: row.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub active: bool,
    pub updated_at: i64,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            email: user.email.clone(),
            role: enum_to_str(&user.role),
            active: user.active,
            updated_at: now_ms(),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            role: enum_from_str(&row.role),
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub kind: String,
    pub created_at: i64,
    #[serde(default)]
    pub read: bool,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            kind: enum_from_str(&row.kind),
            created_at: row.created_at,
            read: row.read,
        }
    }
}

/// The config singleton row, keyed by the fixed id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRow {
    pub id: String,
    pub org_name: String,
    pub timezone: String,
    pub booking_window_days: u32,
    pub broadcast_enabled: bool,
    pub updated_at: i64,
}

impl From<&SystemConfig> for ConfigRow {
    fn from(config: &SystemConfig) -> Self {
        Self {
            id: CONFIG_SINGLETON_ID.to_string(),
            org_name: config.org_name.clone(),
            timezone: config.timezone.clone(),
            booking_window_days: config.booking_window_days,
            broadcast_enabled: config.broadcast_enabled,
            updated_at: now_ms(),
        }
    }
}

impl From<ConfigRow> for SystemConfig {
    fn from(row: ConfigRow) -> Self {
        Self {
            org_name: row.org_name,
            timezone: row.timezone,
            booking_window_days: row.booking_window_days,
            broadcast_enabled: row.broadcast_enabled,
        }
    }
}
