//! Booking model

use serde::{Deserialize, Serialize};

use super::new_entity_id;
use crate::util::now_ms;

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Slot reserved, awaiting confirmation
    #[default]
    Scheduled,
    /// Confirmed by the candidate
    Confirmed,
    /// Interview took place
    Completed,
    /// Cancelled by either side
    Cancelled,
}

/// A scheduled interview or assessment slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Unique identifier
    pub id: String,
    /// Candidate this booking belongs to
    pub candidate_id: String,
    /// Short human-readable title (e.g. "Technical interview, round 2")
    pub title: String,
    /// Scheduled start time (Unix ms)
    pub scheduled_at: i64,
    /// Lifecycle state
    pub status: BookingStatus,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
}

impl Booking {
    /// Create a new scheduled booking for a candidate.
    #[must_use]
    pub fn new(candidate_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            candidate_id: candidate_id.into(),
            title: title.into(),
            scheduled_at: now_ms(),
            status: BookingStatus::Scheduled,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_booking_starts_scheduled() {
        let booking = Booking::new("cand-1", "Screening call");
        assert_eq!(booking.status, BookingStatus::Scheduled);
        assert_eq!(booking.candidate_id, "cand-1");
        assert!(booking.scheduled_at > 0);
    }

    #[test]
    fn booking_serializes_camel_case() {
        let booking = Booking::new("cand-1", "Screening call");
        let json = serde_json::to_value(&booking).unwrap();
        assert!(json.get("candidateId").is_some());
        assert!(json.get("scheduledAt").is_some());
        assert_eq!(json["status"], "scheduled");
    }
}
