//! Candidate model

use serde::{Deserialize, Serialize};

use super::new_entity_id;

/// Pipeline stage of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStage {
    #[default]
    Applied,
    Screening,
    Interview,
    Offer,
    Hired,
    Rejected,
}

/// A candidate in the recruitment pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Unique identifier
    pub id: String,
    /// Full display name
    pub full_name: String,
    /// Contact email
    pub email: String,
    /// Contact phone, when provided
    #[serde(default)]
    pub phone: Option<String>,
    /// Role the candidate applied for
    pub role_applied: String,
    /// Current pipeline stage
    pub stage: CandidateStage,
    /// Interviewer rating 1-5, once assessed
    #[serde(default)]
    pub rating: Option<u8>,
}

impl Candidate {
    /// Create a new candidate at the start of the pipeline.
    #[must_use]
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        role_applied: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            full_name: full_name.into(),
            email: email.into(),
            phone: None,
            role_applied: role_applied.into(),
            stage: CandidateStage::Applied,
            rating: None,
        }
    }
}
