use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member's delivery against a listing, awaiting or past verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MineralSubmission {
    pub id: String,
    pub listing_id: String,
    pub member_id: String,
    pub quantity: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub verified_by: Option<String>,
    #[serde(default)]
    pub verification_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Verified => "verified",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn is_decided(&self) -> bool {
        *self != VerificationStatus::Pending
    }

    /// Only `pending -> verified` and `pending -> rejected` exist.
    pub fn can_transition_to(&self, next: VerificationStatus) -> bool {
        *self == VerificationStatus::Pending && next.is_decided()
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome an administrator records for a pending submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationDecision {
    Verified,
    Rejected,
}

impl VerificationDecision {
    pub fn status(&self) -> VerificationStatus {
        match self {
            VerificationDecision::Verified => VerificationStatus::Verified,
            VerificationDecision::Rejected => VerificationStatus::Rejected,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "verified" | "verify" => Some(VerificationDecision::Verified),
            "rejected" | "reject" => Some(VerificationDecision::Rejected),
            _ => None,
        }
    }
}

/// Validated submission fields, ready to be written for a member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSubmission {
    pub listing_id: String,
    pub quantity: f64,
    pub notes: Option<String>,
}

/// Member fields embedded in a queued submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub full_name: String,
    #[serde(rename = "member_id")]
    pub member_code: String,
    #[serde(default)]
    pub cooperative_id: Option<String>,
}

/// Listing fields embedded in a submission row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub mineral_type: String,
    pub unit: String,
    #[serde(default)]
    pub quality_grade: Option<String>,
}

/// A row of the cooperative's verification queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedSubmission {
    pub id: String,
    pub quantity: f64,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub member: Option<MemberSummary>,
    #[serde(default)]
    pub mineral_listing: Option<ListingSummary>,
}

impl QueuedSubmission {
    pub fn belongs_to(&self, cooperative_id: &str) -> bool {
        self.member
            .as_ref()
            .and_then(|m| m.cooperative_id.as_deref())
            .is_some_and(|id| id == cooperative_id)
    }
}

/// A row of a member's submission history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: String,
    pub quantity: f64,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub mineral_listing: Option<ListingSummary>,
}
