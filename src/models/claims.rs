//! Social Health Authority claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{ClaimID, Lifecycle, PatientID, UserID};
use crate::utils::input_validation::{DiagnosisCode, ShaNumber};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
    Paid,
}

impl ClaimStatus {
    /// Decisions on a submitted claim belong to finance
    pub fn is_decision(self) -> bool {
        matches!(self, ClaimStatus::Approved | ClaimStatus::Rejected | ClaimStatus::Paid)
    }
}

impl Lifecycle for ClaimStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Draft, Submitted) | (Submitted, Approved) | (Submitted, Rejected) | (Approved, Paid)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, ClaimStatus::Rejected | ClaimStatus::Paid)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShaClaim {
    pub id: ClaimID,
    pub reference: String,
    pub patient_id: PatientID,
    pub sha_number: ShaNumber,
    pub service_description: String,
    pub diagnosis_code: DiagnosisCode,
    pub amount_cents: i64,
    pub status: ClaimStatus,
    pub rejection_reason: Option<String>,
    pub created_by: UserID,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ShaClaim {
    /// One billion shillings. Also enforced by the schema.
    pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

    /// Human readable reference, `SHA-YYYYMMDD-XXXXXXXX`, derived from the id
    pub fn reference_for(id: &ClaimID, created_at: DateTime<Utc>) -> String {
        let suffix: String = id
            .to_string()
            .chars()
            .filter(|c| *c != '-')
            .take(8)
            .collect::<String>()
            .to_ascii_uppercase();
        format!("SHA-{}-{}", created_at.format("%Y%m%d"), suffix)
    }
}

/// Claim count and value for one status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ClaimTotals {
    pub count: u64,
    pub amount_cents: i64,
}
