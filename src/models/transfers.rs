use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{AmbulanceID, Lifecycle, PatientID, TransferID, TriageLevel, UserID};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Requested,
    Approved,
    Rejected,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferStatus {
    /// Approving or rejecting is a clinical decision, the rest is logistics
    pub fn is_decision(self) -> bool {
        matches!(self, TransferStatus::Approved | TransferStatus::Rejected)
    }
}

impl Lifecycle for TransferStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Requested, Approved)
                | (Requested, Rejected)
                | (Requested, Cancelled)
                | (Approved, InTransit)
                | (Approved, Cancelled)
                | (InTransit, Completed)
        )
    }

    fn is_terminal(self) -> bool {
        use TransferStatus::*;
        matches!(self, Rejected | Completed | Cancelled)
    }
}

/// Inter-facility patient transfer
#[derive(Debug, Clone, Serialize)]
pub struct Transfer {
    pub id: TransferID,
    pub patient_id: PatientID,
    pub from_facility: String,
    pub to_facility: String,
    pub reason: String,
    pub urgency: TriageLevel,
    pub status: TransferStatus,
    pub ambulance_id: Option<AmbulanceID>,
    pub requested_by: UserID,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_lifecycle() {
        use TransferStatus::*;
        assert!(Requested.can_transition_to(Approved));
        assert!(Approved.can_transition_to(InTransit));
        assert!(InTransit.can_transition_to(Completed));
        assert!(!Requested.can_transition_to(InTransit));
        assert!(!InTransit.can_transition_to(Cancelled));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(Approved.is_decision() && !InTransit.is_decision());
    }
}
