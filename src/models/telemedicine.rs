use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{ConsultationID, Lifecycle, PatientID, UserID};

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
pub enum ConsultationStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl Lifecycle for ConsultationStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use ConsultationStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress) | (Scheduled, Cancelled) | (Scheduled, NoShow) | (InProgress, Completed)
        )
    }

    fn is_terminal(self) -> bool {
        use ConsultationStatus::*;
        matches!(self, Completed | Cancelled | NoShow)
    }
}

/// A remote consultation slot with a doctor
#[derive(Debug, Clone, Serialize)]
pub struct Teleconsultation {
    pub id: ConsultationID,
    pub patient_id: PatientID,
    pub doctor_id: UserID,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: ConsultationStatus,
    pub meeting_link: String,
    pub reason: String,
    pub notes: Option<String>,
    pub created_by: UserID,
    pub created_at: DateTime<Utc>,
}

impl Teleconsultation {
    pub const MIN_DURATION_MINUTES: u32 = 5;
    pub const MAX_DURATION_MINUTES: u32 = 240;

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }
}
