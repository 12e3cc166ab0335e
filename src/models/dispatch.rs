//! Emergency calls and the ambulance fleet

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{AmbulanceID, EmergencyID, Lifecycle, PatientID, TriageLevel, UserID};
use crate::utils::input_validation::PhoneNumber;

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
pub enum EmergencyKind {
    Medical,
    Trauma,
    Cardiac,
    Respiratory,
    Obstetric,
    Fire,
    RoadAccident,
    Other,
}

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
pub enum EmergencyStatus {
    Reported,
    Dispatched,
    EnRoute,
    OnScene,
    Transporting,
    Completed,
    Cancelled,
}

impl EmergencyStatus {
    /// Position in the linear response progression, `None` for cancelled
    fn step(self) -> Option<u8> {
        use EmergencyStatus::*;
        match self {
            Reported => Some(0),
            Dispatched => Some(1),
            EnRoute => Some(2),
            OnScene => Some(3),
            Transporting => Some(4),
            Completed => Some(5),
            Cancelled => None,
        }
    }
}

impl Lifecycle for EmergencyStatus {
    fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.step(), next.step()) {
            (_, None) => true,
            // An ambulance may hand over on scene without transporting
            (Some(3), Some(5)) => true,
            (Some(from), Some(to)) => to == from + 1,
            (None, _) => false,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, EmergencyStatus::Completed | EmergencyStatus::Cancelled)
    }
}

/// A WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// An emergency call and the response to it
#[derive(Debug, Clone, Serialize)]
pub struct Emergency {
    pub id: EmergencyID,
    pub caller_name: String,
    pub caller_phone: PhoneNumber,
    pub location: String,
    pub position: Option<GeoPoint>,
    pub kind: EmergencyKind,
    pub severity: TriageLevel,
    pub description: String,
    pub status: EmergencyStatus,
    pub patient_id: Option<PatientID>,
    pub ambulance_id: Option<AmbulanceID>,
    pub reported_by: UserID,
    pub reported_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub arrived_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Emergency {
    /// Minutes between the call and the first unit on scene
    pub fn response_minutes(&self) -> Option<i64> {
        self.arrived_at
            .map(|arrived| (arrived - self.reported_at).num_minutes().max(0))
    }
}

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
pub enum AmbulanceStatus {
    Available,
    Dispatched,
    OutOfService,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ambulance {
    pub id: AmbulanceID,
    pub call_sign: String,
    pub registration: String,
    pub base_location: String,
    pub status: AmbulanceStatus,
    pub position: Option<GeoPoint>,
    pub updated_at: DateTime<Utc>,
}
