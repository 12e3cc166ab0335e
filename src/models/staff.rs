use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{ShiftID, StaffID, UserID};
use crate::utils::input_validation::PhoneNumber;

/// Professional cadre of a staff member
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
pub enum Cadre {
    Doctor,
    Nurse,
    ClinicalOfficer,
    Paramedic,
    Pharmacist,
    LabTechnician,
    Support,
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
pub enum ShiftKind {
    Day,
    Night,
    OnCall,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffMember {
    pub id: StaffID,
    pub user_id: Option<UserID>,
    pub first_name: String,
    pub last_name: String,
    pub cadre: Cadre,
    pub department: String,
    pub phone: Option<PhoneNumber>,
    pub license_number: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A rostered shift, `[starts_at, ends_at)`
#[derive(Debug, Clone, Serialize)]
pub struct Shift {
    pub id: ShiftID,
    pub staff_id: StaffID,
    pub department: String,
    pub kind: ShiftKind,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_by: UserID,
    pub created_at: DateTime<Utc>,
}

impl Shift {
    pub const MAX_LENGTH_HOURS: i64 = 24;

    pub fn covers(&self, instant: DateTime<Utc>) -> bool {
        self.starts_at <= instant && instant < self.ends_at
    }

    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }

    /// A shift must end after it starts and last at most a day
    pub fn is_valid_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        starts_at < ends_at && ends_at - starts_at <= Duration::hours(Self::MAX_LENGTH_HOURS)
    }
}

/// A staff member on a shift covering the current time
#[derive(Debug, Clone, Serialize)]
pub struct OnDuty {
    pub staff: StaffMember,
    pub shift: Shift,
}
