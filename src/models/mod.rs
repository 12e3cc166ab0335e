//! Data model
//!
//! Every table has a strongly typed id, and every status column is an enum
//! implementing [`Lifecycle`], which states the allowed transitions.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

pub mod audit;
pub mod claims;
pub mod dispatch;
pub mod patients;
pub mod procurement;
pub mod resources;
pub mod staff;
pub mod telemedicine;
pub mod transfers;
pub mod triage;
pub mod users;

pub use audit::*;
pub use claims::*;
pub use dispatch::*;
pub use patients::*;
pub use procurement::*;
pub use resources::*;
pub use staff::*;
pub use telemedicine::*;
pub use transfers::*;
pub use triage::*;
pub use users::*;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Serialize,
            Deserialize,
            Clone,
            Copy,
            Eq,
            PartialEq,
            Hash,
            PartialOrd,
            Ord,
            derive_more::Display,
        )]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Unique id of a user account
    UserID
);
entity_id!(PatientID);
entity_id!(TriageID);
entity_id!(EmergencyID);
entity_id!(AmbulanceID);
entity_id!(ResourceID);
entity_id!(SupplyRequestID);
entity_id!(StaffID);
entity_id!(ShiftID);
entity_id!(TransferID);
entity_id!(ClaimID);
entity_id!(ConsultationID);
entity_id!(AuditID);

/// A status column with a fixed set of allowed transitions.
pub trait Lifecycle: Copy + Eq + fmt::Display {
    fn can_transition_to(self, next: Self) -> bool;

    /// No transition leaves a terminal status.
    fn is_terminal(self) -> bool;
}

/// Current time, truncated to whole seconds so stored timestamps compare
/// the same way in SQL and in Rust.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Ordinal urgency assigned at intake. Variants are declared in priority
/// order, so the derived `Ord` sorts the most urgent first.
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
pub enum TriageLevel {
    Immediate,
    Urgent,
    LessUrgent,
    NonUrgent,
}

impl TriageLevel {
    /// 1 is the most urgent
    pub fn rank(self) -> u8 {
        match self {
            TriageLevel::Immediate => 1,
            TriageLevel::Urgent => 2,
            TriageLevel::LessUrgent => 3,
            TriageLevel::NonUrgent => 4,
        }
    }

    /// Longest acceptable wait before treatment starts
    pub fn target_wait_minutes(self) -> i64 {
        match self {
            TriageLevel::Immediate => 0,
            TriageLevel::Urgent => 30,
            TriageLevel::LessUrgent => 60,
            TriageLevel::NonUrgent => 120,
        }
    }
}

/// Pagination parameters shared by list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default = "Page::default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Page {
    pub const MAX_LIMIT: u32 = 200;

    fn default_limit() -> u32 {
        50
    }

    /// Limit clamped to 1..=MAX_LIMIT
    pub fn limit(&self) -> i64 {
        i64::from(self.limit.clamp(1, Self::MAX_LIMIT))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.offset)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::default_limit(),
            offset: 0,
        }
    }
}
