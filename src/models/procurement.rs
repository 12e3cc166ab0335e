use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{Lifecycle, ResourceID, SupplyRequestID, UserID};

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
pub enum SupplyRequestStatus {
    Pending,
    Approved,
    Rejected,
    Fulfilled,
    Cancelled,
}

impl Lifecycle for SupplyRequestStatus {
    fn can_transition_to(self, next: Self) -> bool {
        use SupplyRequestStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) | (Approved, Fulfilled)
        )
    }

    fn is_terminal(self) -> bool {
        use SupplyRequestStatus::*;
        matches!(self, Rejected | Fulfilled | Cancelled)
    }
}

/// A request to buy stock, optionally tied to an inventory line
#[derive(Debug, Clone, Serialize)]
pub struct SupplyRequest {
    pub id: SupplyRequestID,
    pub resource_id: Option<ResourceID>,
    pub item_name: String,
    pub quantity: u32,
    pub unit_cost_cents: i64,
    pub supplier: Option<String>,
    pub justification: String,
    pub status: SupplyRequestStatus,
    pub requested_by: UserID,
    pub reviewed_by: Option<UserID>,
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl SupplyRequest {
    pub fn total_cost_cents(&self) -> i64 {
        self.unit_cost_cents.saturating_mul(i64::from(self.quantity))
    }
}
