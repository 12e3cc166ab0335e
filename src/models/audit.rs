use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::{timestamp_now, AuditID, UserID};

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
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
    Dispatch,
    Allocate,
    Release,
    Login,
    Logout,
}

/// Table an audit row points into
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
pub enum EntityType {
    User,
    Patient,
    TriageEntry,
    Emergency,
    Ambulance,
    Resource,
    SupplyRequest,
    StaffMember,
    Shift,
    Transfer,
    ShaClaim,
    Teleconsultation,
}

/// An append-only record of who changed what
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: AuditID,
    pub actor_id: UserID,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor_id: UserID,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl ToString,
        details: Value,
    ) -> Self {
        Self {
            id: AuditID::new(),
            actor_id,
            action,
            entity_type,
            entity_id: entity_id.to_string(),
            details,
            created_at: timestamp_now(),
        }
    }
}

/// Filters for the audit trail listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub actor_id: Option<UserID>,
}
