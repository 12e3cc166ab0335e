use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};

use super::UserID;
use crate::utils::input_validation::Username;
use crate::utils::password_utils::PWHash;

/// Role of a user account. The role name is the casbin subject.
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
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Dispatcher,
    ProcurementOfficer,
    FinanceOfficer,
}

/// A user account. The password hash is never serialized.
#[derive(Debug, Clone, Serialize, Display)]
#[display("{username}")]
pub struct UserData {
    pub id: UserID,
    pub username: Username,
    pub full_name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password: PWHash,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::password_utils::hash;

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = UserData {
            id: UserID::new(),
            username: Username::try_from("dr_achieng").unwrap(),
            full_name: "Dr. Achieng Odhiambo".to_string(),
            role: Role::Doctor,
            password: hash("Kisumu-Ward-7!").unwrap(),
            active: true,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["role"], "DOCTOR");
        assert_eq!(json["username"], "dr_achieng");
        assert_eq!(user.to_string(), "dr_achieng");
    }
}
