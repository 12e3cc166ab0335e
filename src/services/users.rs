use log::info;
use serde::Deserialize;
use serde_json::json;

use super::{hashing_failed, short_text, valid, Service, ServiceError};
use crate::authorization::{Permission, Resource};
use crate::models::{timestamp_now, AuditAction, AuditEntry, EntityType, Role, UserData, UserID};
use crate::utils::input_validation::Username;
use crate::utils::password_utils::{check_strength, hash};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub password: String,
}

pub(super) fn login_event(user: &UserData) -> AuditEntry {
    AuditEntry::new(user.id, AuditAction::Login, EntityType::User, user.id, json!({}))
}

pub(super) fn logout_event(user: &UserData) -> AuditEntry {
    AuditEntry::new(user.id, AuditAction::Logout, EntityType::User, user.id, json!({}))
}

impl Service {
    /// Builds and validates an account, without storing it
    fn new_account(input: NewUser) -> Result<UserData, ServiceError> {
        let username: Username = valid("username", &input.username)?;
        let full_name = short_text("full_name", &input.full_name)?;
        check_strength(&input.password, username.as_ref())?;
        let password = hash(&input.password).map_err(hashing_failed)?;

        Ok(UserData {
            id: UserID::new(),
            username,
            full_name,
            role: input.role,
            password,
            active: true,
            created_at: timestamp_now(),
        })
    }

    /// Creates the first administrator when there are no accounts yet
    pub async fn bootstrap_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserData>, ServiceError> {
        if self.db.count_users().await? > 0 {
            return Ok(None);
        }

        let admin = Self::new_account(NewUser {
            username: username.to_owned(),
            full_name: "Administrator".to_owned(),
            role: Role::Admin,
            password: password.to_owned(),
        })?;
        let audit = AuditEntry::new(
            admin.id,
            AuditAction::Create,
            EntityType::User,
            admin.id,
            json!({ "username": admin.username, "role": admin.role, "bootstrap": true }),
        );
        self.db.insert_user(&admin, &audit).await?;

        info!("Bootstrapped administrator account {}", admin.username);
        Ok(Some(admin))
    }

    pub async fn create_user(&self, actor: &UserData, input: NewUser) -> Result<UserData, ServiceError> {
        self.enforce(actor).create(Resource::Users)?;

        let user = Self::new_account(input)?;
        if self.db.lookup_username(&user.username).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::User,
            user.id,
            json!({ "username": user.username, "role": user.role }),
        );
        self.db.insert_user(&user, &audit).await?;

        info!("Account created for {} ({})", user.username, user.role);
        Ok(user)
    }

    pub async fn list_users(&self, actor: &UserData) -> Result<Vec<UserData>, ServiceError> {
        self.enforce(actor).read(Resource::Users)?;
        Ok(self.db.list_users().await?)
    }

    pub async fn update_user_role(
        &self,
        actor: &UserData,
        user_id: UserID,
        role: Role,
    ) -> Result<UserData, ServiceError> {
        self.enforce(actor).update(Resource::Users)?;

        let mut user = self.db.get_user(user_id).await?;
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Update,
            EntityType::User,
            user.id,
            json!({ "role": { "from": user.role, "to": role } }),
        );
        self.db.update_user_role(user.id, role, &audit).await?;

        user.role = role;
        Ok(user)
    }

    /// Deactivating also ends the user's open sessions
    pub async fn set_user_active(
        &self,
        actor: &UserData,
        user_id: UserID,
        active: bool,
    ) -> Result<UserData, ServiceError> {
        self.enforce(actor).update(Resource::Users)?;

        if actor.id == user_id && !active {
            return Err(ServiceError::Conflict(
                "you cannot deactivate your own account".to_owned(),
            ));
        }

        let mut user = self.db.get_user(user_id).await?;
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::User,
            user.id,
            json!({ "active": { "from": user.active, "to": active } }),
        );
        self.db.set_user_active(user.id, active, &audit).await?;

        if !active {
            let ended = self.sessions.revoke_user(user.id).await;
            info!("Deactivated {}, ended {ended} session(s)", user.username);
        }
        user.active = active;
        Ok(user)
    }

    pub fn my_permissions(&self, actor: &UserData) -> Vec<Permission> {
        self.enforce(actor).permissions()
    }
}
