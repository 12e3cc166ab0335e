//! Application operations, and the single entry point for access control.
//!
//! Every operation takes the calling user, validates its input, checks the
//! caller's permissions against the casbin policy, then reads or writes the
//! database. Mutations hand the database the audit row to commit with them.

use log::{error, info, warn};
use thiserror::Error;

use crate::authorization::{AccessDenied, Context, Enforcer};
use crate::db::{DBError, Database};
use crate::models::{Lifecycle, UserData, UserID};
use crate::sessions::{SessionStore, SessionToken};
use crate::utils::input_validation::Username;
use crate::utils::password_utils::{verify, WeakPassword};
use crate::utils::text_input::TextInput;

mod audit;
mod claims;
mod dashboard;
mod dispatch;
mod patients;
mod procurement;
mod resources;
mod staff;
mod telemedicine;
mod transfers;
mod triage;
mod users;

pub use claims::{ClaimStatusUpdate, NewClaim};
pub use dashboard::Dashboard;
pub use dispatch::{AmbulanceUpdate, DispatchRequest, EmergencyStatusUpdate, NewAmbulance, NewEmergency};
pub use patients::PatientInput;
pub use procurement::{NewSupplyRequest, Review};
pub use resources::{NewResource, QuantityChange, ResourceUpdate};
pub use staff::{NewShift, NewStaffMember, ShiftWindow};
pub use telemedicine::{ConsultationStatusUpdate, NewConsultation};
pub use transfers::{NewTransfer, TransferStatusUpdate};
pub use triage::{TriageIntake, TriageStatusUpdate};
pub use users::NewUser;

pub struct Service {
    db: Database,
    enforcer: Enforcer,
    sessions: SessionStore,
    telemedicine_base_url: String,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error(transparent)]
    Db(#[from] DBError),

    #[error("Invalid {0}")]
    Invalid(&'static str),

    #[error(transparent)]
    WeakPassword(#[from] WeakPassword),

    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Conflict(String),

    #[error("Password hashing failed")]
    Hashing,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Wrong password or unknown user")]
    InvalidCredentials,

    #[error(transparent)]
    Db(#[from] DBError),
}

impl Service {
    pub fn new(
        db: Database,
        enforcer: Enforcer,
        sessions: SessionStore,
        telemedicine_base_url: &str,
    ) -> Self {
        Self {
            db,
            enforcer,
            sessions,
            telemedicine_base_url: telemedicine_base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Authorization context with the caller as subject
    fn enforce<'a>(&'a self, actor: &'a UserData) -> Context<'a> {
        self.enforcer.with_subject(actor)
    }

    /// Checks the password and records the login.
    ///
    /// Unknown usernames, wrong passwords and deactivated accounts all fail
    /// the same way.
    pub async fn check_credentials(&self, username: &str, password: &str) -> Result<UserData, LoginError> {
        let user = match Username::try_from(username) {
            Ok(username) => self.db.lookup_username(&username).await?,
            Err(_) => None,
        };

        let hash = user.as_ref().map(|u| &u.password);
        if !verify(password, hash) {
            warn!("Failed login for {username:?}");
            return Err(LoginError::InvalidCredentials);
        }

        let user = match user {
            Some(user) if user.active => user,
            _ => {
                warn!("Login refused for {username:?}: account inactive");
                return Err(LoginError::InvalidCredentials);
            }
        };

        self.db.record_event(&users::login_event(&user)).await?;
        info!("{} logged in", user.username);
        Ok(user)
    }

    /// Checks the password and opens a bearer session
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(SessionToken, UserData), LoginError> {
        let user = self.check_credentials(username, password).await?;
        let token = self.sessions.create(user.id).await;
        Ok((token, user))
    }

    /// The active user behind a session token
    pub async fn authenticate(&self, token: &SessionToken) -> Result<UserData, ServiceError> {
        let user_id = self
            .sessions
            .resolve(token)
            .await
            .ok_or(ServiceError::Unauthenticated)?;

        let user = self.active_user(user_id).await;
        if matches!(user, Err(ServiceError::Unauthenticated)) {
            self.sessions.revoke(token).await;
        }
        user
    }

    /// Deleted and deactivated accounts count as signed out
    pub async fn active_user(&self, user_id: UserID) -> Result<UserData, ServiceError> {
        match self.db.get_user(user_id).await {
            Ok(user) if user.active => Ok(user),
            Ok(_) | Err(DBError::NotFound { .. }) => Err(ServiceError::Unauthenticated),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn logout(&self, actor: &UserData, token: &SessionToken) -> Result<(), ServiceError> {
        if self.sessions.revoke(token).await {
            self.record_logout(actor).await?;
        }
        Ok(())
    }

    pub async fn record_logout(&self, actor: &UserData) -> Result<(), ServiceError> {
        self.db.record_event(&users::logout_event(actor)).await?;
        info!("{} logged out", actor.username);
        Ok(())
    }
}

/// Runs free text through [`TextInput`], short form
fn short_text(field: &'static str, value: &str) -> Result<String, ServiceError> {
    TextInput::new_short_form(value)
        .map(TextInput::into_inner)
        .map_err(|e| invalid(field, e))
}

fn long_text(field: &'static str, value: &str) -> Result<String, ServiceError> {
    TextInput::new_long_form(value)
        .map(TextInput::into_inner)
        .map_err(|e| invalid(field, e))
}

/// Absent or blank means `None`
fn opt_short_text(field: &'static str, value: Option<&str>) -> Result<Option<String>, ServiceError> {
    non_blank(value).map(|v| short_text(field, v)).transpose()
}

fn opt_long_text(field: &'static str, value: Option<&str>) -> Result<Option<String>, ServiceError> {
    non_blank(value).map(|v| long_text(field, v)).transpose()
}

/// Parses into one of the validated identifier types
fn valid<T: TryFrom<String>>(field: &'static str, value: &str) -> Result<T, ServiceError> {
    T::try_from(value.to_owned()).map_err(|_| ServiceError::Invalid(field))
}

fn opt_valid<T: TryFrom<String>>(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<T>, ServiceError> {
    non_blank(value).map(|v| valid(field, v)).transpose()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn invalid(field: &'static str, cause: anyhow::Error) -> ServiceError {
    info!("Rejected {field}: {cause:#}");
    ServiceError::Invalid(field)
}

/// Fails unless the status may move from `from` to `to`
fn check_transition<S: Lifecycle>(from: S, to: S) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn hashing_failed(e: argon2::password_hash::Error) -> ServiceError {
    error!("Password hashing failed: {e}");
    ServiceError::Hashing
}

/// A service over an in-memory database and the shipped policy
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::fixtures;
    use crate::models::Role;

    pub async fn service() -> Service {
        let db = Database::in_memory().await.unwrap();
        let enforcer = Enforcer::load_default().await.unwrap();
        Service::new(
            db,
            enforcer,
            SessionStore::new(chrono::Duration::minutes(30)),
            "https://meet.example.org/ems/",
        )
    }

    pub async fn actor(service: &Service, role: Role, username: &str) -> UserData {
        fixtures::stored_user(service.db(), role, username).await
    }
}
