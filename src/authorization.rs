//! Casbin wrapper: checks a (role, resource, action) triple against the
//! permission table in `access_control/policy.csv`.

use casbin::{CoreApi, DefaultModel, FileAdapter};
use log::{error, info, warn};
use serde::Serialize;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter};
use thiserror::Error;

use crate::models::UserData;

pub const DEFAULT_MODEL: &str = "access_control/model.conf";
pub const DEFAULT_POLICY: &str = "access_control/policy.csv";

/// Protected tables and views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumIter, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resource {
    Users,
    Patients,
    Triage,
    Emergencies,
    Ambulances,
    Resources,
    Procurement,
    Staff,
    Shifts,
    Transfers,
    Claims,
    Telemedicine,
    Audit,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, EnumIter, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Approve,
}

/// A casbin enforcer
pub struct Enforcer(casbin::Enforcer);

type CasbinResult = Result<(), AccessDenied>;

/// Access refused, without details
#[derive(Debug, Error)]
#[error("Access denied.")]
pub struct AccessDenied;

/// An enforcer bound to the calling user
pub struct Context<'ctx> {
    enforcer: &'ctx Enforcer,
    subject: &'ctx UserData,
}

/// One granted resource/action pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Enforcer {
    pub async fn load(model: &str, policy: &str) -> Result<Self, casbin::Error> {
        let model = DefaultModel::from_file(model).await?;
        let adapter = FileAdapter::new(policy.to_owned());
        let mut enforcer = casbin::Enforcer::new(model, adapter).await?;
        enforcer.load_policy().await?;
        Ok(Enforcer(enforcer))
    }

    pub async fn load_default() -> Result<Self, casbin::Error> {
        Self::load(DEFAULT_MODEL, DEFAULT_POLICY).await
    }

    pub fn with_subject<'ctx>(&'ctx self, subject: &'ctx UserData) -> Context<'ctx> {
        Context {
            enforcer: self,
            subject,
        }
    }
}

impl Context<'_> {
    fn enforce(&self, resource: Resource, action: Action) -> bool {
        let subject = self.subject;

        // Deactivated accounts keep their role but lose every permission
        if !subject.active {
            return false;
        }

        match self
            .enforcer
            .0
            .enforce((subject.role.as_ref(), resource.as_ref(), action.as_ref()))
        {
            Err(e) => {
                error!("Casbin error: {e:?}");
                false
            }
            Ok(granted) => granted,
        }
    }

    pub fn subject(&self) -> &UserData {
        self.subject
    }

    /// Silent check, for views that include a section only when readable
    pub fn can(&self, resource: Resource, action: Action) -> bool {
        self.enforce(resource, action)
    }

    pub fn require(&self, resource: Resource, action: Action) -> CasbinResult {
        let granted = self.enforce(resource, action);
        let subject = self.subject;

        if granted {
            info!(
                "Granted {} ({}) {} on {}",
                subject.username,
                subject.role,
                action.as_ref(),
                resource.as_ref()
            );
            Ok(())
        } else {
            warn!(
                "Denied {} ({}) {} on {}",
                subject.username,
                subject.role,
                action.as_ref(),
                resource.as_ref()
            );
            Err(AccessDenied)
        }
    }

    pub fn read(&self, resource: Resource) -> CasbinResult {
        self.require(resource, Action::Read)
    }

    pub fn create(&self, resource: Resource) -> CasbinResult {
        self.require(resource, Action::Create)
    }

    pub fn update(&self, resource: Resource) -> CasbinResult {
        self.require(resource, Action::Update)
    }

    pub fn delete(&self, resource: Resource) -> CasbinResult {
        self.require(resource, Action::Delete)
    }

    pub fn approve(&self, resource: Resource) -> CasbinResult {
        self.require(resource, Action::Approve)
    }

    /// Every resource/action pair granted to the subject
    pub fn permissions(&self) -> Vec<Permission> {
        Resource::iter()
            .flat_map(|resource| Action::iter().map(move |action| Permission { resource, action }))
            .filter(|p| self.can(p.resource, p.action))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{Role, UserData, UserID};
    use crate::utils::input_validation::Username;
    use crate::utils::password_utils::PWHash;
    use chrono::Utc;
    use once_cell::sync::Lazy;

    // Hashing is slow; the tests share one hash that nobody logs in with
    static TEST_HASH: Lazy<PWHash> =
        Lazy::new(|| crate::utils::password_utils::hash("Unused-Test-Pass9").unwrap());

    pub fn user(role: Role, username: &str) -> UserData {
        UserData {
            id: UserID::new(),
            username: Username::try_from(username).unwrap(),
            full_name: format!("Test {username}"),
            role,
            password: TEST_HASH.clone(),
            active: true,
            created_at: Utc::now(),
        }
    }
}
