use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{opt_short_text, opt_valid, short_text, Service, ServiceError};
use crate::authorization::Resource;
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, Cadre, EntityType, OnDuty, Shift, ShiftID, ShiftKind,
    StaffID, StaffMember, UserData, UserID,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaffMember {
    pub user_id: Option<UserID>,
    pub first_name: String,
    pub last_name: String,
    pub cadre: Cadre,
    pub department: String,
    pub phone: Option<String>,
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewShift {
    pub staff_id: StaffID,
    /// Defaults to the staff member's department
    pub department: Option<String>,
    pub kind: ShiftKind,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Roster window, the coming week when left out
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ShiftWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ShiftWindow {
    pub const DEFAULT_DAYS: i64 = 7;

    fn resolve(self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), ServiceError> {
        let from = self.from.unwrap_or(now);
        let to = self.to.unwrap_or(from + Duration::days(Self::DEFAULT_DAYS));
        if to <= from {
            return Err(ServiceError::Invalid("to"));
        }
        Ok((from, to))
    }
}

impl Service {
    pub async fn create_staff(
        &self,
        actor: &UserData,
        input: NewStaffMember,
    ) -> Result<StaffMember, ServiceError> {
        self.enforce(actor).create(Resource::Staff)?;

        let member = StaffMember {
            id: StaffID::new(),
            user_id: input.user_id,
            first_name: short_text("first_name", &input.first_name)?,
            last_name: short_text("last_name", &input.last_name)?,
            cadre: input.cadre,
            department: short_text("department", &input.department)?,
            phone: opt_valid("phone", input.phone.as_deref())?,
            license_number: opt_short_text("license_number", input.license_number.as_deref())?,
            active: true,
            created_at: timestamp_now(),
        };
        if let Some(user_id) = member.user_id {
            self.db.get_user(user_id).await?;
        }

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::StaffMember,
            member.id,
            json!({ "cadre": member.cadre, "department": member.department }),
        );
        self.db.insert_staff(&member, &audit).await?;
        Ok(member)
    }

    pub async fn get_staff(&self, actor: &UserData, id: StaffID) -> Result<StaffMember, ServiceError> {
        self.enforce(actor).read(Resource::Staff)?;
        Ok(self.db.get_staff(id).await?)
    }

    pub async fn list_staff(
        &self,
        actor: &UserData,
        department: Option<&str>,
    ) -> Result<Vec<StaffMember>, ServiceError> {
        self.enforce(actor).read(Resource::Staff)?;
        let department = department.map(str::trim).filter(|d| !d.is_empty());
        Ok(self.db.list_staff(department).await?)
    }

    /// Deactivated staff drop off the on-duty list but keep their history
    pub async fn deactivate_staff(
        &self,
        actor: &UserData,
        id: StaffID,
    ) -> Result<StaffMember, ServiceError> {
        self.enforce(actor).update(Resource::Staff)?;

        let mut member = self.db.get_staff(id).await?;
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::StaffMember,
            member.id,
            json!({ "active": { "from": member.active, "to": false } }),
        );
        self.db.set_staff_active(member.id, false, &audit).await?;

        member.active = false;
        Ok(member)
    }

    pub async fn add_shift(&self, actor: &UserData, input: NewShift) -> Result<Shift, ServiceError> {
        self.enforce(actor).create(Resource::Shifts)?;

        if !Shift::is_valid_window(input.starts_at, input.ends_at) {
            return Err(ServiceError::Invalid("ends_at"));
        }
        let member = self.db.get_staff(input.staff_id).await?;
        if !member.active {
            return Err(ServiceError::Conflict(format!(
                "staff member {} is inactive",
                member.id
            )));
        }
        let department = opt_short_text("department", input.department.as_deref())?
            .unwrap_or_else(|| member.department.clone());

        let now = timestamp_now();
        let shift = Shift {
            id: ShiftID::new(),
            staff_id: member.id,
            department,
            kind: input.kind,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            created_by: actor.id,
            created_at: now,
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Shift,
            shift.id,
            json!({
                "staff_id": shift.staff_id,
                "kind": shift.kind,
                "starts_at": shift.starts_at,
                "ends_at": shift.ends_at,
            }),
        );
        self.db.insert_shift(&shift, &audit).await?;
        Ok(shift)
    }

    /// Shifts overlapping the window
    pub async fn list_shifts(
        &self,
        actor: &UserData,
        window: ShiftWindow,
    ) -> Result<Vec<Shift>, ServiceError> {
        self.enforce(actor).read(Resource::Shifts)?;
        let (from, to) = window.resolve(timestamp_now())?;
        Ok(self.db.list_shifts(from, to).await?)
    }

    pub async fn remove_shift(&self, actor: &UserData, id: ShiftID) -> Result<(), ServiceError> {
        self.enforce(actor).delete(Resource::Shifts)?;

        let shift = self.db.get_shift(id).await?;
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Delete,
            EntityType::Shift,
            shift.id,
            json!({ "staff_id": shift.staff_id, "starts_at": shift.starts_at }),
        );
        self.db.delete_shift(shift.id, &audit).await?;
        Ok(())
    }

    pub async fn on_duty(&self, actor: &UserData) -> Result<Vec<OnDuty>, ServiceError> {
        self.enforce(actor).read(Resource::Shifts)?;
        Ok(self.db.on_duty(timestamp_now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DBError;
    use crate::models::Role;
    use crate::services::test_support::{actor, service};

    fn nurse_member(first_name: &str) -> NewStaffMember {
        NewStaffMember {
            user_id: None,
            first_name: first_name.to_string(),
            last_name: "Wanjiru".to_string(),
            cadre: Cadre::Nurse,
            department: "Casualty".to_string(),
            phone: Some("0711222333".to_string()),
            license_number: Some("NCK-44721".to_string()),
        }
    }

    fn shift(staff_id: StaffID, starts_at: DateTime<Utc>, hours: i64) -> NewShift {
        NewShift {
            staff_id,
            department: None,
            kind: ShiftKind::Day,
            starts_at,
            ends_at: starts_at + Duration::hours(hours),
        }
    }

    #[tokio::test]
    async fn test_rostering_and_on_duty() {
        let service = service().await;
        let admin = actor(&service, Role::Admin, "admin").await;
        let dispatcher = actor(&service, Role::Dispatcher, "dispatcher").await;

        let member = service.create_staff(&admin, nurse_member("Grace")).await.unwrap();
        let now = timestamp_now();

        let current = service
            .add_shift(&admin, shift(member.id, now - Duration::hours(2), 8))
            .await
            .unwrap();
        assert_eq!(current.department, "Casualty");

        assert!(matches!(
            service
                .add_shift(&admin, shift(member.id, now + Duration::hours(4), 8))
                .await,
            Err(ServiceError::Db(DBError::Conflict(_)))
        ));
        assert!(matches!(
            service
                .add_shift(&admin, shift(member.id, now + Duration::days(1), 30))
                .await,
            Err(ServiceError::Invalid("ends_at"))
        ));

        let on_duty = service.on_duty(&dispatcher).await.unwrap();
        assert_eq!(on_duty.len(), 1);
        assert_eq!(on_duty[0].staff.id, member.id);

        let roster = service.list_shifts(&dispatcher, ShiftWindow::default()).await.unwrap();
        assert_eq!(roster.len(), 1);

        service.deactivate_staff(&admin, member.id).await.unwrap();
        assert!(service.on_duty(&dispatcher).await.unwrap().is_empty());
        assert!(matches!(
            service
                .add_shift(&admin, shift(member.id, now + Duration::days(2), 8))
                .await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_staff_listing_and_rights() {
        let service = service().await;
        let admin = actor(&service, Role::Admin, "admin").await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;

        assert!(matches!(
            service.create_staff(&nurse, nurse_member("Grace")).await,
            Err(ServiceError::AccessDenied(_))
        ));

        let member = service.create_staff(&admin, nurse_member("Grace")).await.unwrap();
        let mut theatre = nurse_member("Mercy");
        theatre.department = "Theatre".to_string();
        service.create_staff(&admin, theatre).await.unwrap();

        let casualty = service.list_staff(&nurse, Some("casualty")).await.unwrap();
        assert_eq!(casualty.len(), 1);
        assert_eq!(casualty[0].id, member.id);
        assert_eq!(service.list_staff(&nurse, Some("  ")).await.unwrap().len(), 2);

        let planned = service
            .add_shift(&admin, shift(member.id, timestamp_now() + Duration::days(1), 12))
            .await
            .unwrap();
        assert!(matches!(
            service.remove_shift(&nurse, planned.id).await,
            Err(ServiceError::AccessDenied(_))
        ));
        service.remove_shift(&admin, planned.id).await.unwrap();

        let window = ShiftWindow { from: Some(timestamp_now()), to: Some(timestamp_now()) };
        assert!(matches!(
            service.list_shifts(&nurse, window).await,
            Err(ServiceError::Invalid("to"))
        ));
    }
}
