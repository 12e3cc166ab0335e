use super::{Service, ServiceError};
use crate::authorization::Resource;
use crate::models::{AuditEntry, AuditFilter, Page, UserData};

impl Service {
    pub async fn list_audit(
        &self,
        actor: &UserData,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        self.enforce(actor).read(Resource::Audit)?;
        Ok(self.db.list_audit(filter, page).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, Role};
    use crate::services::test_support::{actor, service};

    #[tokio::test]
    async fn test_only_admins_read_the_trail() {
        let service = service().await;
        let admin = actor(&service, Role::Admin, "admin").await;
        let doctor = actor(&service, Role::Doctor, "doctor").await;

        assert!(matches!(
            service.list_audit(&doctor, &AuditFilter::default(), Page::default()).await,
            Err(ServiceError::AccessDenied(_))
        ));

        let filter = AuditFilter {
            actor_id: Some(admin.id),
            ..Default::default()
        };
        let trail = service.list_audit(&admin, &filter, Page::default()).await.unwrap();
        assert!(trail.iter().all(|e| e.actor_id == admin.id));
        assert!(trail.iter().any(|e| e.action == AuditAction::Create));
    }
}
