use serde::Deserialize;
use serde_json::json;

use super::{opt_short_text, short_text, Service, ServiceError};
use crate::authorization::Resource as Protected;
use crate::capacity::{summarize, AvailabilitySummary};
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, CapacityError, EntityType, Resource, ResourceCategory,
    ResourceID, UserData,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewResource {
    pub name: String,
    pub category: ResourceCategory,
    pub department: String,
    pub unit: String,
    pub total_quantity: u32,
    /// Defaults to the total
    pub available_quantity: Option<u32>,
    #[serde(default)]
    pub reorder_level: u32,
}

/// Metadata edit. A new total keeps the quantity in use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceUpdate {
    pub name: Option<String>,
    pub department: Option<String>,
    pub unit: Option<String>,
    pub reorder_level: Option<u32>,
    pub total_quantity: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuantityChange {
    pub quantity: u32,
}

impl From<CapacityError> for ServiceError {
    fn from(error: CapacityError) -> Self {
        match error {
            CapacityError::ZeroQuantity => ServiceError::Invalid("quantity"),
            other => ServiceError::Conflict(other.to_string()),
        }
    }
}

impl Service {
    pub async fn create_resource(
        &self,
        actor: &UserData,
        input: NewResource,
    ) -> Result<Resource, ServiceError> {
        self.enforce(actor).create(Protected::Resources)?;

        let available = input.available_quantity.unwrap_or(input.total_quantity);
        if available > input.total_quantity {
            return Err(ServiceError::Invalid("available_quantity"));
        }

        let resource = Resource {
            id: ResourceID::new(),
            name: short_text("name", &input.name)?,
            category: input.category,
            department: short_text("department", &input.department)?,
            unit: short_text("unit", &input.unit)?,
            total_quantity: input.total_quantity,
            available_quantity: available,
            reorder_level: input.reorder_level,
            updated_at: timestamp_now(),
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Resource,
            resource.id,
            json!({
                "name": resource.name,
                "category": resource.category,
                "total": resource.total_quantity,
                "available": resource.available_quantity,
            }),
        );
        self.db.insert_resource(&resource, &audit).await?;
        Ok(resource)
    }

    pub async fn get_resource(&self, actor: &UserData, id: ResourceID) -> Result<Resource, ServiceError> {
        self.enforce(actor).read(Protected::Resources)?;
        Ok(self.db.get_resource(id).await?)
    }

    pub async fn list_resources(
        &self,
        actor: &UserData,
        category: Option<ResourceCategory>,
    ) -> Result<Vec<Resource>, ServiceError> {
        self.enforce(actor).read(Protected::Resources)?;
        Ok(self.db.list_resources(category).await?)
    }

    pub async fn update_resource(
        &self,
        actor: &UserData,
        id: ResourceID,
        update: ResourceUpdate,
    ) -> Result<Resource, ServiceError> {
        self.enforce(actor).update(Protected::Resources)?;

        let mut resource = self.db.get_resource(id).await?;
        let previous_available = resource.available_quantity;
        let previous_total = resource.total_quantity;

        if let Some(name) = opt_short_text("name", update.name.as_deref())? {
            resource.name = name;
        }
        if let Some(department) = opt_short_text("department", update.department.as_deref())? {
            resource.department = department;
        }
        if let Some(unit) = opt_short_text("unit", update.unit.as_deref())? {
            resource.unit = unit;
        }
        if let Some(level) = update.reorder_level {
            resource.reorder_level = level;
        }
        if let Some(total) = update.total_quantity {
            resource.resize(total)?;
        }
        resource.updated_at = timestamp_now();

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Update,
            EntityType::Resource,
            resource.id,
            json!({
                "name": resource.name,
                "total": { "from": previous_total, "to": resource.total_quantity },
                "reorder_level": resource.reorder_level,
            }),
        );
        self.db
            .update_resource(&resource, previous_available, &audit)
            .await?;
        Ok(resource)
    }

    /// Takes `quantity` units out of the available pool
    pub async fn allocate_resource(
        &self,
        actor: &UserData,
        id: ResourceID,
        change: QuantityChange,
    ) -> Result<Resource, ServiceError> {
        self.enforce(actor).update(Protected::Resources)?;

        let mut resource = self.db.get_resource(id).await?;
        let previous = resource.available_quantity;
        resource.allocate(change.quantity)?;
        self.store_quantity_change(actor, resource, previous, AuditAction::Allocate)
            .await
    }

    /// Returns `quantity` units to the available pool
    pub async fn release_resource(
        &self,
        actor: &UserData,
        id: ResourceID,
        change: QuantityChange,
    ) -> Result<Resource, ServiceError> {
        self.enforce(actor).update(Protected::Resources)?;

        let mut resource = self.db.get_resource(id).await?;
        let previous = resource.available_quantity;
        resource.release(change.quantity)?;
        self.store_quantity_change(actor, resource, previous, AuditAction::Release)
            .await
    }

    async fn store_quantity_change(
        &self,
        actor: &UserData,
        mut resource: Resource,
        previous_available: u32,
        action: AuditAction,
    ) -> Result<Resource, ServiceError> {
        resource.updated_at = timestamp_now();
        let audit = AuditEntry::new(
            actor.id,
            action,
            EntityType::Resource,
            resource.id,
            json!({
                "available": { "from": previous_available, "to": resource.available_quantity },
                "total": resource.total_quantity,
            }),
        );
        self.db
            .update_resource(&resource, previous_available, &audit)
            .await?;
        Ok(resource)
    }

    pub async fn availability_summary(
        &self,
        actor: &UserData,
    ) -> Result<AvailabilitySummary, ServiceError> {
        self.enforce(actor).read(Protected::Resources)?;
        let resources = self.db.list_resources(None).await?;
        Ok(summarize(&resources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::test_support::{actor, service};

    fn icu_beds(total: u32, available: Option<u32>) -> NewResource {
        NewResource {
            name: "ICU bed".to_string(),
            category: ResourceCategory::Bed,
            department: "ICU".to_string(),
            unit: "bed".to_string(),
            total_quantity: total,
            available_quantity: available,
            reorder_level: 1,
        }
    }

    #[tokio::test]
    async fn test_allocate_release_and_summary() {
        let service = service().await;
        let buyer = actor(&service, Role::ProcurementOfficer, "buyer").await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;

        let beds = service.create_resource(&buyer, icu_beds(3, None)).await.unwrap();
        assert_eq!(beds.available_quantity, 3);

        let taken = service
            .allocate_resource(&nurse, beds.id, QuantityChange { quantity: 2 })
            .await
            .unwrap();
        assert_eq!(taken.available_quantity, 1);

        assert!(matches!(
            service.allocate_resource(&nurse, beds.id, QuantityChange { quantity: 2 }).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(matches!(
            service.allocate_resource(&nurse, beds.id, QuantityChange { quantity: 0 }).await,
            Err(ServiceError::Invalid("quantity"))
        ));

        let summary = service.availability_summary(&nurse).await.unwrap();
        let bed_pool = summary.category(ResourceCategory::Bed);
        assert_eq!((bed_pool.total, bed_pool.available, bed_pool.in_use), (3, 1, 2));
        assert_eq!(bed_pool.utilization_percent, 66.7);
        assert_eq!(summary.low_stock.len(), 1);

        service
            .release_resource(&nurse, beds.id, QuantityChange { quantity: 2 })
            .await
            .unwrap();
        assert!(matches!(
            service.release_resource(&nurse, beds.id, QuantityChange { quantity: 1 }).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_resize_keeps_in_use() {
        let service = service().await;
        let buyer = actor(&service, Role::ProcurementOfficer, "buyer").await;
        let beds = service.create_resource(&buyer, icu_beds(10, Some(4))).await.unwrap();

        assert!(matches!(
            service
                .update_resource(
                    &buyer,
                    beds.id,
                    ResourceUpdate { total_quantity: Some(5), ..Default::default() },
                )
                .await,
            Err(ServiceError::Conflict(_))
        ));

        let grown = service
            .update_resource(
                &buyer,
                beds.id,
                ResourceUpdate {
                    total_quantity: Some(12),
                    reorder_level: Some(3),
                    name: Some("ICU bed (ventilated)".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!((grown.total_quantity, grown.available_quantity), (12, 6));
        assert_eq!(grown.name, "ICU bed (ventilated)");
    }

    #[tokio::test]
    async fn test_creation_rules() {
        let service = service().await;
        let buyer = actor(&service, Role::ProcurementOfficer, "buyer").await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;

        assert!(matches!(
            service.create_resource(&buyer, icu_beds(2, Some(3))).await,
            Err(ServiceError::Invalid("available_quantity"))
        ));
        assert!(matches!(
            service.create_resource(&nurse, icu_beds(2, None)).await,
            Err(ServiceError::AccessDenied(_))
        ));

        service.create_resource(&buyer, icu_beds(2, None)).await.unwrap();
        assert!(matches!(
            service.create_resource(&buyer, icu_beds(4, None)).await,
            Err(ServiceError::Db(crate::db::DBError::Conflict(_)))
        ));
        assert_eq!(
            service
                .list_resources(&nurse, Some(ResourceCategory::Medication))
                .await
                .unwrap()
                .len(),
            0
        );
    }
}
