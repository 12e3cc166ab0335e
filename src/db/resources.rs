use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{opt_str, parse_col, DBError, Database};
use crate::models::{AuditEntry, EntityType, Resource, ResourceCategory, ResourceID};

impl FromRow<'_, SqliteRow> for Resource {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Resource {
            id: parse_col(row, "id")?,
            name: row.try_get("name")?,
            category: parse_col(row, "category")?,
            department: row.try_get("department")?,
            unit: row.try_get("unit")?,
            total_quantity: row.try_get("total_quantity")?,
            available_quantity: row.try_get("available_quantity")?,
            reorder_level: row.try_get("reorder_level")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Database {
    pub async fn get_resource(&self, id: ResourceID) -> Result<Resource, DBError> {
        sqlx::query_as::<_, Resource>("SELECT * FROM resources WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Resource, id))
    }

    pub async fn list_resources(
        &self,
        category: Option<ResourceCategory>,
    ) -> Result<Vec<Resource>, DBError> {
        Ok(sqlx::query_as::<_, Resource>(
            r#"
            SELECT * FROM resources
            WHERE (?1 IS NULL OR category = ?1)
            ORDER BY category, department, name
            "#,
        )
        .bind(opt_str(&category))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert_resource(&self, resource: &Resource, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO resources (
                id, name, category, department, unit, total_quantity, available_quantity,
                reorder_level, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(resource.id.to_string())
        .bind(&resource.name)
        .bind(resource.category.as_ref())
        .bind(&resource.department)
        .bind(&resource.unit)
        .bind(resource.total_quantity)
        .bind(resource.available_quantity)
        .bind(resource.reorder_level)
        .bind(resource.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Stores `resource` as modified from a copy read while the row held
    /// `previous_available`. Fails with `Conflict` if the stock moved in between.
    pub async fn update_resource(
        &self,
        resource: &Resource,
        previous_available: u32,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE resources
            SET name = ?2, category = ?3, department = ?4, unit = ?5, total_quantity = ?6,
                available_quantity = ?7, reorder_level = ?8, updated_at = ?9
            WHERE id = ?1 AND available_quantity = ?10
            "#,
        )
        .bind(resource.id.to_string())
        .bind(&resource.name)
        .bind(resource.category.as_ref())
        .bind(&resource.department)
        .bind(&resource.unit)
        .bind(resource.total_quantity)
        .bind(resource.available_quantity)
        .bind(resource.reorder_level)
        .bind(resource.updated_at)
        .bind(previous_available)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DBError::Conflict(format!(
                "stock of resource {} changed, retry",
                resource.id
            )));
        }

        Self::commit_with_audit(tx, audit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::models::{timestamp_now, AuditAction, Role};
    use serde_json::json;

    fn beds(name: &str, total: u32) -> Resource {
        Resource {
            id: ResourceID::new(),
            name: name.to_string(),
            category: ResourceCategory::Bed,
            department: "Casualty".to_string(),
            unit: "bed".to_string(),
            total_quantity: total,
            available_quantity: total,
            reorder_level: 2,
            updated_at: timestamp_now(),
        }
    }

    #[tokio::test]
    async fn test_allocation_is_stored_and_guarded() {
        let db = Database::in_memory().await.unwrap();
        let nurse = fixtures::stored_user(&db, Role::Nurse, "nurse").await;
        let audit = |id| AuditEntry::new(nurse.id, AuditAction::Allocate, EntityType::Resource, id, json!({}));

        let ward = beds("Observation bed", 10);
        db.insert_resource(&ward, &audit(ward.id)).await.unwrap();

        let mut allocated = db.get_resource(ward.id).await.unwrap();
        allocated.allocate(4).unwrap();
        db.update_resource(&allocated, 10, &audit(ward.id)).await.unwrap();
        assert_eq!(db.get_resource(ward.id).await.unwrap().available_quantity, 6);

        // A second writer still holding the old copy
        let mut stale = ward.clone();
        stale.allocate(1).unwrap();
        assert!(matches!(
            db.update_resource(&stale, 10, &audit(ward.id)).await,
            Err(DBError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_category_filter_and_check_constraint() {
        let db = Database::in_memory().await.unwrap();
        let admin = fixtures::stored_user(&db, Role::Admin, "admin").await;
        let audit = |id| AuditEntry::new(admin.id, AuditAction::Create, EntityType::Resource, id, json!({}));

        let ward = beds("Ward bed", 30);
        let mut oxygen = beds("Oxygen cylinder", 12);
        oxygen.category = ResourceCategory::Equipment;
        db.insert_resource(&ward, &audit(ward.id)).await.unwrap();
        db.insert_resource(&oxygen, &audit(oxygen.id)).await.unwrap();

        let only_beds = db.list_resources(Some(ResourceCategory::Bed)).await.unwrap();
        assert_eq!(only_beds.len(), 1);
        assert_eq!(only_beds[0].name, "Ward bed");
        assert_eq!(db.list_resources(None).await.unwrap().len(), 2);

        let mut broken = beds("Broken bed", 1);
        broken.available_quantity = 5;
        assert!(matches!(
            db.insert_resource(&broken, &audit(broken.id)).await,
            Err(DBError::Conflict(_))
        ));

        let duplicate = beds("Ward bed", 3);
        assert!(matches!(
            db.insert_resource(&duplicate, &audit(duplicate.id)).await,
            Err(DBError::Conflict(_))
        ));
    }
}
