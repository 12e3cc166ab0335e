use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_one, expect_transition, opt_id, opt_str, parse_col, parse_opt_col, DBError, Database};
use crate::models::{
    AuditEntry, EntityType, SupplyRequest, SupplyRequestID, SupplyRequestStatus,
};

impl FromRow<'_, SqliteRow> for SupplyRequest {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(SupplyRequest {
            id: parse_col(row, "id")?,
            resource_id: parse_opt_col(row, "resource_id")?,
            item_name: row.try_get("item_name")?,
            quantity: row.try_get("quantity")?,
            unit_cost_cents: row.try_get("unit_cost_cents")?,
            supplier: row.try_get("supplier")?,
            justification: row.try_get("justification")?,
            status: parse_col(row, "status")?,
            requested_by: parse_col(row, "requested_by")?,
            reviewed_by: parse_opt_col(row, "reviewed_by")?,
            review_note: row.try_get("review_note")?,
            created_at: row.try_get("created_at")?,
            reviewed_at: row.try_get("reviewed_at")?,
            fulfilled_at: row.try_get("fulfilled_at")?,
        })
    }
}

impl Database {
    pub async fn get_supply_request(&self, id: SupplyRequestID) -> Result<SupplyRequest, DBError> {
        sqlx::query_as::<_, SupplyRequest>("SELECT * FROM supply_requests WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::SupplyRequest, id))
    }

    /// Newest first
    pub async fn list_supply_requests(
        &self,
        status: Option<SupplyRequestStatus>,
    ) -> Result<Vec<SupplyRequest>, DBError> {
        Ok(sqlx::query_as::<_, SupplyRequest>(
            r#"
            SELECT * FROM supply_requests
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(opt_str(&status))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_supply_requests(&self, status: SupplyRequestStatus) -> Result<i64, DBError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM supply_requests WHERE status = ?1")
                .bind(status.as_ref())
                .fetch_one(&self.pool)
                .await?,
        )
    }

    pub async fn insert_supply_request(
        &self,
        request: &SupplyRequest,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO supply_requests (
                id, resource_id, item_name, quantity, unit_cost_cents, supplier, justification,
                status, requested_by, reviewed_by, review_note, created_at, reviewed_at, fulfilled_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(request.id.to_string())
        .bind(opt_id(&request.resource_id))
        .bind(&request.item_name)
        .bind(request.quantity)
        .bind(request.unit_cost_cents)
        .bind(&request.supplier)
        .bind(&request.justification)
        .bind(request.status.as_ref())
        .bind(request.requested_by.to_string())
        .bind(opt_id(&request.reviewed_by))
        .bind(&request.review_note)
        .bind(request.created_at)
        .bind(request.reviewed_at)
        .bind(request.fulfilled_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Stores the review or fulfilment recorded on `request`. Fulfilling a
    /// request linked to an inventory line restocks it in the same transaction.
    pub async fn update_supply_request_status(
        &self,
        request: &SupplyRequest,
        previous: SupplyRequestStatus,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE supply_requests
            SET status = ?2, reviewed_by = ?3, review_note = ?4, reviewed_at = ?5, fulfilled_at = ?6
            WHERE id = ?1 AND status = ?7
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.status.as_ref())
        .bind(opt_id(&request.reviewed_by))
        .bind(&request.review_note)
        .bind(request.reviewed_at)
        .bind(request.fulfilled_at)
        .bind(previous.as_ref())
        .execute(&mut *tx)
        .await?;
        expect_transition(
            &mut *tx,
            result.rows_affected(),
            "supply_requests",
            EntityType::SupplyRequest,
            request.id,
        )
        .await?;

        if let (SupplyRequestStatus::Fulfilled, Some(resource_id)) =
            (request.status, request.resource_id)
        {
            let restocked = sqlx::query(
                r#"
                UPDATE resources
                SET total_quantity = total_quantity + ?2,
                    available_quantity = available_quantity + ?2,
                    updated_at = ?3
                WHERE id = ?1
                "#,
            )
            .bind(resource_id.to_string())
            .bind(request.quantity)
            .bind(request.fulfilled_at.unwrap_or(audit.created_at))
            .execute(&mut *tx)
            .await?;
            expect_one(restocked.rows_affected(), EntityType::Resource, resource_id)?;
        }

        Self::commit_with_audit(tx, audit).await
    }
}
