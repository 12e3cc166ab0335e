use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_transition, opt_id, opt_str, parse_col, parse_opt_col, DBError, Database};
use crate::models::{AuditEntry, EntityType, Transfer, TransferID, TransferStatus};

impl FromRow<'_, SqliteRow> for Transfer {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Transfer {
            id: parse_col(row, "id")?,
            patient_id: parse_col(row, "patient_id")?,
            from_facility: row.try_get("from_facility")?,
            to_facility: row.try_get("to_facility")?,
            reason: row.try_get("reason")?,
            urgency: parse_col(row, "urgency")?,
            status: parse_col(row, "status")?,
            ambulance_id: parse_opt_col(row, "ambulance_id")?,
            requested_by: parse_col(row, "requested_by")?,
            requested_at: row.try_get("requested_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Database {
    pub async fn get_transfer(&self, id: TransferID) -> Result<Transfer, DBError> {
        sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Transfer, id))
    }

    /// Most urgent first, then oldest
    pub async fn list_transfers(
        &self,
        status: Option<TransferStatus>,
    ) -> Result<Vec<Transfer>, DBError> {
        Ok(sqlx::query_as::<_, Transfer>(
            r#"
            SELECT * FROM transfers
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY CASE urgency
                WHEN 'IMMEDIATE' THEN 1 WHEN 'URGENT' THEN 2 WHEN 'LESS_URGENT' THEN 3 ELSE 4
            END, requested_at
            "#,
        )
        .bind(opt_str(&status))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_transfers(&self, status: TransferStatus) -> Result<i64, DBError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM transfers WHERE status = ?1")
            .bind(status.as_ref())
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn insert_transfer(&self, transfer: &Transfer, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO transfers (
                id, patient_id, from_facility, to_facility, reason, urgency, status,
                ambulance_id, requested_by, requested_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(transfer.id.to_string())
        .bind(transfer.patient_id.to_string())
        .bind(&transfer.from_facility)
        .bind(&transfer.to_facility)
        .bind(&transfer.reason)
        .bind(transfer.urgency.as_ref())
        .bind(transfer.status.as_ref())
        .bind(opt_id(&transfer.ambulance_id))
        .bind(transfer.requested_by.to_string())
        .bind(transfer.requested_at)
        .bind(transfer.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn update_transfer_status(
        &self,
        transfer: &Transfer,
        previous: TransferStatus,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE transfers SET status = ?2, ambulance_id = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(transfer.id.to_string())
        .bind(transfer.status.as_ref())
        .bind(opt_id(&transfer.ambulance_id))
        .bind(transfer.updated_at)
        .bind(previous.as_ref())
        .execute(&mut *tx)
        .await?;
        expect_transition(
            &mut *tx,
            result.rows_affected(),
            "transfers",
            EntityType::Transfer,
            transfer.id,
        )
        .await?;

        Self::commit_with_audit(tx, audit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::models::{timestamp_now, AuditAction, Role, TriageLevel};
    use serde_json::json;

    #[tokio::test]
    async fn test_transfer_listing_and_update() {
        let db = Database::in_memory().await.unwrap();
        let doctor = fixtures::stored_user(&db, Role::Doctor, "doctor").await;
        let patient = fixtures::stored_patient(&db, &doctor, "Amani", "Otieno").await;
        let audit = |id: TransferID| {
            AuditEntry::new(doctor.id, AuditAction::StatusChange, EntityType::Transfer, id, json!({}))
        };

        let transfer = |urgency| Transfer {
            id: TransferID::new(),
            patient_id: patient.id,
            from_facility: "Thika Level 5".to_string(),
            to_facility: "Kenyatta National Hospital".to_string(),
            reason: "Neurosurgical review".to_string(),
            urgency,
            status: TransferStatus::Requested,
            ambulance_id: None,
            requested_by: doctor.id,
            requested_at: timestamp_now(),
            updated_at: timestamp_now(),
        };

        let routine = transfer(TriageLevel::NonUrgent);
        let critical = transfer(TriageLevel::Immediate);
        db.insert_transfer(&routine, &audit(routine.id)).await.unwrap();
        db.insert_transfer(&critical, &audit(critical.id)).await.unwrap();

        let listed = db.list_transfers(None).await.unwrap();
        assert_eq!(listed[0].id, critical.id);
        assert_eq!(db.count_transfers(TransferStatus::Requested).await.unwrap(), 2);

        let mut approved = critical.clone();
        approved.status = TransferStatus::Approved;
        db.update_transfer_status(&approved, TransferStatus::Requested, &audit(approved.id))
            .await
            .unwrap();

        let pending = db.list_transfers(Some(TransferStatus::Requested)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, routine.id);
        assert_eq!(db.get_transfer(critical.id).await.unwrap().status, TransferStatus::Approved);
    }
}
