use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_transition, parse_col, DBError, Database};
use crate::models::{AuditEntry, EntityType, PatientID, TriageEntry, TriageID, TriageStatus, Vitals};

fn opt_u16(row: &SqliteRow, column: &str) -> Result<Option<u16>, sqlx::Error> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(|v| u16::try_from(v).map_err(|e| super::decode_error(column, e)))
        .transpose()
}

fn opt_u8(row: &SqliteRow, column: &str) -> Result<Option<u8>, sqlx::Error> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(|v| u8::try_from(v).map_err(|e| super::decode_error(column, e)))
        .transpose()
}

impl FromRow<'_, SqliteRow> for TriageEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(TriageEntry {
            id: parse_col(row, "id")?,
            patient_id: parse_col(row, "patient_id")?,
            level: parse_col(row, "level")?,
            status: parse_col(row, "status")?,
            chief_complaint: row.try_get("chief_complaint")?,
            vitals: Vitals {
                heart_rate: opt_u16(row, "heart_rate")?,
                systolic_bp: opt_u16(row, "systolic_bp")?,
                diastolic_bp: opt_u16(row, "diastolic_bp")?,
                temperature: row.try_get("temperature")?,
                respiratory_rate: opt_u16(row, "respiratory_rate")?,
                oxygen_saturation: opt_u8(row, "oxygen_saturation")?,
                pain_score: opt_u8(row, "pain_score")?,
            },
            notes: row.try_get("notes")?,
            assessed_by: parse_col(row, "assessed_by")?,
            arrived_at: row.try_get("arrived_at")?,
            treatment_started_at: row.try_get("treatment_started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

const ACTIVE_STATUSES: &str = "('WAITING', 'IN_TREATMENT')";

impl Database {
    pub async fn get_triage(&self, id: TriageID) -> Result<TriageEntry, DBError> {
        sqlx::query_as::<_, TriageEntry>("SELECT * FROM triage_entries WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::TriageEntry, id))
    }

    /// Entries still waiting or in treatment
    pub async fn list_active_triage(&self) -> Result<Vec<TriageEntry>, DBError> {
        Ok(sqlx::query_as::<_, TriageEntry>(&format!(
            "SELECT * FROM triage_entries WHERE status IN {ACTIVE_STATUSES} ORDER BY arrived_at"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn active_triage_for_patient(
        &self,
        patient_id: PatientID,
    ) -> Result<Option<TriageEntry>, DBError> {
        Ok(sqlx::query_as::<_, TriageEntry>(&format!(
            "SELECT * FROM triage_entries WHERE patient_id = ?1 AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(patient_id.to_string())
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Fails with `Conflict` when the patient already has an active entry
    pub async fn insert_triage(&self, entry: &TriageEntry, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;

        let vitals = &entry.vitals;
        let inserted = sqlx::query(
            r#"
            INSERT INTO triage_entries (
                id, patient_id, level, status, chief_complaint, heart_rate, systolic_bp,
                diastolic_bp, temperature, respiratory_rate, oxygen_saturation, pain_score,
                notes, assessed_by, arrived_at, treatment_started_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.patient_id.to_string())
        .bind(entry.level.as_ref())
        .bind(entry.status.as_ref())
        .bind(&entry.chief_complaint)
        .bind(vitals.heart_rate)
        .bind(vitals.systolic_bp)
        .bind(vitals.diastolic_bp)
        .bind(vitals.temperature)
        .bind(vitals.respiratory_rate)
        .bind(vitals.oxygen_saturation)
        .bind(vitals.pain_score)
        .bind(&entry.notes)
        .bind(entry.assessed_by.to_string())
        .bind(entry.arrived_at)
        .bind(entry.treatment_started_at)
        .bind(entry.completed_at)
        .execute(&mut *tx)
        .await;

        // idx_triage_one_active
        if let Err(e) = &inserted {
            if e.as_database_error().is_some_and(|e| e.is_unique_violation()) {
                return Err(DBError::Conflict(format!(
                    "patient {} already has an active triage entry",
                    entry.patient_id
                )));
            }
        }
        inserted?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Stores a status change made on `entry`, provided the row still has
    /// the status `previous`
    pub async fn update_triage_status(
        &self,
        entry: &TriageEntry,
        previous: TriageStatus,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE triage_entries
            SET status = ?2, treatment_started_at = ?3, completed_at = ?4, notes = ?5
            WHERE id = ?1 AND status = ?6
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.status.as_ref())
        .bind(entry.treatment_started_at)
        .bind(entry.completed_at)
        .bind(&entry.notes)
        .bind(previous.as_ref())
        .execute(&mut *tx)
        .await?;
        expect_transition(
            &mut *tx,
            result.rows_affected(),
            "triage_entries",
            EntityType::TriageEntry,
            entry.id,
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
    async fn test_one_active_entry_per_patient() {
        let db = Database::in_memory().await.unwrap();
        let nurse = fixtures::stored_user(&db, Role::Nurse, "nurse").await;
        let patient = fixtures::stored_patient(&db, &nurse, "Amani", "Otieno").await;

        let first = fixtures::stored_triage(&db, &nurse, &patient).await;
        let second = fixtures::triage(&nurse, &patient, TriageLevel::Urgent);
        let audit = AuditEntry::new(nurse.id, AuditAction::Create, EntityType::TriageEntry, second.id, json!({}));
        assert!(matches!(
            db.insert_triage(&second, &audit).await,
            Err(DBError::Conflict(_))
        ));

        // Once the first visit is over a new one may start
        let mut done = first.clone();
        done.status = TriageStatus::LeftWithoutBeingSeen;
        done.completed_at = Some(timestamp_now());
        let audit = AuditEntry::new(nurse.id, AuditAction::StatusChange, EntityType::TriageEntry, done.id, json!({}));
        db.update_triage_status(&done, TriageStatus::Waiting, &audit).await.unwrap();

        let audit = AuditEntry::new(nurse.id, AuditAction::Create, EntityType::TriageEntry, second.id, json!({}));
        db.insert_triage(&second, &audit).await.unwrap();

        let active = db.active_triage_for_patient(patient.id).await.unwrap();
        assert_eq!(active.map(|e| e.id), Some(second.id));
        assert_eq!(db.list_active_triage().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vitals_are_stored() {
        let db = Database::in_memory().await.unwrap();
        let nurse = fixtures::stored_user(&db, Role::Nurse, "nurse").await;
        let patient = fixtures::stored_patient(&db, &nurse, "Amani", "Otieno").await;

        let mut entry = fixtures::triage(&nurse, &patient, TriageLevel::Immediate);
        entry.vitals = Vitals {
            heart_rate: Some(135),
            systolic_bp: Some(85),
            diastolic_bp: Some(50),
            temperature: Some(38.4),
            respiratory_rate: Some(32),
            oxygen_saturation: Some(88),
            pain_score: Some(7),
        };
        let audit = AuditEntry::new(nurse.id, AuditAction::Create, EntityType::TriageEntry, entry.id, json!({}));
        db.insert_triage(&entry, &audit).await.unwrap();

        let stored = db.get_triage(entry.id).await.unwrap();
        assert_eq!(stored.vitals, entry.vitals);
        assert_eq!(stored.level, TriageLevel::Immediate);
        assert_eq!(stored.arrived_at, entry.arrived_at);
    }

    #[tokio::test]
    async fn test_stale_status_update_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let nurse = fixtures::stored_user(&db, Role::Nurse, "nurse").await;
        let patient = fixtures::stored_patient(&db, &nurse, "Amani", "Otieno").await;
        let entry = fixtures::stored_triage(&db, &nurse, &patient).await;

        let mut completed = entry.clone();
        completed.status = TriageStatus::Completed;
        let audit = AuditEntry::new(nurse.id, AuditAction::StatusChange, EntityType::TriageEntry, entry.id, json!({}));
        assert!(matches!(
            db.update_triage_status(&completed, TriageStatus::InTreatment, &audit).await,
            Err(DBError::Conflict(_))
        ));
        assert_eq!(db.get_triage(entry.id).await.unwrap().status, TriageStatus::Waiting);

        let unknown = fixtures::triage(&nurse, &patient, TriageLevel::NonUrgent);
        assert!(matches!(
            db.update_triage_status(&unknown, TriageStatus::Waiting, &audit).await,
            Err(DBError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_schema_allows_one_active_entry() {
        let db = Database::in_memory().await.unwrap();
        let nurse = fixtures::stored_user(&db, Role::Nurse, "nurse").await;
        let patient = fixtures::stored_patient(&db, &nurse, "Amani", "Otieno").await;
        let first = fixtures::stored_triage(&db, &nurse, &patient).await;

        // Straight to the table
        let insert = |status: TriageStatus| {
            sqlx::query(
                r#"
                INSERT INTO triage_entries (
                    id, patient_id, level, status, chief_complaint, assessed_by, arrived_at
                )
                VALUES (?1, ?2, 'URGENT', ?3, 'Fever', ?4, ?5)
                "#,
            )
            .bind(TriageID::new().to_string())
            .bind(patient.id.to_string())
            .bind(status.as_ref().to_owned())
            .bind(nurse.id.to_string())
            .bind(timestamp_now())
        };

        let second = insert(TriageStatus::InTreatment).execute(db.pool()).await;
        assert!(matches!(second.map_err(DBError::from), Err(DBError::Conflict(_))));

        // Closed visits do not count
        insert(TriageStatus::Completed).execute(db.pool()).await.unwrap();
        assert_eq!(
            db.active_triage_for_patient(patient.id).await.unwrap().map(|e| e.id),
            Some(first.id)
        );
    }
}
