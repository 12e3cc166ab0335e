use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_transition, opt_id, parse_col, DBError, Database};
use crate::models::{
    AuditEntry, ConsultationID, ConsultationStatus, EntityType, Teleconsultation, UserID,
};

impl FromRow<'_, SqliteRow> for Teleconsultation {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Teleconsultation {
            id: parse_col(row, "id")?,
            patient_id: parse_col(row, "patient_id")?,
            doctor_id: parse_col(row, "doctor_id")?,
            scheduled_at: row.try_get("scheduled_at")?,
            duration_minutes: row.try_get("duration_minutes")?,
            status: parse_col(row, "status")?,
            meeting_link: row.try_get("meeting_link")?,
            reason: row.try_get("reason")?,
            notes: row.try_get("notes")?,
            created_by: parse_col(row, "created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Database {
    pub async fn get_consultation(&self, id: ConsultationID) -> Result<Teleconsultation, DBError> {
        sqlx::query_as::<_, Teleconsultation>("SELECT * FROM teleconsultations WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Teleconsultation, id))
    }

    /// Scheduled or running sessions that have not ended by `after`
    pub async fn list_upcoming_consultations(
        &self,
        doctor_id: Option<UserID>,
        after: DateTime<Utc>,
    ) -> Result<Vec<Teleconsultation>, DBError> {
        Ok(sqlx::query_as::<_, Teleconsultation>(
            r#"
            SELECT * FROM teleconsultations
            WHERE status IN ('SCHEDULED', 'IN_PROGRESS')
              AND ends_at > ?1
              AND (?2 IS NULL OR doctor_id = ?2)
            ORDER BY scheduled_at
            "#,
        )
        .bind(after)
        .bind(opt_id(&doctor_id))
        .fetch_all(&self.pool)
        .await?)
    }

    /// Fails with `Conflict` when the doctor has another session in the slot
    pub async fn insert_consultation(
        &self,
        session: &Teleconsultation,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;

        let clashes: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM teleconsultations
            WHERE doctor_id = ?1 AND status != 'CANCELLED'
              AND scheduled_at < ?3 AND ?2 < ends_at
            "#,
        )
        .bind(session.doctor_id.to_string())
        .bind(session.scheduled_at)
        .bind(session.ends_at())
        .fetch_one(&mut *tx)
        .await?;
        if clashes > 0 {
            return Err(DBError::Conflict(format!(
                "doctor {} already has a session in this slot",
                session.doctor_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO teleconsultations (
                id, patient_id, doctor_id, scheduled_at, ends_at, duration_minutes, status,
                meeting_link, reason, notes, created_by, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.patient_id.to_string())
        .bind(session.doctor_id.to_string())
        .bind(session.scheduled_at)
        .bind(session.ends_at())
        .bind(session.duration_minutes)
        .bind(session.status.as_ref())
        .bind(&session.meeting_link)
        .bind(&session.reason)
        .bind(&session.notes)
        .bind(session.created_by.to_string())
        .bind(session.created_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn update_consultation_status(
        &self,
        session: &Teleconsultation,
        previous: ConsultationStatus,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            "UPDATE teleconsultations SET status = ?2, notes = ?3 WHERE id = ?1 AND status = ?4",
        )
        .bind(session.id.to_string())
        .bind(session.status.as_ref())
        .bind(&session.notes)
        .bind(previous.as_ref())
        .execute(&mut *tx)
        .await?;
        expect_transition(
            &mut *tx,
            result.rows_affected(),
            "teleconsultations",
            EntityType::Teleconsultation,
            session.id,
        )
        .await?;

        Self::commit_with_audit(tx, audit).await
    }
}
