use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_transition, opt_str, parse_col, validated_col, DBError, Database};
use crate::models::{AuditEntry, ClaimID, ClaimStatus, ClaimTotals, EntityType, ShaClaim};

impl FromRow<'_, SqliteRow> for ShaClaim {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ShaClaim {
            id: parse_col(row, "id")?,
            reference: row.try_get("reference")?,
            patient_id: parse_col(row, "patient_id")?,
            sha_number: validated_col(row, "sha_number")?,
            service_description: row.try_get("service_description")?,
            diagnosis_code: validated_col(row, "diagnosis_code")?,
            amount_cents: row.try_get("amount_cents")?,
            status: parse_col(row, "status")?,
            rejection_reason: row.try_get("rejection_reason")?,
            created_by: parse_col(row, "created_by")?,
            created_at: row.try_get("created_at")?,
            submitted_at: row.try_get("submitted_at")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

fn is_reference_taken(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.is_unique_violation() && e.message().contains("sha_claims.reference"))
}

impl Database {
    pub async fn get_claim(&self, id: ClaimID) -> Result<ShaClaim, DBError> {
        sqlx::query_as::<_, ShaClaim>("SELECT * FROM sha_claims WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::ShaClaim, id))
    }

    /// Newest first
    pub async fn list_claims(&self, status: Option<ClaimStatus>) -> Result<Vec<ShaClaim>, DBError> {
        Ok(sqlx::query_as::<_, ShaClaim>(
            r#"
            SELECT * FROM sha_claims
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(opt_str(&status))
        .fetch_all(&self.pool)
        .await?)
    }

    /// Count and value per status. Statuses without claims are absent.
    pub async fn claim_totals(&self) -> Result<BTreeMap<ClaimStatus, ClaimTotals>, DBError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count, COALESCE(SUM(amount_cents), 0) AS amount
            FROM sha_claims
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: ClaimStatus = parse_col(row, "status")?;
                let count: i64 = row.try_get("count")?;
                let totals = ClaimTotals {
                    count: count.max(0) as u64,
                    amount_cents: row.try_get("amount")?,
                };
                Ok((status, totals))
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(DBError::from)
    }

    /// Returns `false`, writing nothing, when the reference is already taken
    pub async fn insert_claim(&self, claim: &ShaClaim, audit: &AuditEntry) -> Result<bool, DBError> {
        let mut tx = self.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO sha_claims (
                id, reference, patient_id, sha_number, service_description, diagnosis_code,
                amount_cents, status, rejection_reason, created_by, created_at, submitted_at,
                decided_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(claim.id.to_string())
        .bind(&claim.reference)
        .bind(claim.patient_id.to_string())
        .bind(claim.sha_number.as_ref())
        .bind(&claim.service_description)
        .bind(claim.diagnosis_code.as_ref())
        .bind(claim.amount_cents)
        .bind(claim.status.as_ref())
        .bind(&claim.rejection_reason)
        .bind(claim.created_by.to_string())
        .bind(claim.created_at)
        .bind(claim.submitted_at)
        .bind(claim.decided_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = &inserted {
            if is_reference_taken(e) {
                return Ok(false);
            }
        }
        inserted?;

        Self::commit_with_audit(tx, audit).await?;
        Ok(true)
    }

    pub async fn update_claim_status(
        &self,
        claim: &ShaClaim,
        previous: ClaimStatus,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE sha_claims
            SET status = ?2, rejection_reason = ?3, submitted_at = ?4, decided_at = ?5
            WHERE id = ?1 AND status = ?6
            "#,
        )
        .bind(claim.id.to_string())
        .bind(claim.status.as_ref())
        .bind(&claim.rejection_reason)
        .bind(claim.submitted_at)
        .bind(claim.decided_at)
        .bind(previous.as_ref())
        .execute(&mut *tx)
        .await?;
        expect_transition(
            &mut *tx,
            result.rows_affected(),
            "sha_claims",
            EntityType::ShaClaim,
            claim.id,
        )
        .await?;

        Self::commit_with_audit(tx, audit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::models::{timestamp_now, AuditAction, Role};
    use crate::utils::input_validation::{DiagnosisCode, ShaNumber};
    use serde_json::json;

    #[tokio::test]
    async fn test_claim_totals_per_status() {
        let db = Database::in_memory().await.unwrap();
        let doctor = fixtures::stored_user(&db, Role::Doctor, "doctor").await;
        let patient = fixtures::stored_patient(&db, &doctor, "Amani", "Otieno").await;

        let claim = |amount_cents, status| {
            let id = ClaimID::new();
            let created_at = timestamp_now();
            ShaClaim {
                id,
                reference: ShaClaim::reference_for(&id, created_at),
                patient_id: patient.id,
                sha_number: ShaNumber::try_from("SHA-0042-17").unwrap(),
                service_description: "Outpatient consultation".to_string(),
                diagnosis_code: DiagnosisCode::try_from("j18.9").unwrap(),
                amount_cents,
                status,
                rejection_reason: None,
                created_by: doctor.id,
                created_at,
                submitted_at: None,
                decided_at: None,
            }
        };

        let claims = [
            claim(150_000, ClaimStatus::Draft),
            claim(250_000, ClaimStatus::Submitted),
            claim(100_000, ClaimStatus::Submitted),
        ];
        for c in &claims {
            let audit = AuditEntry::new(doctor.id, AuditAction::Create, EntityType::ShaClaim, c.id, json!({}));
            assert!(db.insert_claim(c, &audit).await.unwrap());
        }

        let totals = db.claim_totals().await.unwrap();
        assert_eq!(
            totals.get(&ClaimStatus::Submitted),
            Some(&ClaimTotals { count: 2, amount_cents: 350_000 })
        );
        assert_eq!(totals.get(&ClaimStatus::Draft).map(|t| t.count), Some(1));
        assert!(!totals.contains_key(&ClaimStatus::Paid));

        let stored = db.get_claim(claims[0].id).await.unwrap();
        assert_eq!(stored.diagnosis_code.as_ref(), "J18.9");
        assert!(stored.reference.starts_with("SHA-"));
        assert_eq!(db.list_claims(Some(ClaimStatus::Submitted)).await.unwrap().len(), 2);

        let zero = claim(0, ClaimStatus::Draft);
        let audit = AuditEntry::new(doctor.id, AuditAction::Create, EntityType::ShaClaim, zero.id, json!({}));
        assert!(matches!(db.insert_claim(&zero, &audit).await, Err(DBError::Conflict(_))));

        let huge = claim(ShaClaim::MAX_AMOUNT_CENTS + 1, ClaimStatus::Draft);
        let audit = AuditEntry::new(doctor.id, AuditAction::Create, EntityType::ShaClaim, huge.id, json!({}));
        assert!(matches!(db.insert_claim(&huge, &audit).await, Err(DBError::Conflict(_))));

        // A reference already in use is reported, not raised
        let mut twin = claim(50_000, ClaimStatus::Draft);
        twin.reference = claims[0].reference.clone();
        let audit = AuditEntry::new(doctor.id, AuditAction::Create, EntityType::ShaClaim, twin.id, json!({}));
        assert!(!db.insert_claim(&twin, &audit).await.unwrap());
        assert!(matches!(db.get_claim(twin.id).await, Err(DBError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_totals_at_the_amount_cap() {
        let db = Database::in_memory().await.unwrap();
        let finance = fixtures::stored_user(&db, Role::FinanceOfficer, "finance").await;
        let patient = fixtures::stored_patient(&db, &finance, "Amani", "Otieno").await;

        for _ in 0..3 {
            let id = ClaimID::new();
            let created_at = timestamp_now();
            let claim = ShaClaim {
                id,
                reference: ShaClaim::reference_for(&id, created_at),
                patient_id: patient.id,
                sha_number: ShaNumber::try_from("SHA-0042-17").unwrap(),
                service_description: "Kidney transplant".to_string(),
                diagnosis_code: DiagnosisCode::try_from("N18.6").unwrap(),
                amount_cents: ShaClaim::MAX_AMOUNT_CENTS,
                status: ClaimStatus::Submitted,
                rejection_reason: None,
                created_by: finance.id,
                created_at,
                submitted_at: Some(created_at),
                decided_at: None,
            };
            let audit = AuditEntry::new(finance.id, AuditAction::Create, EntityType::ShaClaim, id, json!({}));
            assert!(db.insert_claim(&claim, &audit).await.unwrap());
        }

        let totals = db.claim_totals().await.unwrap();
        assert_eq!(
            totals.get(&ClaimStatus::Submitted),
            Some(&ClaimTotals { count: 3, amount_cents: 3 * ShaClaim::MAX_AMOUNT_CENTS })
        );
    }
}
