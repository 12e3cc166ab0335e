use serde::Deserialize;
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{
    expect_one, like_pattern, opt_str, parse_col, parse_opt_col, validated_opt_col, DBError,
    Database,
};
use crate::models::{AuditEntry, EntityType, Page, Patient, PatientID};

/// Free text search over names, phone, national id and SHA number
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientSearch {
    pub q: Option<String>,
}

impl PatientSearch {
    fn term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

impl FromRow<'_, SqliteRow> for Patient {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Patient {
            id: parse_col(row, "id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            date_of_birth: row.try_get("date_of_birth")?,
            gender: parse_col(row, "gender")?,
            phone: validated_opt_col(row, "phone")?,
            national_id: validated_opt_col(row, "national_id")?,
            sha_number: validated_opt_col(row, "sha_number")?,
            blood_type: parse_opt_col(row, "blood_type")?,
            allergies: row.try_get("allergies")?,
            emergency_contact: row.try_get("emergency_contact")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Database {
    pub async fn get_patient(&self, id: PatientID) -> Result<Patient, DBError> {
        sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Patient, id))
    }

    /// Sorted by last then first name
    pub async fn search_patients(
        &self,
        search: &PatientSearch,
        page: Page,
    ) -> Result<Vec<Patient>, DBError> {
        let pattern = search.term().map(like_pattern);

        Ok(sqlx::query_as::<_, Patient>(
            r#"
            SELECT * FROM patients
            WHERE ?1 IS NULL
               OR first_name LIKE ?1 ESCAPE '\'
               OR last_name LIKE ?1 ESCAPE '\'
               OR (first_name || ' ' || last_name) LIKE ?1 ESCAPE '\'
               OR phone LIKE ?1 ESCAPE '\'
               OR national_id LIKE ?1 ESCAPE '\'
               OR sha_number LIKE ?1 ESCAPE '\'
            ORDER BY last_name, first_name, id
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(pattern)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert_patient(&self, patient: &Patient, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO patients (
                id, first_name, last_name, date_of_birth, gender, phone, national_id,
                sha_number, blood_type, allergies, emergency_contact, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(patient.id.to_string())
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(patient.date_of_birth)
        .bind(patient.gender.as_ref())
        .bind(opt_str(&patient.phone))
        .bind(opt_str(&patient.national_id))
        .bind(opt_str(&patient.sha_number))
        .bind(opt_str(&patient.blood_type))
        .bind(&patient.allergies)
        .bind(&patient.emergency_contact)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Overwrites every editable column
    pub async fn update_patient(&self, patient: &Patient, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE patients
            SET first_name = ?2, last_name = ?3, date_of_birth = ?4, gender = ?5, phone = ?6,
                national_id = ?7, sha_number = ?8, blood_type = ?9, allergies = ?10,
                emergency_contact = ?11, updated_at = ?12
            WHERE id = ?1
            "#,
        )
        .bind(patient.id.to_string())
        .bind(&patient.first_name)
        .bind(&patient.last_name)
        .bind(patient.date_of_birth)
        .bind(patient.gender.as_ref())
        .bind(opt_str(&patient.phone))
        .bind(opt_str(&patient.national_id))
        .bind(opt_str(&patient.sha_number))
        .bind(opt_str(&patient.blood_type))
        .bind(&patient.allergies)
        .bind(&patient.emergency_contact)
        .bind(patient.updated_at)
        .execute(&mut *tx)
        .await?;
        expect_one(result.rows_affected(), EntityType::Patient, patient.id)?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Fails with `Conflict` while other records still point at the patient
    pub async fn delete_patient(&self, id: PatientID, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("DELETE FROM patients WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        expect_one(result.rows_affected(), EntityType::Patient, id)?;

        Self::commit_with_audit(tx, audit).await
    }
}
