use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_one, opt_id, opt_str, parse_col, parse_opt_col, validated_opt_col, DBError, Database};
use crate::models::{AuditEntry, EntityType, OnDuty, Shift, ShiftID, StaffID, StaffMember};

impl FromRow<'_, SqliteRow> for StaffMember {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StaffMember {
            id: parse_col(row, "id")?,
            user_id: parse_opt_col(row, "user_id")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            cadre: parse_col(row, "cadre")?,
            department: row.try_get("department")?,
            phone: validated_opt_col(row, "phone")?,
            license_number: row.try_get("license_number")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Shift {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Shift {
            id: parse_col(row, "id")?,
            staff_id: parse_col(row, "staff_id")?,
            department: row.try_get("department")?,
            kind: parse_col(row, "kind")?,
            starts_at: row.try_get("starts_at")?,
            ends_at: row.try_get("ends_at")?,
            created_by: parse_col(row, "created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Database {
    pub async fn get_staff(&self, id: StaffID) -> Result<StaffMember, DBError> {
        sqlx::query_as::<_, StaffMember>("SELECT * FROM staff WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::StaffMember, id))
    }

    pub async fn list_staff(&self, department: Option<&str>) -> Result<Vec<StaffMember>, DBError> {
        Ok(sqlx::query_as::<_, StaffMember>(
            r#"
            SELECT * FROM staff
            WHERE (?1 IS NULL OR department = ?1 COLLATE NOCASE)
            ORDER BY last_name, first_name
            "#,
        )
        .bind(department)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert_staff(&self, member: &StaffMember, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO staff (
                id, user_id, first_name, last_name, cadre, department, phone, license_number,
                active, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(member.id.to_string())
        .bind(opt_id(&member.user_id))
        .bind(&member.first_name)
        .bind(&member.last_name)
        .bind(member.cadre.as_ref())
        .bind(&member.department)
        .bind(opt_str(&member.phone))
        .bind(&member.license_number)
        .bind(member.active)
        .bind(member.created_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn set_staff_active(
        &self,
        id: StaffID,
        active: bool,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("UPDATE staff SET active = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(active)
            .execute(&mut *tx)
            .await?;
        expect_one(result.rows_affected(), EntityType::StaffMember, id)?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn get_shift(&self, id: ShiftID) -> Result<Shift, DBError> {
        sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Shift, id))
    }

    /// Shifts overlapping `[from, to)`, earliest first
    pub async fn list_shifts(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Shift>, DBError> {
        Ok(sqlx::query_as::<_, Shift>(
            r#"
            SELECT * FROM shifts
            WHERE starts_at < ?2 AND ?1 < ends_at
            ORDER BY starts_at, department
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Fails with `Conflict` when the staff member already works part of the window
    pub async fn insert_shift(&self, shift: &Shift, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;

        let overlapping: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shifts WHERE staff_id = ?1 AND starts_at < ?3 AND ?2 < ends_at",
        )
        .bind(shift.staff_id.to_string())
        .bind(shift.starts_at)
        .bind(shift.ends_at)
        .fetch_one(&mut *tx)
        .await?;
        if overlapping > 0 {
            return Err(DBError::Conflict(format!(
                "staff member {} already has a shift in this window",
                shift.staff_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO shifts (id, staff_id, department, kind, starts_at, ends_at, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(shift.id.to_string())
        .bind(shift.staff_id.to_string())
        .bind(&shift.department)
        .bind(shift.kind.as_ref())
        .bind(shift.starts_at)
        .bind(shift.ends_at)
        .bind(shift.created_by.to_string())
        .bind(shift.created_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn delete_shift(&self, id: ShiftID, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("DELETE FROM shifts WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        expect_one(result.rows_affected(), EntityType::Shift, id)?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Active staff with a shift covering `at`
    pub async fn on_duty(&self, at: DateTime<Utc>) -> Result<Vec<OnDuty>, DBError> {
        let shifts = sqlx::query_as::<_, Shift>(
            r#"
            SELECT s.* FROM shifts s
            JOIN staff m ON m.id = s.staff_id
            WHERE m.active = 1 AND s.starts_at <= ?1 AND ?1 < s.ends_at
            ORDER BY s.department, s.starts_at
            "#,
        )
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        let members: HashMap<StaffID, StaffMember> = sqlx::query_as::<_, StaffMember>(
            r#"
            SELECT * FROM staff
            WHERE active = 1 AND id IN (
                SELECT staff_id FROM shifts WHERE starts_at <= ?1 AND ?1 < ends_at
            )
            "#,
        )
        .bind(at)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|member| (member.id, member))
        .collect();

        Ok(shifts
            .into_iter()
            .filter_map(|shift| {
                members.get(&shift.staff_id).map(|staff| OnDuty {
                    staff: staff.clone(),
                    shift,
                })
            })
            .collect())
    }
}
