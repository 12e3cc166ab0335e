use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{expect_one, parse_col, validated_col, DBError, Database};
use crate::models::{AuditEntry, EntityType, Role, UserData, UserID};
use crate::utils::input_validation::Username;

impl FromRow<'_, SqliteRow> for UserData {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(UserData {
            id: parse_col(row, "id")?,
            username: validated_col(row, "username")?,
            full_name: row.try_get("full_name")?,
            role: parse_col(row, "role")?,
            password: parse_col(row, "password_hash")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl Database {
    pub async fn get_user(&self, id: UserID) -> Result<UserData, DBError> {
        sqlx::query_as::<_, UserData>("SELECT * FROM users WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::User, id))
    }

    pub async fn lookup_username(&self, username: &Username) -> Result<Option<UserData>, DBError> {
        Ok(
            sqlx::query_as::<_, UserData>("SELECT * FROM users WHERE username = ?1")
                .bind(username.as_ref())
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn count_users(&self) -> Result<i64, DBError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserData>, DBError> {
        Ok(
            sqlx::query_as::<_, UserData>("SELECT * FROM users ORDER BY username")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn insert_user(&self, user: &UserData, audit: &AuditEntry) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO users (id, username, full_name, role, password_hash, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(user.id.to_string())
        .bind(user.username.as_ref())
        .bind(&user.full_name)
        .bind(user.role.as_ref())
        .bind(user.password.as_str())
        .bind(user.active)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn update_user_role(
        &self,
        id: UserID,
        role: Role,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
            .bind(role.as_ref())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        expect_one(result.rows_affected(), EntityType::User, id)?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn set_user_active(
        &self,
        id: UserID,
        active: bool,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("UPDATE users SET active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        expect_one(result.rows_affected(), EntityType::User, id)?;

        Self::commit_with_audit(tx, audit).await
    }
}
