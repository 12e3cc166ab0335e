//! Relational storage on SQLite.
//!
//! Every mutation takes the [`AuditEntry`] describing it, and the audit
//! row is committed in the same transaction as the change.

use std::{fmt::Display, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqliteConnection, SqlitePool, Transaction,
};
use thiserror::Error;

use crate::models::{AuditEntry, EntityType};

mod audit;
mod claims;
mod dispatch;
mod patients;
mod procurement;
mod resources;
mod staff;
mod telemedicine;
mod transfers;
mod triage;
mod users;

pub use patients::PatientSearch;

#[derive(Debug, Error)]
pub enum DBError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityType, id: String },

    /// Unique, foreign-key or check constraint violation
    #[error("Conflicting record: {0}")]
    Conflict(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl DBError {
    pub fn not_found(entity: EntityType, id: impl Display) -> Self {
        DBError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<sqlx::Error> for DBError {
    fn from(error: sqlx::Error) -> Self {
        if let Some(db_error) = error.as_database_error() {
            if db_error.is_unique_violation()
                || db_error.is_foreign_key_violation()
                || db_error.is_check_violation()
            {
                return DBError::Conflict(db_error.message().to_owned());
            }
        }
        DBError::Sqlx(error)
    }
}

/// Handle on the connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `url` and applies migrations
    pub async fn open(url: &str) -> Result<Self, DBError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        info!("Opening database at {url}");
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        Self::migrate(pool).await
    }

    /// A private in-memory database, kept alive on a single connection
    pub async fn in_memory() -> Result<Self, DBError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, DBError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations completed");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round trip to the database, for health checks
    pub async fn ping(&self) -> Result<(), DBError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>, DBError> {
        Ok(self.pool.begin().await?)
    }

    /// Writes the audit row and commits
    async fn commit_with_audit(
        mut tx: Transaction<'static, Sqlite>,
        entry: &AuditEntry,
    ) -> Result<(), DBError> {
        audit::insert(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Records an event that has no row change of its own (login, logout)
    pub async fn record_event(&self, entry: &AuditEntry) -> Result<(), DBError> {
        let tx = self.begin().await?;
        Self::commit_with_audit(tx, entry).await
    }
}

/// Fails with `NotFound` when an UPDATE or DELETE touched nothing
fn expect_one(
    rows_affected: u64,
    entity: EntityType,
    id: impl Display,
) -> Result<(), DBError> {
    if rows_affected == 0 {
        Err(DBError::not_found(entity, id))
    } else {
        Ok(())
    }
}

/// A status-guarded UPDATE that touched nothing: either the row is gone or
/// its status moved since the caller read it
async fn expect_transition(
    conn: &mut SqliteConnection,
    rows_affected: u64,
    table: &'static str,
    entity: EntityType,
    id: impl Display,
) -> Result<(), DBError> {
    if rows_affected > 0 {
        return Ok(());
    }
    let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"))
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        Err(DBError::Conflict(format!("{entity} {id} changed status concurrently")))
    } else {
        Err(DBError::not_found(entity, id))
    }
}

fn decode_error(column: &str, message: impl Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("column {column}: {message}").into())
}

/// Reads a TEXT column into any type parsed with `FromStr` (ids, enums)
fn parse_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| decode_error(column, e))
}

fn parse_opt_col<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| value.parse().map_err(|e| decode_error(column, e)))
        .transpose()
}

/// Reads a TEXT column into a validated wrapper type
fn validated_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: TryFrom<String>,
    T::Error: Display,
{
    let raw: String = row.try_get(column)?;
    T::try_from(raw).map_err(|e| decode_error(column, e))
}

fn validated_opt_col<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: TryFrom<String>,
    T::Error: Display,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| T::try_from(value).map_err(|e| decode_error(column, e)))
        .transpose()
}

fn opt_str<T: AsRef<str>>(value: &Option<T>) -> Option<&str> {
    value.as_ref().map(AsRef::as_ref)
}

fn opt_id<T: Display>(value: &Option<T>) -> Option<String> {
    value.as_ref().map(ToString::to_string)
}

/// Escapes LIKE wildcards in user supplied search text
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Rows the storage tests build on
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::Database;
    use crate::authorization::test_support::user;
    use crate::models::{
        timestamp_now, AuditAction, AuditEntry, EntityType, Gender, Patient, PatientID, Role,
        TriageEntry, TriageID, TriageLevel, TriageStatus, UserData, Vitals,
    };

    pub async fn stored_user(db: &Database, role: Role, username: &str) -> UserData {
        let account = user(role, username);
        let audit = AuditEntry::new(account.id, AuditAction::Create, EntityType::User, account.id, json!({}));
        db.insert_user(&account, &audit).await.unwrap();
        account
    }

    pub fn patient(first_name: &str, last_name: &str) -> Patient {
        let now = timestamp_now();
        Patient {
            id: PatientID::new(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 12).unwrap(),
            gender: Gender::Female,
            phone: None,
            national_id: None,
            sha_number: None,
            blood_type: None,
            allergies: None,
            emergency_contact: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn stored_patient(
        db: &Database,
        actor: &UserData,
        first_name: &str,
        last_name: &str,
    ) -> Patient {
        let record = patient(first_name, last_name);
        let audit = AuditEntry::new(actor.id, AuditAction::Create, EntityType::Patient, record.id, json!({}));
        db.insert_patient(&record, &audit).await.unwrap();
        record
    }

    pub fn triage(actor: &UserData, patient: &Patient, level: TriageLevel) -> TriageEntry {
        TriageEntry {
            id: TriageID::new(),
            patient_id: patient.id,
            level,
            status: TriageStatus::Waiting,
            chief_complaint: "Chest pain".to_string(),
            vitals: Vitals::default(),
            notes: None,
            assessed_by: actor.id,
            arrived_at: timestamp_now(),
            treatment_started_at: None,
            completed_at: None,
        }
    }

    pub async fn stored_triage(db: &Database, actor: &UserData, patient: &Patient) -> TriageEntry {
        let entry = triage(actor, patient, TriageLevel::LessUrgent);
        let audit = AuditEntry::new(actor.id, AuditAction::Create, EntityType::TriageEntry, entry.id, json!({}));
        db.insert_triage(&entry, &audit).await.unwrap();
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::in_memory().await.unwrap();
        db.ping().await.unwrap();

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
                .fetch_all(db.pool())
                .await
                .unwrap();
        for table in ["users", "patients", "triage_entries", "audit_logs", "sha_claims"] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ama"), "%ama%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
