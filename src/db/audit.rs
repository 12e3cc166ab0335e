use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use super::{decode_error, opt_id, opt_str, parse_col, DBError, Database};
use crate::models::{AuditEntry, AuditFilter, Page};

impl FromRow<'_, SqliteRow> for AuditEntry {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let details: String = row.try_get("details")?;
        Ok(AuditEntry {
            id: parse_col(row, "id")?,
            actor_id: parse_col(row, "actor_id")?,
            action: parse_col(row, "action")?,
            entity_type: parse_col(row, "entity_type")?,
            entity_id: row.try_get("entity_id")?,
            details: serde_json::from_str(&details).map_err(|e| decode_error("details", e))?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Appends an audit row on the caller's connection, usually a transaction
pub(super) async fn insert(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<(), DBError> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, details, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.actor_id.to_string())
    .bind(entry.action.as_ref())
    .bind(entry.entity_type.as_ref())
    .bind(&entry.entity_id)
    .bind(entry.details.to_string())
    .bind(entry.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

impl Database {
    /// Newest first
    pub async fn list_audit(
        &self,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditEntry>, DBError> {
        Ok(sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_logs
            WHERE (?1 IS NULL OR entity_type = ?1)
              AND (?2 IS NULL OR entity_id = ?2)
              AND (?3 IS NULL OR actor_id = ?3)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?4 OFFSET ?5
            "#,
        )
        .bind(opt_str(&filter.entity_type))
        .bind(filter.entity_id.as_deref())
        .bind(opt_id(&filter.actor_id))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, EntityType, UserID};
    use serde_json::json;

    #[tokio::test]
    async fn test_audit_list_filters_and_order() {
        let db = Database::in_memory().await.unwrap();
        let alice = UserID::new();
        let bob = UserID::new();

        let first = AuditEntry::new(alice, AuditAction::Login, EntityType::User, alice, json!({}));
        let second = AuditEntry::new(
            alice,
            AuditAction::Create,
            EntityType::Patient,
            "p-1",
            json!({"name": "Amani Otieno"}),
        );
        let third = AuditEntry::new(bob, AuditAction::Update, EntityType::Patient, "p-1", json!({}));
        for entry in [&first, &second, &third] {
            db.record_event(entry).await.unwrap();
        }

        let all = db.list_audit(&AuditFilter::default(), Page::default()).await.unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);
        assert_eq!(all[1].details["name"], "Amani Otieno");

        let patient_rows = db
            .list_audit(
                &AuditFilter {
                    entity_type: Some(EntityType::Patient),
                    entity_id: Some("p-1".to_string()),
                    actor_id: None,
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(patient_rows.len(), 2);

        let by_bob = db
            .list_audit(
                &AuditFilter {
                    actor_id: Some(bob),
                    ..Default::default()
                },
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(by_bob.len(), 1);
        assert_eq!(by_bob[0].action, AuditAction::Update);

        let paged = db
            .list_audit(&AuditFilter::default(), Page { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].id, second.id);
    }
}
