use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::{
    expect_one, expect_transition, opt_id, opt_str, parse_col, parse_opt_col, validated_col, DBError,
    Database,
};
use crate::models::{
    Ambulance, AmbulanceID, AmbulanceStatus, AuditEntry, Emergency, EmergencyID, EmergencyStatus,
    EntityType, GeoPoint, PatientID,
};

const TERMINAL_STATUSES: &str = "('COMPLETED', 'CANCELLED')";

fn position(row: &SqliteRow) -> Result<Option<GeoPoint>, sqlx::Error> {
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    Ok(latitude
        .zip(longitude)
        .map(|(latitude, longitude)| GeoPoint { latitude, longitude }))
}

impl FromRow<'_, SqliteRow> for Emergency {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Emergency {
            id: parse_col(row, "id")?,
            caller_name: row.try_get("caller_name")?,
            caller_phone: validated_col(row, "caller_phone")?,
            location: row.try_get("location")?,
            position: position(row)?,
            kind: parse_col(row, "kind")?,
            severity: parse_col(row, "severity")?,
            description: row.try_get("description")?,
            status: parse_col(row, "status")?,
            patient_id: parse_opt_col(row, "patient_id")?,
            ambulance_id: parse_opt_col(row, "ambulance_id")?,
            reported_by: parse_col(row, "reported_by")?,
            reported_at: row.try_get("reported_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
            arrived_at: row.try_get("arrived_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Ambulance {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Ambulance {
            id: parse_col(row, "id")?,
            call_sign: row.try_get("call_sign")?,
            registration: row.try_get("registration")?,
            base_location: row.try_get("base_location")?,
            status: parse_col(row, "status")?,
            position: position(row)?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl Database {
    pub async fn get_emergency(&self, id: EmergencyID) -> Result<Emergency, DBError> {
        sqlx::query_as::<_, Emergency>("SELECT * FROM emergencies WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Emergency, id))
    }

    /// Open emergencies, most severe first. A status filter narrows the list.
    pub async fn list_active_emergencies(
        &self,
        status: Option<EmergencyStatus>,
    ) -> Result<Vec<Emergency>, DBError> {
        Ok(sqlx::query_as::<_, Emergency>(&format!(
            r#"
            SELECT * FROM emergencies
            WHERE status NOT IN {TERMINAL_STATUSES} AND (?1 IS NULL OR status = ?1)
            ORDER BY CASE severity
                WHEN 'IMMEDIATE' THEN 1 WHEN 'URGENT' THEN 2 WHEN 'LESS_URGENT' THEN 3 ELSE 4
            END, reported_at
            "#
        ))
        .bind(opt_str(&status))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert_emergency(
        &self,
        emergency: &Emergency,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO emergencies (
                id, caller_name, caller_phone, location, latitude, longitude, kind, severity,
                description, status, patient_id, ambulance_id, reported_by, reported_at,
                dispatched_at, arrived_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(emergency.id.to_string())
        .bind(&emergency.caller_name)
        .bind(emergency.caller_phone.as_ref())
        .bind(&emergency.location)
        .bind(emergency.position.map(|p| p.latitude))
        .bind(emergency.position.map(|p| p.longitude))
        .bind(emergency.kind.as_ref())
        .bind(emergency.severity.as_ref())
        .bind(&emergency.description)
        .bind(emergency.status.as_ref())
        .bind(opt_id(&emergency.patient_id))
        .bind(opt_id(&emergency.ambulance_id))
        .bind(emergency.reported_by.to_string())
        .bind(emergency.reported_at)
        .bind(emergency.dispatched_at)
        .bind(emergency.arrived_at)
        .bind(emergency.completed_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Assigns an available ambulance to a reported emergency. Both rows
    /// change or neither does.
    pub async fn dispatch_ambulance(
        &self,
        emergency_id: EmergencyID,
        ambulance_id: AmbulanceID,
        at: DateTime<Utc>,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;

        let emergency = sqlx::query(
            r#"
            UPDATE emergencies SET status = 'DISPATCHED', ambulance_id = ?2, dispatched_at = ?3
            WHERE id = ?1 AND status = 'REPORTED'
            "#,
        )
        .bind(emergency_id.to_string())
        .bind(ambulance_id.to_string())
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if emergency.rows_affected() == 0 {
            return Err(DBError::Conflict(format!(
                "emergency {emergency_id} is not awaiting dispatch"
            )));
        }

        let ambulance = sqlx::query(
            r#"
            UPDATE ambulances SET status = 'DISPATCHED', updated_at = ?2
            WHERE id = ?1 AND status = 'AVAILABLE'
            "#,
        )
        .bind(ambulance_id.to_string())
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if ambulance.rows_affected() == 0 {
            return Err(DBError::Conflict(format!(
                "ambulance {ambulance_id} is not available"
            )));
        }

        Self::commit_with_audit(tx, audit).await
    }

    /// Stores the new status and timestamps of `emergency`. When the
    /// emergency is closed its ambulance becomes available again.
    pub async fn update_emergency_status(
        &self,
        emergency: &Emergency,
        previous: EmergencyStatus,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE emergencies SET status = ?2, arrived_at = ?3, completed_at = ?4
            WHERE id = ?1 AND status = ?5
            "#,
        )
        .bind(emergency.id.to_string())
        .bind(emergency.status.as_ref())
        .bind(emergency.arrived_at)
        .bind(emergency.completed_at)
        .bind(previous.as_ref())
        .execute(&mut *tx)
        .await?;
        expect_transition(
            &mut *tx,
            result.rows_affected(),
            "emergencies",
            EntityType::Emergency,
            emergency.id,
        )
        .await?;

        let closed = matches!(
            emergency.status,
            EmergencyStatus::Completed | EmergencyStatus::Cancelled
        );
        if let (true, Some(ambulance_id)) = (closed, emergency.ambulance_id) {
            sqlx::query(
                r#"
                UPDATE ambulances SET status = 'AVAILABLE', updated_at = ?2
                WHERE id = ?1 AND status = 'DISPATCHED'
                "#,
            )
            .bind(ambulance_id.to_string())
            .bind(emergency.completed_at.unwrap_or(audit.created_at))
            .execute(&mut *tx)
            .await?;
        }

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn link_emergency_patient(
        &self,
        id: EmergencyID,
        patient_id: PatientID,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("UPDATE emergencies SET patient_id = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(patient_id.to_string())
            .execute(&mut *tx)
            .await?;
        expect_one(result.rows_affected(), EntityType::Emergency, id)?;

        Self::commit_with_audit(tx, audit).await
    }

    pub async fn get_ambulance(&self, id: AmbulanceID) -> Result<Ambulance, DBError> {
        sqlx::query_as::<_, Ambulance>("SELECT * FROM ambulances WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DBError::not_found(EntityType::Ambulance, id))
    }

    pub async fn list_ambulances(
        &self,
        status: Option<AmbulanceStatus>,
    ) -> Result<Vec<Ambulance>, DBError> {
        Ok(sqlx::query_as::<_, Ambulance>(
            "SELECT * FROM ambulances WHERE (?1 IS NULL OR status = ?1) ORDER BY call_sign",
        )
        .bind(opt_str(&status))
        .fetch_all(&self.pool)
        .await?)
    }

    /// Whether an open emergency currently holds the ambulance
    pub async fn ambulance_is_assigned(&self, id: AmbulanceID) -> Result<bool, DBError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM emergencies WHERE ambulance_id = ?1 AND status NOT IN {TERMINAL_STATUSES}"
        ))
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn insert_ambulance(
        &self,
        ambulance: &Ambulance,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO ambulances (
                id, call_sign, registration, base_location, status, latitude, longitude, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(ambulance.id.to_string())
        .bind(&ambulance.call_sign)
        .bind(&ambulance.registration)
        .bind(&ambulance.base_location)
        .bind(ambulance.status.as_ref())
        .bind(ambulance.position.map(|p| p.latitude))
        .bind(ambulance.position.map(|p| p.longitude))
        .bind(ambulance.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::commit_with_audit(tx, audit).await
    }

    /// Stores status and last known position
    pub async fn update_ambulance(
        &self,
        ambulance: &Ambulance,
        audit: &AuditEntry,
    ) -> Result<(), DBError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE ambulances SET status = ?2, latitude = ?3, longitude = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(ambulance.id.to_string())
        .bind(ambulance.status.as_ref())
        .bind(ambulance.position.map(|p| p.latitude))
        .bind(ambulance.position.map(|p| p.longitude))
        .bind(ambulance.updated_at)
        .execute(&mut *tx)
        .await?;
        expect_one(result.rows_affected(), EntityType::Ambulance, ambulance.id)?;

        Self::commit_with_audit(tx, audit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use crate::models::{timestamp_now, AuditAction, EmergencyKind, Role, TriageLevel, UserData};
    use crate::utils::input_validation::PhoneNumber;
    use serde_json::json;

    fn audit(actor: &UserData, entity: EntityType, id: impl ToString) -> AuditEntry {
        AuditEntry::new(actor.id, AuditAction::Dispatch, entity, id, json!({}))
    }

    fn emergency(actor: &UserData) -> Emergency {
        Emergency {
            id: EmergencyID::new(),
            caller_name: "Wanjiku".to_string(),
            caller_phone: PhoneNumber::try_from("0700111222").unwrap(),
            location: "Thika Road, Roysambu".to_string(),
            position: Some(GeoPoint { latitude: -1.2186, longitude: 36.8868 }),
            kind: EmergencyKind::RoadAccident,
            severity: TriageLevel::Urgent,
            description: "Two vehicle collision".to_string(),
            status: EmergencyStatus::Reported,
            patient_id: None,
            ambulance_id: None,
            reported_by: actor.id,
            reported_at: timestamp_now(),
            dispatched_at: None,
            arrived_at: None,
            completed_at: None,
        }
    }

    fn ambulance(call_sign: &str) -> Ambulance {
        Ambulance {
            id: AmbulanceID::new(),
            call_sign: call_sign.to_string(),
            registration: format!("KCA {call_sign}"),
            base_location: "Casualty bay".to_string(),
            status: AmbulanceStatus::Available,
            position: None,
            updated_at: timestamp_now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_release() {
        let db = Database::in_memory().await.unwrap();
        let dispatcher = fixtures::stored_user(&db, Role::Dispatcher, "dispatcher").await;
        let call = emergency(&dispatcher);
        let unit = ambulance("AMB-01");
        db.insert_emergency(&call, &audit(&dispatcher, EntityType::Emergency, call.id))
            .await
            .unwrap();
        db.insert_ambulance(&unit, &audit(&dispatcher, EntityType::Ambulance, unit.id))
            .await
            .unwrap();

        db.dispatch_ambulance(call.id, unit.id, timestamp_now(), &audit(&dispatcher, EntityType::Emergency, call.id))
            .await
            .unwrap();

        let dispatched = db.get_emergency(call.id).await.unwrap();
        assert_eq!(dispatched.status, EmergencyStatus::Dispatched);
        assert_eq!(dispatched.ambulance_id, Some(unit.id));
        assert_eq!(dispatched.position, call.position);
        assert_eq!(db.get_ambulance(unit.id).await.unwrap().status, AmbulanceStatus::Dispatched);
        assert!(db.ambulance_is_assigned(unit.id).await.unwrap());

        let mut cancelled = dispatched.clone();
        cancelled.status = EmergencyStatus::Cancelled;
        cancelled.completed_at = Some(timestamp_now());
        db.update_emergency_status(&cancelled, EmergencyStatus::Dispatched, &audit(&dispatcher, EntityType::Emergency, call.id))
            .await
            .unwrap();

        assert_eq!(db.get_ambulance(unit.id).await.unwrap().status, AmbulanceStatus::Available);
        assert!(!db.ambulance_is_assigned(unit.id).await.unwrap());
        assert!(db.list_active_emergencies(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_busy_ambulance_is_not_dispatched_twice() {
        let db = Database::in_memory().await.unwrap();
        let dispatcher = fixtures::stored_user(&db, Role::Dispatcher, "dispatcher").await;
        let first = emergency(&dispatcher);
        let second = emergency(&dispatcher);
        let unit = ambulance("AMB-02");
        for call in [&first, &second] {
            db.insert_emergency(call, &audit(&dispatcher, EntityType::Emergency, call.id))
                .await
                .unwrap();
        }
        db.insert_ambulance(&unit, &audit(&dispatcher, EntityType::Ambulance, unit.id))
            .await
            .unwrap();

        db.dispatch_ambulance(first.id, unit.id, timestamp_now(), &audit(&dispatcher, EntityType::Emergency, first.id))
            .await
            .unwrap();
        assert!(matches!(
            db.dispatch_ambulance(second.id, unit.id, timestamp_now(), &audit(&dispatcher, EntityType::Emergency, second.id))
                .await,
            Err(DBError::Conflict(_))
        ));

        // The failed dispatch left the second emergency untouched
        let untouched = db.get_emergency(second.id).await.unwrap();
        assert_eq!(untouched.status, EmergencyStatus::Reported);
        assert_eq!(untouched.ambulance_id, None);
        assert_eq!(
            db.list_active_emergencies(Some(EmergencyStatus::Reported)).await.unwrap().len(),
            1
        );
    }
}
