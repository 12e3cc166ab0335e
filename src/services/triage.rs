use serde::Deserialize;
use serde_json::json;

use super::{check_transition, long_text, opt_long_text, Service, ServiceError};
use crate::authorization::Resource;
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, EntityType, PatientID, TriageEntry, TriageID,
    TriageLevel, TriageStatus, UserData, Vitals,
};
use crate::queue::{build_queue, queue_stats, QueueStats, QueuedEntry};

#[derive(Debug, Clone, Deserialize)]
pub struct TriageIntake {
    pub patient_id: PatientID,
    /// Suggested from the vitals when absent
    pub level: Option<TriageLevel>,
    pub chief_complaint: String,
    #[serde(default)]
    pub vitals: Vitals,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriageStatusUpdate {
    pub status: TriageStatus,
    /// Replaces the entry's notes when present
    pub notes: Option<String>,
}

impl Service {
    pub async fn triage_intake(
        &self,
        actor: &UserData,
        intake: TriageIntake,
    ) -> Result<TriageEntry, ServiceError> {
        self.enforce(actor).create(Resource::Triage)?;

        let chief_complaint = long_text("chief_complaint", &intake.chief_complaint)?;
        let notes = opt_long_text("notes", intake.notes.as_deref())?;
        if let Some(field) = intake.vitals.implausible_reading() {
            return Err(ServiceError::Invalid(field));
        }

        let patient = self.db.get_patient(intake.patient_id).await?;
        if self.db.active_triage_for_patient(patient.id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "{} is already in the queue",
                patient.full_name()
            )));
        }

        let suggested = intake.vitals.suggested_level();
        let entry = TriageEntry {
            id: TriageID::new(),
            patient_id: patient.id,
            level: intake.level.unwrap_or(suggested),
            status: TriageStatus::Waiting,
            chief_complaint,
            vitals: intake.vitals,
            notes,
            assessed_by: actor.id,
            arrived_at: timestamp_now(),
            treatment_started_at: None,
            completed_at: None,
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::TriageEntry,
            entry.id,
            json!({ "patient_id": entry.patient_id, "level": entry.level, "suggested": suggested }),
        );
        self.db.insert_triage(&entry, &audit).await?;
        Ok(entry)
    }

    pub async fn get_triage(&self, actor: &UserData, id: TriageID) -> Result<TriageEntry, ServiceError> {
        self.enforce(actor).read(Resource::Triage)?;
        Ok(self.db.get_triage(id).await?)
    }

    /// Moves an entry along its lifecycle and stamps the matching time
    pub async fn update_triage_status(
        &self,
        actor: &UserData,
        id: TriageID,
        update: TriageStatusUpdate,
    ) -> Result<TriageEntry, ServiceError> {
        self.enforce(actor).update(Resource::Triage)?;

        let mut entry = self.db.get_triage(id).await?;
        let previous = entry.status;
        check_transition(previous, update.status)?;

        if let Some(notes) = opt_long_text("notes", update.notes.as_deref())? {
            entry.notes = Some(notes);
        }

        let now = timestamp_now();
        entry.status = update.status;
        match update.status {
            TriageStatus::InTreatment => entry.treatment_started_at = Some(now),
            TriageStatus::Waiting => {}
            TriageStatus::Completed
            | TriageStatus::LeftWithoutBeingSeen
            | TriageStatus::Transferred => entry.completed_at = Some(now),
        }

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::TriageEntry,
            entry.id,
            json!({ "from": previous, "to": entry.status }),
        );
        self.db.update_triage_status(&entry, previous, &audit).await?;
        Ok(entry)
    }

    /// Waiting patients in the order they should be seen
    pub async fn triage_queue(&self, actor: &UserData) -> Result<Vec<QueuedEntry>, ServiceError> {
        self.enforce(actor).read(Resource::Triage)?;
        let active = self.db.list_active_triage().await?;
        Ok(build_queue(active, timestamp_now()))
    }

    pub async fn triage_stats(&self, actor: &UserData) -> Result<QueueStats, ServiceError> {
        self.enforce(actor).read(Resource::Triage)?;
        let active = self.db.list_active_triage().await?;
        Ok(queue_stats(&active, timestamp_now()))
    }
}
