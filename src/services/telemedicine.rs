use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{check_transition, long_text, opt_long_text, Service, ServiceError};
use crate::authorization::Resource;
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, ConsultationID, ConsultationStatus, EntityType,
    PatientID, Role, Teleconsultation, UserData, UserID,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewConsultation {
    pub patient_id: PatientID,
    pub doctor_id: UserID,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsultationStatusUpdate {
    pub status: ConsultationStatus,
    /// Only kept when completing
    pub notes: Option<String>,
}

impl Service {
    pub async fn schedule_consultation(
        &self,
        actor: &UserData,
        input: NewConsultation,
    ) -> Result<Teleconsultation, ServiceError> {
        self.enforce(actor).create(Resource::Telemedicine)?;

        let durations =
            Teleconsultation::MIN_DURATION_MINUTES..=Teleconsultation::MAX_DURATION_MINUTES;
        if !durations.contains(&input.duration_minutes) {
            return Err(ServiceError::Invalid("duration_minutes"));
        }
        let now = timestamp_now();
        if input.scheduled_at < now {
            return Err(ServiceError::Invalid("scheduled_at"));
        }
        let reason = long_text("reason", &input.reason)?;

        let patient = self.db.get_patient(input.patient_id).await?;
        let doctor = self.db.get_user(input.doctor_id).await?;
        if doctor.role != Role::Doctor || !doctor.active {
            return Err(ServiceError::Invalid("doctor_id"));
        }

        let id = ConsultationID::new();
        let session = Teleconsultation {
            id,
            patient_id: patient.id,
            doctor_id: doctor.id,
            scheduled_at: input.scheduled_at,
            duration_minutes: input.duration_minutes,
            status: ConsultationStatus::Scheduled,
            meeting_link: format!("{}/{}", self.telemedicine_base_url, id),
            reason,
            notes: None,
            created_by: actor.id,
            created_at: now,
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Teleconsultation,
            session.id,
            json!({
                "patient_id": session.patient_id,
                "doctor_id": session.doctor_id,
                "scheduled_at": session.scheduled_at,
            }),
        );
        self.db.insert_consultation(&session, &audit).await?;
        Ok(session)
    }

    pub async fn get_consultation(
        &self,
        actor: &UserData,
        id: ConsultationID,
    ) -> Result<Teleconsultation, ServiceError> {
        self.enforce(actor).read(Resource::Telemedicine)?;
        Ok(self.db.get_consultation(id).await?)
    }

    /// Sessions that have not ended yet, soonest first
    pub async fn list_consultations(
        &self,
        actor: &UserData,
        doctor_id: Option<UserID>,
    ) -> Result<Vec<Teleconsultation>, ServiceError> {
        self.enforce(actor).read(Resource::Telemedicine)?;
        Ok(self
            .db
            .list_upcoming_consultations(doctor_id, timestamp_now())
            .await?)
    }

    pub async fn update_consultation_status(
        &self,
        actor: &UserData,
        id: ConsultationID,
        update: ConsultationStatusUpdate,
    ) -> Result<Teleconsultation, ServiceError> {
        self.enforce(actor).update(Resource::Telemedicine)?;

        let mut session = self.db.get_consultation(id).await?;
        let previous = session.status;
        check_transition(previous, update.status)?;

        if update.status == ConsultationStatus::Completed {
            if let Some(notes) = opt_long_text("notes", update.notes.as_deref())? {
                session.notes = Some(notes);
            }
        }
        session.status = update.status;

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::Teleconsultation,
            session.id,
            json!({ "from": previous, "to": session.status }),
        );
        self.db
            .update_consultation_status(&session, previous, &audit)
            .await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{fixtures, DBError};
    use crate::services::test_support::{actor, service};
    use chrono::Duration;

    fn booking(patient_id: PatientID, doctor_id: UserID, starts_in: Duration) -> NewConsultation {
        NewConsultation {
            patient_id,
            doctor_id,
            scheduled_at: timestamp_now() + starts_in,
            duration_minutes: 30,
            reason: "Post-discharge review".to_string(),
        }
    }

    #[tokio::test]
    async fn test_schedule_and_complete() {
        let service = service().await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;
        let doctor = actor(&service, Role::Doctor, "doctor").await;
        let patient = fixtures::stored_patient(service.db(), &nurse, "Amani", "Otieno").await;

        let session = service
            .schedule_consultation(&nurse, booking(patient.id, doctor.id, Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(
            session.meeting_link,
            format!("https://meet.example.org/ems/{}", session.id)
        );

        assert!(matches!(
            service
                .schedule_consultation(&nurse, booking(patient.id, doctor.id, Duration::minutes(75)))
                .await,
            Err(ServiceError::Db(DBError::Conflict(_)))
        ));

        // Nurses book sessions, doctors run them
        assert!(matches!(
            service
                .update_consultation_status(
                    &nurse,
                    session.id,
                    ConsultationStatusUpdate { status: ConsultationStatus::InProgress, notes: None },
                )
                .await,
            Err(ServiceError::AccessDenied(_))
        ));
        service
            .update_consultation_status(
                &doctor,
                session.id,
                ConsultationStatusUpdate {
                    status: ConsultationStatus::InProgress,
                    notes: Some("ignored until completion".to_string()),
                },
            )
            .await
            .unwrap();
        let done = service
            .update_consultation_status(
                &doctor,
                session.id,
                ConsultationStatusUpdate {
                    status: ConsultationStatus::Completed,
                    notes: Some("Wound healing well".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.notes.as_deref(), Some("Wound healing well"));
        assert!(service.list_consultations(&doctor, Some(doctor.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_booking_rules() {
        let service = service().await;
        let nurse = actor(&service, Role::Nurse, "nurse").await;
        let doctor = actor(&service, Role::Doctor, "doctor").await;
        let patient = fixtures::stored_patient(service.db(), &nurse, "Amani", "Otieno").await;

        assert!(matches!(
            service
                .schedule_consultation(&nurse, booking(patient.id, doctor.id, Duration::hours(-1)))
                .await,
            Err(ServiceError::Invalid("scheduled_at"))
        ));
        assert!(matches!(
            service
                .schedule_consultation(&nurse, booking(patient.id, nurse.id, Duration::hours(1)))
                .await,
            Err(ServiceError::Invalid("doctor_id"))
        ));

        let mut marathon = booking(patient.id, doctor.id, Duration::hours(1));
        marathon.duration_minutes = 300;
        assert!(matches!(
            service.schedule_consultation(&nurse, marathon).await,
            Err(ServiceError::Invalid("duration_minutes"))
        ));

        service
            .schedule_consultation(&nurse, booking(patient.id, doctor.id, Duration::hours(3)))
            .await
            .unwrap();
        let first = service
            .schedule_consultation(&nurse, booking(patient.id, doctor.id, Duration::hours(1)))
            .await
            .unwrap();
        let upcoming = service.list_consultations(&nurse, None).await.unwrap();
        assert_eq!(upcoming.len(), 2);
        assert_eq!(upcoming[0].id, first.id);
    }
}
