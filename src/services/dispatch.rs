use log::info;
use serde::Deserialize;
use serde_json::json;

use super::{check_transition, long_text, short_text, valid, Service, ServiceError};
use crate::authorization::Resource;
use crate::models::{
    timestamp_now, Ambulance, AmbulanceID, AmbulanceStatus, AuditAction, AuditEntry, Emergency,
    EmergencyID, EmergencyKind, EmergencyStatus, EntityType, GeoPoint, PatientID, TriageLevel,
    UserData,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewEmergency {
    pub caller_name: String,
    pub caller_phone: String,
    pub location: String,
    pub position: Option<GeoPoint>,
    pub kind: EmergencyKind,
    pub severity: TriageLevel,
    pub description: String,
    pub patient_id: Option<PatientID>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DispatchRequest {
    pub ambulance_id: AmbulanceID,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct EmergencyStatusUpdate {
    pub status: EmergencyStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAmbulance {
    pub call_sign: String,
    pub registration: String,
    pub base_location: String,
    pub position: Option<GeoPoint>,
}

/// Fields left out stay as they are
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AmbulanceUpdate {
    pub status: Option<AmbulanceStatus>,
    pub position: Option<GeoPoint>,
}

fn checked_position(position: Option<GeoPoint>) -> Result<Option<GeoPoint>, ServiceError> {
    match position {
        Some(point) if !point.is_valid() => Err(ServiceError::Invalid("position")),
        other => Ok(other),
    }
}

impl Service {
    pub async fn report_emergency(
        &self,
        actor: &UserData,
        input: NewEmergency,
    ) -> Result<Emergency, ServiceError> {
        self.enforce(actor).create(Resource::Emergencies)?;

        let emergency = Emergency {
            id: EmergencyID::new(),
            caller_name: short_text("caller_name", &input.caller_name)?,
            caller_phone: valid("caller_phone", &input.caller_phone)?,
            location: short_text("location", &input.location)?,
            position: checked_position(input.position)?,
            kind: input.kind,
            severity: input.severity,
            description: long_text("description", &input.description)?,
            status: EmergencyStatus::Reported,
            patient_id: input.patient_id,
            ambulance_id: None,
            reported_by: actor.id,
            reported_at: timestamp_now(),
            dispatched_at: None,
            arrived_at: None,
            completed_at: None,
        };
        if let Some(patient_id) = emergency.patient_id {
            self.db.get_patient(patient_id).await?;
        }

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Emergency,
            emergency.id,
            json!({ "kind": emergency.kind, "severity": emergency.severity }),
        );
        self.db.insert_emergency(&emergency, &audit).await?;

        info!(
            "{} emergency reported at {} ({})",
            emergency.severity, emergency.location, emergency.kind
        );
        Ok(emergency)
    }

    pub async fn get_emergency(&self, actor: &UserData, id: EmergencyID) -> Result<Emergency, ServiceError> {
        self.enforce(actor).read(Resource::Emergencies)?;
        Ok(self.db.get_emergency(id).await?)
    }

    /// Open emergencies only, most severe first
    pub async fn list_emergencies(
        &self,
        actor: &UserData,
        status: Option<EmergencyStatus>,
    ) -> Result<Vec<Emergency>, ServiceError> {
        self.enforce(actor).read(Resource::Emergencies)?;
        Ok(self.db.list_active_emergencies(status).await?)
    }

    /// Assigns an available ambulance to a reported emergency
    pub async fn dispatch(
        &self,
        actor: &UserData,
        id: EmergencyID,
        request: DispatchRequest,
    ) -> Result<Emergency, ServiceError> {
        self.enforce(actor).update(Resource::Emergencies)?;

        let mut emergency = self.db.get_emergency(id).await?;
        check_transition(emergency.status, EmergencyStatus::Dispatched)?;
        let ambulance = self.db.get_ambulance(request.ambulance_id).await?;
        if ambulance.status != AmbulanceStatus::Available {
            return Err(ServiceError::Conflict(format!(
                "ambulance {} is {}",
                ambulance.call_sign, ambulance.status
            )));
        }

        let now = timestamp_now();
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Dispatch,
            EntityType::Emergency,
            emergency.id,
            json!({ "ambulance_id": ambulance.id, "call_sign": ambulance.call_sign }),
        );
        self.db
            .dispatch_ambulance(emergency.id, ambulance.id, now, &audit)
            .await?;

        info!("{} dispatched to {}", ambulance.call_sign, emergency.location);
        emergency.status = EmergencyStatus::Dispatched;
        emergency.ambulance_id = Some(ambulance.id);
        emergency.dispatched_at = Some(now);
        Ok(emergency)
    }

    /// Closing an emergency hands its ambulance back to the pool
    pub async fn update_emergency_status(
        &self,
        actor: &UserData,
        id: EmergencyID,
        update: EmergencyStatusUpdate,
    ) -> Result<Emergency, ServiceError> {
        self.enforce(actor).update(Resource::Emergencies)?;

        let mut emergency = self.db.get_emergency(id).await?;
        let previous = emergency.status;
        if update.status == EmergencyStatus::Dispatched {
            return Err(ServiceError::Conflict(
                "an emergency is dispatched by assigning an ambulance".to_owned(),
            ));
        }
        check_transition(previous, update.status)?;

        let now = timestamp_now();
        emergency.status = update.status;
        match update.status {
            EmergencyStatus::OnScene => emergency.arrived_at = Some(now),
            EmergencyStatus::Completed | EmergencyStatus::Cancelled => {
                emergency.completed_at = Some(now)
            }
            _ => {}
        }

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::Emergency,
            emergency.id,
            json!({ "from": previous, "to": emergency.status }),
        );
        self.db
            .update_emergency_status(&emergency, previous, &audit)
            .await?;
        Ok(emergency)
    }

    pub async fn link_emergency_patient(
        &self,
        actor: &UserData,
        id: EmergencyID,
        patient_id: PatientID,
    ) -> Result<Emergency, ServiceError> {
        self.enforce(actor).update(Resource::Emergencies)?;

        let mut emergency = self.db.get_emergency(id).await?;
        let patient = self.db.get_patient(patient_id).await?;
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Update,
            EntityType::Emergency,
            emergency.id,
            json!({ "patient_id": patient.id }),
        );
        self.db
            .link_emergency_patient(emergency.id, patient.id, &audit)
            .await?;

        emergency.patient_id = Some(patient.id);
        Ok(emergency)
    }

    pub async fn register_ambulance(
        &self,
        actor: &UserData,
        input: NewAmbulance,
    ) -> Result<Ambulance, ServiceError> {
        self.enforce(actor).create(Resource::Ambulances)?;

        let ambulance = Ambulance {
            id: AmbulanceID::new(),
            call_sign: short_text("call_sign", &input.call_sign)?.to_uppercase(),
            registration: short_text("registration", &input.registration)?.to_uppercase(),
            base_location: short_text("base_location", &input.base_location)?,
            status: AmbulanceStatus::Available,
            position: checked_position(input.position)?,
            updated_at: timestamp_now(),
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Ambulance,
            ambulance.id,
            json!({ "call_sign": ambulance.call_sign }),
        );
        self.db.insert_ambulance(&ambulance, &audit).await?;
        Ok(ambulance)
    }

    pub async fn list_ambulances(
        &self,
        actor: &UserData,
        status: Option<AmbulanceStatus>,
    ) -> Result<Vec<Ambulance>, ServiceError> {
        self.enforce(actor).read(Resource::Ambulances)?;
        Ok(self.db.list_ambulances(status).await?)
    }

    /// Status and position report. `DISPATCHED` is only ever set by
    /// [`Service::dispatch`], and an assigned ambulance keeps its status.
    pub async fn update_ambulance(
        &self,
        actor: &UserData,
        id: AmbulanceID,
        update: AmbulanceUpdate,
    ) -> Result<Ambulance, ServiceError> {
        self.enforce(actor).update(Resource::Ambulances)?;

        let mut ambulance = self.db.get_ambulance(id).await?;
        let previous = ambulance.status;

        if let Some(status) = update.status.filter(|s| *s != previous) {
            if status == AmbulanceStatus::Dispatched {
                return Err(ServiceError::Invalid("status"));
            }
            if self.db.ambulance_is_assigned(ambulance.id).await? {
                return Err(ServiceError::Conflict(format!(
                    "ambulance {} is assigned to an open emergency",
                    ambulance.call_sign
                )));
            }
            ambulance.status = status;
        }
        if let Some(position) = checked_position(update.position)? {
            ambulance.position = Some(position);
        }
        ambulance.updated_at = timestamp_now();

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Update,
            EntityType::Ambulance,
            ambulance.id,
            json!({ "status": { "from": previous, "to": ambulance.status }, "position": ambulance.position }),
        );
        self.db.update_ambulance(&ambulance, &audit).await?;
        Ok(ambulance)
    }
}
