use serde::Deserialize;
use serde_json::json;

use super::{check_transition, long_text, short_text, Service, ServiceError};
use crate::authorization::{Action, Resource};
use crate::models::{
    timestamp_now, AmbulanceID, AuditAction, AuditEntry, EntityType, PatientID, Transfer,
    TransferID, TransferStatus, TriageLevel, UserData,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransfer {
    pub patient_id: PatientID,
    pub from_facility: String,
    pub to_facility: String,
    pub reason: String,
    pub urgency: TriageLevel,
    pub ambulance_id: Option<AmbulanceID>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransferStatusUpdate {
    pub status: TransferStatus,
    /// Assigns or replaces the transporting ambulance
    pub ambulance_id: Option<AmbulanceID>,
}

impl Service {
    pub async fn request_transfer(
        &self,
        actor: &UserData,
        input: NewTransfer,
    ) -> Result<Transfer, ServiceError> {
        self.enforce(actor).create(Resource::Transfers)?;

        let from_facility = short_text("from_facility", &input.from_facility)?;
        let to_facility = short_text("to_facility", &input.to_facility)?;
        if from_facility.to_lowercase() == to_facility.to_lowercase() {
            return Err(ServiceError::Invalid("to_facility"));
        }
        let reason = long_text("reason", &input.reason)?;

        let patient = self.db.get_patient(input.patient_id).await?;
        if let Some(ambulance_id) = input.ambulance_id {
            self.db.get_ambulance(ambulance_id).await?;
        }

        let now = timestamp_now();
        let transfer = Transfer {
            id: TransferID::new(),
            patient_id: patient.id,
            from_facility,
            to_facility,
            reason,
            urgency: input.urgency,
            status: TransferStatus::Requested,
            ambulance_id: input.ambulance_id,
            requested_by: actor.id,
            requested_at: now,
            updated_at: now,
        };

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Transfer,
            transfer.id,
            json!({
                "patient_id": transfer.patient_id,
                "to": transfer.to_facility,
                "urgency": transfer.urgency,
            }),
        );
        self.db.insert_transfer(&transfer, &audit).await?;
        Ok(transfer)
    }

    pub async fn get_transfer(&self, actor: &UserData, id: TransferID) -> Result<Transfer, ServiceError> {
        self.enforce(actor).read(Resource::Transfers)?;
        Ok(self.db.get_transfer(id).await?)
    }

    /// Most urgent first
    pub async fn list_transfers(
        &self,
        actor: &UserData,
        status: Option<TransferStatus>,
    ) -> Result<Vec<Transfer>, ServiceError> {
        self.enforce(actor).read(Resource::Transfers)?;
        Ok(self.db.list_transfers(status).await?)
    }

    /// Approving or rejecting needs the approve right, other moves need update
    pub async fn update_transfer_status(
        &self,
        actor: &UserData,
        id: TransferID,
        update: TransferStatusUpdate,
    ) -> Result<Transfer, ServiceError> {
        let action = if update.status.is_decision() {
            Action::Approve
        } else {
            Action::Update
        };
        self.enforce(actor).require(Resource::Transfers, action)?;

        let mut transfer = self.db.get_transfer(id).await?;
        let previous = transfer.status;
        check_transition(previous, update.status)?;

        if let Some(ambulance_id) = update.ambulance_id {
            transfer.ambulance_id = Some(self.db.get_ambulance(ambulance_id).await?.id);
        }
        transfer.status = update.status;
        transfer.updated_at = timestamp_now();

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::Transfer,
            transfer.id,
            json!({ "from": previous, "to": transfer.status, "ambulance_id": transfer.ambulance_id }),
        );
        self.db
            .update_transfer_status(&transfer, previous, &audit)
            .await?;
        Ok(transfer)
    }
}
