use std::collections::BTreeMap;

use log::warn;
use serde::Deserialize;
use serde_json::json;

use super::{check_transition, long_text, opt_long_text, opt_valid, valid, Service, ServiceError};
use crate::authorization::{Action, Resource};
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, ClaimID, ClaimStatus, ClaimTotals, EntityType,
    PatientID, ShaClaim, UserData,
};
use crate::utils::input_validation::ShaNumber;

/// Draws of a fresh reference before giving up
const REFERENCE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct NewClaim {
    pub patient_id: PatientID,
    /// Taken from the patient record when left out
    pub sha_number: Option<String>,
    pub service_description: String,
    pub diagnosis_code: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimStatusUpdate {
    pub status: ClaimStatus,
    pub rejection_reason: Option<String>,
}

impl Service {
    pub async fn create_claim(&self, actor: &UserData, input: NewClaim) -> Result<ShaClaim, ServiceError> {
        self.enforce(actor).create(Resource::Claims)?;

        if !(1..=ShaClaim::MAX_AMOUNT_CENTS).contains(&input.amount_cents) {
            return Err(ServiceError::Invalid("amount_cents"));
        }
        let service_description = long_text("service_description", &input.service_description)?;
        let diagnosis_code = valid("diagnosis_code", &input.diagnosis_code)?;
        let given: Option<ShaNumber> = opt_valid("sha_number", input.sha_number.as_deref())?;

        let patient = self.db.get_patient(input.patient_id).await?;
        let sha_number = given
            .or(patient.sha_number)
            .ok_or(ServiceError::Invalid("sha_number"))?;

        let id = ClaimID::new();
        let created_at = timestamp_now();
        let claim = ShaClaim {
            id,
            reference: ShaClaim::reference_for(&id, created_at),
            patient_id: patient.id,
            sha_number,
            service_description,
            diagnosis_code,
            amount_cents: input.amount_cents,
            status: ClaimStatus::Draft,
            rejection_reason: None,
            created_by: actor.id,
            created_at,
            submitted_at: None,
            decided_at: None,
        };

        self.insert_new_claim(actor, claim).await
    }

    /// Stores a new claim. A reference already in use is drawn again
    /// along with a fresh id.
    async fn insert_new_claim(&self, actor: &UserData, mut claim: ShaClaim) -> Result<ShaClaim, ServiceError> {
        for _ in 0..REFERENCE_ATTEMPTS {
            let audit = AuditEntry::new(
                actor.id,
                AuditAction::Create,
                EntityType::ShaClaim,
                claim.id,
                json!({ "reference": claim.reference, "amount_cents": claim.amount_cents }),
            );
            if self.db.insert_claim(&claim, &audit).await? {
                return Ok(claim);
            }
            warn!("Claim reference {} already taken, drawing another", claim.reference);
            claim.id = ClaimID::new();
            claim.reference = ShaClaim::reference_for(&claim.id, claim.created_at);
        }
        Err(ServiceError::Conflict("no free claim reference".to_string()))
    }

    pub async fn get_claim(&self, actor: &UserData, id: ClaimID) -> Result<ShaClaim, ServiceError> {
        self.enforce(actor).read(Resource::Claims)?;
        Ok(self.db.get_claim(id).await?)
    }

    pub async fn list_claims(
        &self,
        actor: &UserData,
        status: Option<ClaimStatus>,
    ) -> Result<Vec<ShaClaim>, ServiceError> {
        self.enforce(actor).read(Resource::Claims)?;
        Ok(self.db.list_claims(status).await?)
    }

    /// Submitting needs update, deciding or marking paid needs approve
    pub async fn update_claim_status(
        &self,
        actor: &UserData,
        id: ClaimID,
        update: ClaimStatusUpdate,
    ) -> Result<ShaClaim, ServiceError> {
        let action = if update.status.is_decision() {
            Action::Approve
        } else {
            Action::Update
        };
        self.enforce(actor).require(Resource::Claims, action)?;

        let reason = opt_long_text("rejection_reason", update.rejection_reason.as_deref())?;
        if update.status == ClaimStatus::Rejected && reason.is_none() {
            return Err(ServiceError::Invalid("rejection_reason"));
        }

        let mut claim = self.db.get_claim(id).await?;
        let previous = claim.status;
        check_transition(previous, update.status)?;

        let now = timestamp_now();
        claim.status = update.status;
        match update.status {
            ClaimStatus::Submitted => claim.submitted_at = Some(now),
            ClaimStatus::Approved | ClaimStatus::Rejected => claim.decided_at = Some(now),
            ClaimStatus::Draft | ClaimStatus::Paid => {}
        }
        if update.status == ClaimStatus::Rejected {
            claim.rejection_reason = reason;
        }

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::StatusChange,
            EntityType::ShaClaim,
            claim.id,
            json!({ "from": previous, "to": claim.status, "reason": claim.rejection_reason }),
        );
        self.db.update_claim_status(&claim, previous, &audit).await?;
        Ok(claim)
    }

    /// Count and value per status
    pub async fn claims_summary(
        &self,
        actor: &UserData,
    ) -> Result<BTreeMap<ClaimStatus, ClaimTotals>, ServiceError> {
        self.enforce(actor).read(Resource::Claims)?;
        Ok(self.db.claim_totals().await?)
    }
}
