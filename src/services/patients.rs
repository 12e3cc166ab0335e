use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::{opt_long_text, opt_short_text, opt_valid, short_text, Service, ServiceError};
use crate::authorization::Resource;
use crate::db::PatientSearch;
use crate::models::{
    timestamp_now, AuditAction, AuditEntry, BloodType, EntityType, Gender, Page, Patient,
    PatientID, UserData,
};

/// Body of a patient create or update. An update replaces every field.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub sha_number: Option<String>,
    pub blood_type: Option<BloodType>,
    pub allergies: Option<String>,
    pub emergency_contact: Option<String>,
}

impl PatientInput {
    /// Validated fields applied on top of `patient`
    fn apply(self, patient: &mut Patient) -> Result<(), ServiceError> {
        if self.date_of_birth > timestamp_now().date_naive() {
            return Err(ServiceError::Invalid("date_of_birth"));
        }

        patient.first_name = short_text("first_name", &self.first_name)?;
        patient.last_name = short_text("last_name", &self.last_name)?;
        patient.date_of_birth = self.date_of_birth;
        patient.gender = self.gender;
        patient.phone = opt_valid("phone", self.phone.as_deref())?;
        patient.national_id = opt_valid("national_id", self.national_id.as_deref())?;
        patient.sha_number = opt_valid("sha_number", self.sha_number.as_deref())?;
        patient.blood_type = self.blood_type;
        patient.allergies = opt_long_text("allergies", self.allergies.as_deref())?;
        patient.emergency_contact =
            opt_short_text("emergency_contact", self.emergency_contact.as_deref())?;
        Ok(())
    }
}

impl Service {
    pub async fn create_patient(
        &self,
        actor: &UserData,
        input: PatientInput,
    ) -> Result<Patient, ServiceError> {
        self.enforce(actor).create(Resource::Patients)?;

        let now = timestamp_now();
        let mut patient = Patient {
            id: PatientID::new(),
            first_name: String::new(),
            last_name: String::new(),
            date_of_birth: input.date_of_birth,
            gender: input.gender,
            phone: None,
            national_id: None,
            sha_number: None,
            blood_type: None,
            allergies: None,
            emergency_contact: None,
            created_at: now,
            updated_at: now,
        };
        input.apply(&mut patient)?;

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Create,
            EntityType::Patient,
            patient.id,
            json!({ "name": patient.full_name() }),
        );
        self.db.insert_patient(&patient, &audit).await?;
        Ok(patient)
    }

    pub async fn get_patient(&self, actor: &UserData, id: PatientID) -> Result<Patient, ServiceError> {
        self.enforce(actor).read(Resource::Patients)?;
        Ok(self.db.get_patient(id).await?)
    }

    pub async fn search_patients(
        &self,
        actor: &UserData,
        search: &PatientSearch,
        page: Page,
    ) -> Result<Vec<Patient>, ServiceError> {
        self.enforce(actor).read(Resource::Patients)?;
        Ok(self.db.search_patients(search, page).await?)
    }

    pub async fn update_patient(
        &self,
        actor: &UserData,
        id: PatientID,
        input: PatientInput,
    ) -> Result<Patient, ServiceError> {
        self.enforce(actor).update(Resource::Patients)?;

        let mut patient = self.db.get_patient(id).await?;
        input.apply(&mut patient)?;
        patient.updated_at = timestamp_now();

        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Update,
            EntityType::Patient,
            patient.id,
            json!({ "name": patient.full_name() }),
        );
        self.db.update_patient(&patient, &audit).await?;
        Ok(patient)
    }

    /// Refused while triage, dispatch, transfer, claim or consultation
    /// records still reference the patient
    pub async fn delete_patient(&self, actor: &UserData, id: PatientID) -> Result<(), ServiceError> {
        self.enforce(actor).delete(Resource::Patients)?;

        let patient = self.db.get_patient(id).await?;
        let audit = AuditEntry::new(
            actor.id,
            AuditAction::Delete,
            EntityType::Patient,
            patient.id,
            json!({ "name": patient.full_name() }),
        );
        self.db.delete_patient(patient.id, &audit).await?;
        Ok(())
    }
}
