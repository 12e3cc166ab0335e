//! JSON API handlers. Each one forwards the caller and its input to the
//! matching service operation.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::AppResult;
use super::middlewares::AuthUser;
use super::SharedState;
use crate::authorization::Permission;
use crate::capacity::AvailabilitySummary;
use crate::db::PatientSearch;
use crate::models::*;
use crate::queue::{QueueStats, QueuedEntry};
use crate::services::*;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ActiveChange {
    active: bool,
}

#[derive(Debug, Deserialize)]
pub struct PatientLink {
    patient_id: PatientID,
}

/// `?status=` filter of list endpoints
#[derive(Debug, Deserialize)]
pub struct StatusFilter<S> {
    status: Option<S>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryFilter {
    category: Option<ResourceCategory>,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentFilter {
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DoctorFilter {
    doctor_id: Option<UserID>,
}

pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<Value>) {
    match state.service.db().ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            log::error!("Health check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

// Sessions

pub async fn api_login(
    State(state): State<SharedState>,
    Json(credentials): Json<Credentials>,
) -> AppResult<Json<Value>> {
    let (token, user) = state
        .service
        .login(&credentials.username, &credentials.password)
        .await?;
    Ok(Json(json!({
        "token": token,
        "expires_in_minutes": state.service.sessions().ttl().num_minutes(),
        "user": user,
    })))
}

pub async fn me(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> Json<Value> {
    let permissions: Vec<Permission> = state.service.my_permissions(&auth.user);
    Json(json!({ "user": auth.user, "permissions": permissions }))
}

pub async fn api_logout(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<StatusCode> {
    auth.sign_out(&state).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Users

pub async fn list_users(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<Vec<UserData>>> {
    Ok(Json(state.service.list_users(&auth.user).await?))
}

pub async fn create_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewUser>,
) -> AppResult<(StatusCode, Json<UserData>)> {
    let user = state.service.create_user(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<UserID>,
    Json(change): Json<RoleChange>,
) -> AppResult<Json<UserData>> {
    Ok(Json(state.service.update_user_role(&auth.user, id, change.role).await?))
}

pub async fn set_user_active(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<UserID>,
    Json(change): Json<ActiveChange>,
) -> AppResult<Json<UserData>> {
    Ok(Json(state.service.set_user_active(&auth.user, id, change.active).await?))
}

// Patients

pub async fn search_patients(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(search): Query<PatientSearch>,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<Patient>>> {
    Ok(Json(state.service.search_patients(&auth.user, &search, page).await?))
}

pub async fn create_patient(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<PatientInput>,
) -> AppResult<(StatusCode, Json<Patient>)> {
    let patient = state.service.create_patient(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get_patient(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<PatientID>,
) -> AppResult<Json<Patient>> {
    Ok(Json(state.service.get_patient(&auth.user, id).await?))
}

pub async fn update_patient(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<PatientID>,
    Json(input): Json<PatientInput>,
) -> AppResult<Json<Patient>> {
    Ok(Json(state.service.update_patient(&auth.user, id, input).await?))
}

pub async fn delete_patient(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<PatientID>,
) -> AppResult<StatusCode> {
    state.service.delete_patient(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Triage

pub async fn triage_intake(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(intake): Json<TriageIntake>,
) -> AppResult<(StatusCode, Json<TriageEntry>)> {
    let entry = state.service.triage_intake(&auth.user, intake).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn triage_queue(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<Vec<QueuedEntry>>> {
    Ok(Json(state.service.triage_queue(&auth.user).await?))
}

pub async fn triage_stats(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<QueueStats>> {
    Ok(Json(state.service.triage_stats(&auth.user).await?))
}

pub async fn get_triage(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TriageID>,
) -> AppResult<Json<TriageEntry>> {
    Ok(Json(state.service.get_triage(&auth.user, id).await?))
}

pub async fn update_triage_status(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TriageID>,
    Json(update): Json<TriageStatusUpdate>,
) -> AppResult<Json<TriageEntry>> {
    Ok(Json(state.service.update_triage_status(&auth.user, id, update).await?))
}

// Emergencies and ambulances

pub async fn list_emergencies(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<StatusFilter<EmergencyStatus>>,
) -> AppResult<Json<Vec<Emergency>>> {
    Ok(Json(state.service.list_emergencies(&auth.user, filter.status).await?))
}

pub async fn report_emergency(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewEmergency>,
) -> AppResult<(StatusCode, Json<Emergency>)> {
    let emergency = state.service.report_emergency(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(emergency)))
}

pub async fn get_emergency(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<EmergencyID>,
) -> AppResult<Json<Emergency>> {
    Ok(Json(state.service.get_emergency(&auth.user, id).await?))
}

pub async fn dispatch(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<EmergencyID>,
    Json(request): Json<DispatchRequest>,
) -> AppResult<Json<Emergency>> {
    Ok(Json(state.service.dispatch(&auth.user, id, request).await?))
}

pub async fn update_emergency_status(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<EmergencyID>,
    Json(update): Json<EmergencyStatusUpdate>,
) -> AppResult<Json<Emergency>> {
    Ok(Json(state.service.update_emergency_status(&auth.user, id, update).await?))
}

pub async fn link_emergency_patient(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<EmergencyID>,
    Json(link): Json<PatientLink>,
) -> AppResult<Json<Emergency>> {
    Ok(Json(
        state
            .service
            .link_emergency_patient(&auth.user, id, link.patient_id)
            .await?,
    ))
}

pub async fn list_ambulances(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<StatusFilter<AmbulanceStatus>>,
) -> AppResult<Json<Vec<Ambulance>>> {
    Ok(Json(state.service.list_ambulances(&auth.user, filter.status).await?))
}

pub async fn register_ambulance(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewAmbulance>,
) -> AppResult<(StatusCode, Json<Ambulance>)> {
    let ambulance = state.service.register_ambulance(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(ambulance)))
}

pub async fn update_ambulance(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<AmbulanceID>,
    Json(update): Json<AmbulanceUpdate>,
) -> AppResult<Json<Ambulance>> {
    Ok(Json(state.service.update_ambulance(&auth.user, id, update).await?))
}

// Resources

pub async fn list_resources(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<CategoryFilter>,
) -> AppResult<Json<Vec<Resource>>> {
    Ok(Json(state.service.list_resources(&auth.user, filter.category).await?))
}

pub async fn create_resource(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewResource>,
) -> AppResult<(StatusCode, Json<Resource>)> {
    let resource = state.service.create_resource(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(resource)))
}

pub async fn availability_summary(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<AvailabilitySummary>> {
    Ok(Json(state.service.availability_summary(&auth.user).await?))
}

pub async fn get_resource(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ResourceID>,
) -> AppResult<Json<Resource>> {
    Ok(Json(state.service.get_resource(&auth.user, id).await?))
}

pub async fn update_resource(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ResourceID>,
    Json(update): Json<ResourceUpdate>,
) -> AppResult<Json<Resource>> {
    Ok(Json(state.service.update_resource(&auth.user, id, update).await?))
}

pub async fn allocate_resource(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ResourceID>,
    Json(change): Json<QuantityChange>,
) -> AppResult<Json<Resource>> {
    Ok(Json(state.service.allocate_resource(&auth.user, id, change).await?))
}

pub async fn release_resource(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ResourceID>,
    Json(change): Json<QuantityChange>,
) -> AppResult<Json<Resource>> {
    Ok(Json(state.service.release_resource(&auth.user, id, change).await?))
}

// Procurement

pub async fn list_supply_requests(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<StatusFilter<SupplyRequestStatus>>,
) -> AppResult<Json<Vec<SupplyRequest>>> {
    Ok(Json(state.service.list_supply_requests(&auth.user, filter.status).await?))
}

pub async fn create_supply_request(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewSupplyRequest>,
) -> AppResult<(StatusCode, Json<SupplyRequest>)> {
    let request = state.service.create_supply_request(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_supply_request(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<SupplyRequestID>,
) -> AppResult<Json<SupplyRequest>> {
    Ok(Json(state.service.get_supply_request(&auth.user, id).await?))
}

pub async fn approve_supply_request(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<SupplyRequestID>,
    review: Option<Json<Review>>,
) -> AppResult<Json<SupplyRequest>> {
    let review = review.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.service.approve_supply_request(&auth.user, id, review).await?))
}

pub async fn reject_supply_request(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<SupplyRequestID>,
    Json(review): Json<Review>,
) -> AppResult<Json<SupplyRequest>> {
    Ok(Json(state.service.reject_supply_request(&auth.user, id, review).await?))
}

pub async fn fulfil_supply_request(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<SupplyRequestID>,
) -> AppResult<Json<SupplyRequest>> {
    Ok(Json(state.service.fulfil_supply_request(&auth.user, id).await?))
}

pub async fn cancel_supply_request(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<SupplyRequestID>,
) -> AppResult<Json<SupplyRequest>> {
    Ok(Json(state.service.cancel_supply_request(&auth.user, id).await?))
}

// Staff and shifts

pub async fn list_staff(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<DepartmentFilter>,
) -> AppResult<Json<Vec<StaffMember>>> {
    Ok(Json(
        state
            .service
            .list_staff(&auth.user, filter.department.as_deref())
            .await?,
    ))
}

pub async fn create_staff(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewStaffMember>,
) -> AppResult<(StatusCode, Json<StaffMember>)> {
    let member = state.service.create_staff(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn get_staff(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<StaffID>,
) -> AppResult<Json<StaffMember>> {
    Ok(Json(state.service.get_staff(&auth.user, id).await?))
}

pub async fn deactivate_staff(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<StaffID>,
) -> AppResult<Json<StaffMember>> {
    Ok(Json(state.service.deactivate_staff(&auth.user, id).await?))
}

pub async fn list_shifts(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(window): Query<ShiftWindow>,
) -> AppResult<Json<Vec<Shift>>> {
    Ok(Json(state.service.list_shifts(&auth.user, window).await?))
}

pub async fn add_shift(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewShift>,
) -> AppResult<(StatusCode, Json<Shift>)> {
    let shift = state.service.add_shift(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(shift)))
}

pub async fn on_duty(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<Vec<OnDuty>>> {
    Ok(Json(state.service.on_duty(&auth.user).await?))
}

pub async fn remove_shift(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ShiftID>,
) -> AppResult<StatusCode> {
    state.service.remove_shift(&auth.user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Transfers

pub async fn list_transfers(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<StatusFilter<TransferStatus>>,
) -> AppResult<Json<Vec<Transfer>>> {
    Ok(Json(state.service.list_transfers(&auth.user, filter.status).await?))
}

pub async fn request_transfer(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewTransfer>,
) -> AppResult<(StatusCode, Json<Transfer>)> {
    let transfer = state.service.request_transfer(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(transfer)))
}

pub async fn get_transfer(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TransferID>,
) -> AppResult<Json<Transfer>> {
    Ok(Json(state.service.get_transfer(&auth.user, id).await?))
}

pub async fn update_transfer_status(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<TransferID>,
    Json(update): Json<TransferStatusUpdate>,
) -> AppResult<Json<Transfer>> {
    Ok(Json(state.service.update_transfer_status(&auth.user, id, update).await?))
}

// Claims

pub async fn list_claims(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<StatusFilter<ClaimStatus>>,
) -> AppResult<Json<Vec<ShaClaim>>> {
    Ok(Json(state.service.list_claims(&auth.user, filter.status).await?))
}

pub async fn create_claim(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewClaim>,
) -> AppResult<(StatusCode, Json<ShaClaim>)> {
    let claim = state.service.create_claim(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

pub async fn claims_summary(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<BTreeMap<ClaimStatus, ClaimTotals>>> {
    Ok(Json(state.service.claims_summary(&auth.user).await?))
}

pub async fn get_claim(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ClaimID>,
) -> AppResult<Json<ShaClaim>> {
    Ok(Json(state.service.get_claim(&auth.user, id).await?))
}

pub async fn update_claim_status(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ClaimID>,
    Json(update): Json<ClaimStatusUpdate>,
) -> AppResult<Json<ShaClaim>> {
    Ok(Json(state.service.update_claim_status(&auth.user, id, update).await?))
}

// Telemedicine

pub async fn list_consultations(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<DoctorFilter>,
) -> AppResult<Json<Vec<Teleconsultation>>> {
    Ok(Json(state.service.list_consultations(&auth.user, filter.doctor_id).await?))
}

pub async fn schedule_consultation(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Json(input): Json<NewConsultation>,
) -> AppResult<(StatusCode, Json<Teleconsultation>)> {
    let consultation = state.service.schedule_consultation(&auth.user, input).await?;
    Ok((StatusCode::CREATED, Json(consultation)))
}

pub async fn get_consultation(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ConsultationID>,
) -> AppResult<Json<Teleconsultation>> {
    Ok(Json(state.service.get_consultation(&auth.user, id).await?))
}

pub async fn update_consultation_status(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<ConsultationID>,
    Json(update): Json<ConsultationStatusUpdate>,
) -> AppResult<Json<Teleconsultation>> {
    Ok(Json(
        state
            .service
            .update_consultation_status(&auth.user, id, update)
            .await?,
    ))
}

// Audit and overview

pub async fn list_audit(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
    Query(filter): Query<AuditFilter>,
    Query(page): Query<Page>,
) -> AppResult<Json<Vec<AuditEntry>>> {
    Ok(Json(state.service.list_audit(&auth.user, &filter, page).await?))
}

pub async fn dashboard(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<Dashboard>> {
    Ok(Json(state.service.dashboard(&auth.user).await?))
}
