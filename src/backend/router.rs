//! Routes of the application.
//! Public routes are merged with the API routes, which all require a session.

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware::from_extractor_with_state,
    routing::{delete, get, patch, post, put},
    BoxError, Router,
};
use log::error;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use super::handlers_api::*;
use super::handlers_pages::{dashboard_page, index, login, logout, triage_page};
use super::middlewares::AuthUser;
use super::SharedState;
use crate::consts::SESSION_COOKIE;

pub fn get_router(state: SharedState) -> Router {
    // Cookie sessions of the ward screens, kept in memory
    let idle = time::Duration::minutes(state.service.sessions().ttl().num_minutes());
    let session_manager = SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_secure(!cfg!(debug_assertions))
        .with_expiry(Expiry::OnInactivity(idle));

    let sessions = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(|e: BoxError| async move {
            error!("Session layer failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }))
        .layer(session_manager);

    let router = Router::new()
        .merge(public_routes())
        .merge(api_routes(state.clone()))
        .with_state(state)
        .layer(sessions);

    // Any origin, debug builds only
    if cfg!(debug_assertions) {
        let cors = CorsLayer::new()
            .allow_methods(tower_http::cors::AllowMethods::any())
            .allow_headers(Any)
            .allow_origin(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Routes reachable without a session. Pages check the session themselves
/// and send anonymous visitors back to the login form.
fn public_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard_page))
        .route("/triage", get(triage_page))
        .route("/api/health", get(health))
        .route("/api/auth/login", post(api_login))
}

fn api_routes(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(api_logout))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id/role", put(update_user_role))
        .route("/api/users/:id/active", put(set_user_active))
        .route("/api/patients", get(search_patients).post(create_patient))
        .route(
            "/api/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/api/triage", post(triage_intake))
        .route("/api/triage/queue", get(triage_queue))
        .route("/api/triage/stats", get(triage_stats))
        .route("/api/triage/:id", get(get_triage))
        .route("/api/triage/:id/status", patch(update_triage_status))
        .route("/api/emergencies", get(list_emergencies).post(report_emergency))
        .route("/api/emergencies/:id", get(get_emergency))
        .route("/api/emergencies/:id/dispatch", post(dispatch))
        .route("/api/emergencies/:id/status", patch(update_emergency_status))
        .route("/api/emergencies/:id/patient", put(link_emergency_patient))
        .route("/api/ambulances", get(list_ambulances).post(register_ambulance))
        .route("/api/ambulances/:id", patch(update_ambulance))
        .route("/api/resources", get(list_resources).post(create_resource))
        .route("/api/resources/summary", get(availability_summary))
        .route("/api/resources/:id", get(get_resource).patch(update_resource))
        .route("/api/resources/:id/allocate", post(allocate_resource))
        .route("/api/resources/:id/release", post(release_resource))
        .route(
            "/api/procurement",
            get(list_supply_requests).post(create_supply_request),
        )
        .route("/api/procurement/:id", get(get_supply_request))
        .route("/api/procurement/:id/approve", post(approve_supply_request))
        .route("/api/procurement/:id/reject", post(reject_supply_request))
        .route("/api/procurement/:id/fulfil", post(fulfil_supply_request))
        .route("/api/procurement/:id/cancel", post(cancel_supply_request))
        .route("/api/staff", get(list_staff).post(create_staff))
        .route("/api/staff/:id", get(get_staff))
        .route("/api/staff/:id/deactivate", post(deactivate_staff))
        .route("/api/shifts", get(list_shifts).post(add_shift))
        .route("/api/shifts/on-duty", get(on_duty))
        .route("/api/shifts/:id", delete(remove_shift))
        .route("/api/transfers", get(list_transfers).post(request_transfer))
        .route("/api/transfers/:id", get(get_transfer))
        .route("/api/transfers/:id/status", patch(update_transfer_status))
        .route("/api/claims", get(list_claims).post(create_claim))
        .route("/api/claims/summary", get(claims_summary))
        .route("/api/claims/:id", get(get_claim))
        .route("/api/claims/:id/status", patch(update_claim_status))
        .route(
            "/api/telemedicine",
            get(list_consultations).post(schedule_consultation),
        )
        .route("/api/telemedicine/:id", get(get_consultation))
        .route("/api/telemedicine/:id/status", patch(update_consultation_status))
        .route("/api/audit", get(list_audit))
        .route("/api/dashboard", get(dashboard))
        .route_layer(from_extractor_with_state::<AuthUser, SharedState>(state))
}
