//! Server-rendered pages for the ward screens. They refresh themselves
//! every few seconds and use the cookie session opened by the login form.

use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use super::error::{AppError, AppResult};
use super::middlewares::AuthUser;
use super::SharedState;
use crate::consts::SESSION_USER_KEY;
use crate::services::LoginError;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexParams {
    error: Option<String>,
}

fn render<T: Serialize>(state: &SharedState, template: &str, data: &T) -> AppResult<Html<String>> {
    Ok(Html(state.templates.render(template, data)?))
}

pub async fn index(
    State(state): State<SharedState>,
    auth: Option<AuthUser>,
    Query(params): Query<IndexParams>,
) -> AppResult<Response> {
    if auth.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }
    let page = render(&state, "index", &json!({ "error": params.error.is_some() }))?;
    Ok(page.into_response())
}

pub async fn login(
    State(state): State<SharedState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let user = match state.service.check_credentials(&form.username, &form.password).await {
        Ok(user) => user,
        Err(LoginError::InvalidCredentials) => return Ok(Redirect::to("/?error=1").into_response()),
        Err(e) => return Err(e.into()),
    };

    session
        .insert(SESSION_USER_KEY, user.id)
        .map_err(|e| AppError::Session(e.to_string()))?;
    Ok(Redirect::to("/dashboard").into_response())
}

pub async fn logout(State(state): State<SharedState>, auth: Option<AuthUser>) -> AppResult<Response> {
    if let Some(auth) = auth {
        auth.sign_out(&state).await?;
    }
    Ok(Redirect::to("/").into_response())
}

pub async fn dashboard_page(
    State(state): State<SharedState>,
    auth: Option<AuthUser>,
) -> AppResult<Response> {
    let Some(auth) = auth else {
        return Ok(Redirect::to("/").into_response());
    };

    let dashboard = state.service.dashboard(&auth.user).await?;
    let data = json!({
        "user": auth.user,
        "refresh": state.page_refresh_seconds,
        "dashboard": dashboard,
    });
    Ok(render(&state, "dashboard", &data)?.into_response())
}

pub async fn triage_page(
    State(state): State<SharedState>,
    auth: Option<AuthUser>,
) -> AppResult<Response> {
    let Some(auth) = auth else {
        return Ok(Redirect::to("/").into_response());
    };

    let queue = state.service.triage_queue(&auth.user).await?;
    let stats = state.service.triage_stats(&auth.user).await?;
    let data = json!({
        "user": auth.user,
        "refresh": state.page_refresh_seconds,
        "queue": queue,
        "stats": stats,
    });
    Ok(render(&state, "triage", &data)?.into_response())
}
