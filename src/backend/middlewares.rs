//! Resolves the caller of a request.
//! API clients send an `Authorization: Bearer` token. Browsers carry the
//! cookie session opened by the login form.

use axum::extract::FromRequestParts;
use http::{header::AUTHORIZATION, request::Parts};
use log::warn;
use tower_sessions::Session;

use super::{AppError, SharedState};
use crate::consts::SESSION_USER_KEY;
use crate::models::{UserData, UserID};
use crate::services::ServiceError;
use crate::sessions::SessionToken;

/// How the caller proved who they are
#[derive(Clone)]
pub enum Credential {
    Bearer(SessionToken),
    Cookie(Session),
}

/// The authenticated caller
#[derive(Clone)]
pub struct AuthUser {
    pub user: UserData,
    pub credential: Credential,
}

impl AuthUser {
    /// Ends whichever session the request came with
    pub async fn sign_out(&self, state: &SharedState) -> Result<(), ServiceError> {
        match &self.credential {
            Credential::Bearer(token) => state.service.logout(&self.user, token).await,
            Credential::Cookie(session) => {
                forget(session);
                state.service.record_logout(&self.user).await
            }
        }
    }
}

#[async_trait::async_trait]
impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        // Already resolved by the route layer
        if let Some(auth) = parts.extensions.get::<AuthUser>() {
            return Ok(auth.clone());
        }

        let auth = match bearer_token(parts) {
            Some(token) => AuthUser {
                user: state.service.authenticate(&token).await?,
                credential: Credential::Bearer(token),
            },
            None => {
                let session = parts
                    .extensions
                    .get::<Session>()
                    .cloned()
                    .ok_or(ServiceError::Unauthenticated)?;
                let user_id = session
                    .get::<UserID>(SESSION_USER_KEY)
                    .ok()
                    .flatten()
                    .ok_or(ServiceError::Unauthenticated)?;
                let user = state.service.active_user(user_id).await;
                if matches!(user, Err(ServiceError::Unauthenticated)) {
                    forget(&session);
                }
                AuthUser {
                    user: user?,
                    credential: Credential::Cookie(session),
                }
            }
        };

        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

fn bearer_token(parts: &Parts) -> Option<SessionToken> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    token.parse().ok()
}

fn forget(session: &Session) {
    if let Err(e) = session.remove::<UserID>(SESSION_USER_KEY) {
        warn!("Could not clear cookie session: {e}");
    }
}
