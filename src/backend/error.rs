//! Maps service failures to HTTP status codes and a `{"error": ...}` body.
//! Storage and hashing failures are logged and reported without details.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::db::DBError;
use crate::services::{LoginError, ServiceError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Login(#[from] LoginError),

    #[error("Rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),

    #[error("Session store failed: {0}")]
    Session(String),
}

const INTERNAL: &str = "Internal server error";

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Service(e) => match e {
                ServiceError::Unauthenticated => (StatusCode::UNAUTHORIZED, e.to_string()),
                ServiceError::AccessDenied(_) => (StatusCode::FORBIDDEN, e.to_string()),
                ServiceError::Invalid(_) | ServiceError::WeakPassword(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                ServiceError::InvalidTransition { .. } | ServiceError::Conflict(_) => {
                    (StatusCode::CONFLICT, e.to_string())
                }
                ServiceError::Db(db) => match db {
                    DBError::NotFound { .. } => (StatusCode::NOT_FOUND, db.to_string()),
                    DBError::Conflict(_) => (StatusCode::CONFLICT, db.to_string()),
                    DBError::Sqlx(_) | DBError::Migrate(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
                    }
                },
                ServiceError::Hashing => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned()),
            },
            AppError::Login(LoginError::InvalidCredentials) => {
                (StatusCode::UNAUTHORIZED, LoginError::InvalidCredentials.to_string())
            }
            AppError::Login(LoginError::Db(_)) | AppError::Render(_) | AppError::Session(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
            }
        }
    }
}

impl From<DBError> for AppError {
    fn from(error: DBError) -> Self {
        AppError::Service(error.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("Request failed: {self:?}");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
