//! HTTP layer: JSON API routes, server-rendered pages and the session
//! extractor guarding them.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use handlebars::Handlebars;

use crate::authorization::Enforcer;
use crate::config::AppConfig;
use crate::db::Database;
use crate::services::Service;
use crate::sessions::SessionStore;

pub mod error;
mod handlers_api;
mod handlers_pages;
pub mod middlewares;
pub mod router;

pub use error::AppError;

pub struct AppState {
    pub service: Service,
    pub templates: Handlebars<'static>,
    pub page_refresh_seconds: u32,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: &AppConfig, db: Database, enforcer: Enforcer) -> Result<SharedState> {
        let mut templates = Handlebars::new();
        templates
            .register_templates_directory(".hbs", &config.templates_dir)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Could not register templates from {}", config.templates_dir))?;

        let sessions = SessionStore::new(chrono::Duration::minutes(config.session_ttl_minutes));
        let service = Service::new(db, enforcer, sessions, &config.telemedicine_base_url);

        Ok(Arc::new(AppState {
            service,
            templates,
            page_refresh_seconds: config.page_refresh_seconds,
        }))
    }
}
