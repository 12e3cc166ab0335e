//! Settings from the environment, `.env` included.

use std::{env, str::FromStr};

use anyhow::{bail, Context, Result};

use crate::consts;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_port: u16,
    pub database_url: String,
    pub casbin_model: String,
    pub casbin_policy: String,
    pub templates_dir: String,
    pub session_ttl_minutes: i64,
    pub page_refresh_seconds: u32,
    pub telemedicine_base_url: String,
    /// Both set, or no bootstrap account
    pub admin_credentials: Option<(String, String)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_port: consts::HTTP_PORT,
            database_url: consts::DATABASE_URL.to_owned(),
            casbin_model: consts::CASBIN_MODEL.to_owned(),
            casbin_policy: consts::CASBIN_POLICY.to_owned(),
            templates_dir: consts::TEMPLATES_DIR.to_owned(),
            session_ttl_minutes: consts::SESSION_TTL_MINUTES,
            page_refresh_seconds: consts::PAGE_REFRESH_SECONDS,
            telemedicine_base_url: consts::TELEMEDICINE_BASE_URL.to_owned(),
            admin_credentials: None,
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the `EMS_*` variables
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let session_ttl_minutes = number(&lookup, "EMS_SESSION_TTL_MINUTES", defaults.session_ttl_minutes)?;
        if session_ttl_minutes <= 0 {
            bail!("EMS_SESSION_TTL_MINUTES must be positive");
        }

        let admin_credentials = match (
            lookup("EMS_ADMIN_USERNAME").filter(|v| !v.trim().is_empty()),
            lookup("EMS_ADMIN_PASSWORD").filter(|v| !v.is_empty()),
        ) {
            (Some(username), Some(password)) => Some((username.trim().to_owned(), password)),
            (None, None) => None,
            _ => bail!("EMS_ADMIN_USERNAME and EMS_ADMIN_PASSWORD must be set together"),
        };

        Ok(Self {
            http_port: number(&lookup, "EMS_HTTP_PORT", defaults.http_port)?,
            database_url: text("DATABASE_URL", defaults.database_url),
            casbin_model: text("EMS_CASBIN_MODEL", defaults.casbin_model),
            casbin_policy: text("EMS_CASBIN_POLICY", defaults.casbin_policy),
            templates_dir: text("EMS_TEMPLATES_DIR", defaults.templates_dir),
            session_ttl_minutes,
            page_refresh_seconds: number(&lookup, "EMS_PAGE_REFRESH_SECONDS", defaults.page_refresh_seconds)?,
            telemedicine_base_url: text("EMS_TELEMEDICINE_BASE_URL", defaults.telemedicine_base_url),
            admin_credentials,
        })
    }
}

fn number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is not a valid number: {raw:?}")),
        _ => Ok(default),
    }
}
