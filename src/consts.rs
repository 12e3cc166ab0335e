//! Defaults for the settings read by [`crate::config::AppConfig`].

pub const HTTP_PORT: u16 = 8080;
pub const DATABASE_URL: &str = "sqlite://ems.db";
pub const CASBIN_MODEL: &str = crate::authorization::DEFAULT_MODEL;
pub const CASBIN_POLICY: &str = crate::authorization::DEFAULT_POLICY;
pub const TEMPLATES_DIR: &str = "templates/";
pub const SESSION_TTL_MINUTES: i64 = 8 * 60;
pub const PAGE_REFRESH_SECONDS: u32 = 30;
pub const TELEMEDICINE_BASE_URL: &str = "https://meet.hospital-ems.local/room";

/// Name of the cookie set by the login form
pub const SESSION_COOKIE: &str = "ems_token";
/// Key of the signed-in user in the cookie session
pub const SESSION_USER_KEY: &str = "user_id";
