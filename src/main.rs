//! Entry point: reads the configuration, opens the database, loads the
//! access control policy and serves the application until Ctrl+C.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use hospital_ems::authorization::Enforcer;
use hospital_ems::backend::{router::get_router, AppState, SharedState};
use hospital_ems::config::AppConfig;
use hospital_ems::db::Database;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;

    let db = Database::open(&config.database_url)
        .await
        .with_context(|| format!("Could not open database {}", config.database_url))?;
    let enforcer = Enforcer::load(&config.casbin_model, &config.casbin_policy)
        .await
        .map_err(|e| anyhow!("Could not load access control policy: {e}"))?;

    let state = AppState::new(&config, db, enforcer)?;

    match &config.admin_credentials {
        Some((username, password)) => {
            if state.service.bootstrap_admin(username, password).await?.is_none() {
                info!("Accounts already exist, administrator bootstrap skipped");
            }
        }
        None => warn!("No administrator credentials configured"),
    }

    tokio::spawn(purge_sessions(state.clone()));

    let app = get_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to open web server listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    state.service.db().shutdown().await;
    Ok(())
}

async fn purge_sessions(state: SharedState) {
    let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        let purged = state.service.sessions().purge_expired().await;
        if purged > 0 {
            info!("Purged {purged} expired sessions");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
