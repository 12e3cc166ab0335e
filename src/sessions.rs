//! Bearer sessions of API clients: opaque tokens held in memory until
//! they expire or are revoked. Browsers use the cookie session layer
//! instead.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::UserID;

/// Opaque token handed out at login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(transparent)]
pub struct SessionToken(Uuid);

impl std::str::FromStr for SessionToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

struct Session {
    user_id: UserID,
    expires_at: DateTime<Utc>,
}

pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(&self, user_id: UserID) -> SessionToken {
        let token = SessionToken(Uuid::new_v4());
        let session = Session {
            user_id,
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions.write().await.insert(token, session);
        token
    }

    /// The user behind a live token. Expired tokens are dropped on sight.
    pub async fn resolve(&self, token: &SessionToken) -> Option<UserID> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(session) if session.expires_at > now => return Some(session.user_id),
                Some(_) => {}
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    /// Returns whether the token was live
    pub async fn revoke(&self, token: &SessionToken) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Ends every session of a user, returns how many there were
    pub async fn revoke_user(&self, user_id: UserID) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        before - sessions.len()
    }

    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}
