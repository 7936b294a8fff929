use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::auth::{
    jwt::{JwtKeys, TokenError},
    password::random_token,
    repo::{SessionStore, UserStore},
    repo_types::{NewSession, User},
};
use crate::error::{ApiError, AuthFailure};

/// Where a session was opened from. All fields are opaque to the server.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_token: String,
    pub refresh_token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session token")]
    InvalidToken,
    #[error("session token expired")]
    ExpiredToken,
    #[error("session revoked or expired")]
    SessionRevoked,
    #[error("session subject no longer exists")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidToken => ApiError::Unauthorized(AuthFailure::InvalidToken),
            SessionError::ExpiredToken => ApiError::Unauthorized(AuthFailure::ExpiredToken),
            SessionError::SessionRevoked => ApiError::Unauthorized(AuthFailure::SessionRevoked),
            SessionError::UserNotFound => ApiError::Unauthorized(AuthFailure::UserNotFound),
            SessionError::Store(e) => ApiError::Internal(e),
        }
    }
}

/// Issues, validates and revokes session tokens.
///
/// The signed token proves integrity and binds the subject; the stored row
/// decides whether the session is still live, so logout takes effect before
/// the token's own expiry.
#[derive(Clone)]
pub struct SessionManager {
    keys: JwtKeys,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(keys: JwtKeys, users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            keys,
            users,
            sessions,
        }
    }

    /// Opens a new session. Earlier sessions of the same user stay valid.
    #[instrument(skip(self, user, meta), fields(user_id = %user.id))]
    pub async fn create(&self, user: &User, meta: &ClientMeta) -> anyhow::Result<IssuedSession> {
        let (session_token, expires_at) = self.keys.sign(user.id)?;
        let refresh_token = random_token(32);

        self.sessions
            .insert(NewSession {
                user_id: user.id,
                session_token: session_token.clone(),
                refresh_token: refresh_token.clone(),
                device_info: meta.device_info.clone(),
                ip_address: meta.ip.clone(),
                user_agent: meta.user_agent.clone(),
                expires_at,
            })
            .await?;

        info!(%expires_at, "session created");
        Ok(IssuedSession {
            session_token,
            refresh_token,
            expires_at,
        })
    }

    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<User, SessionError> {
        let claims = self.keys.verify(token).map_err(|e| match e {
            TokenError::Expired => SessionError::ExpiredToken,
            TokenError::Invalid => SessionError::InvalidToken,
        })?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(SessionError::UserNotFound)?;

        let now = OffsetDateTime::now_utc();
        match self.sessions.find_by_token(token).await? {
            Some(session) if session.user_id == user.id && session.is_live_at(now) => {
                debug!(user_id = %user.id, "session valid");
                Ok(user)
            }
            _ => {
                warn!(user_id = %user.id, "session inactive or expired");
                Err(SessionError::SessionRevoked)
            }
        }
    }

    /// Marks the session inactive. Revoking twice is not an error.
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> anyhow::Result<()> {
        let changed = self.sessions.deactivate(token).await?;
        debug!(changed, "session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::NewUser;
    use crate::config::JwtConfig;
    use crate::memory::MemoryStore;
    use time::Duration;
    use uuid::Uuid;

    fn keys() -> JwtKeys {
        JwtKeys::from(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test".into(),
            audience: "test".into(),
            ttl_minutes: 60,
        })
    }

    async fn setup() -> (SessionManager, Arc<MemoryStore>, User) {
        let store = Arc::new(MemoryStore::default());
        let user = UserStore::insert(
            store.as_ref(),
            NewUser {
                email: "ana@example.com".into(),
                password_hash: "unused".into(),
                first_name: "Ana".into(),
                last_name: "Lim".into(),
                phone: None,
                date_of_birth: None,
                gender: None,
            },
        )
        .await
        .unwrap();
        let manager = SessionManager::new(keys(), store.clone(), store.clone());
        (manager, store, user)
    }

    #[tokio::test]
    async fn created_session_validates_to_its_user() {
        let (manager, _, user) = setup().await;
        let issued = manager.create(&user, &ClientMeta::default()).await.unwrap();
        assert_eq!(issued.refresh_token.len(), 64);
        assert_ne!(issued.refresh_token, issued.session_token);
        assert!(issued.expires_at > OffsetDateTime::now_utc());

        let resolved = manager.validate(&issued.session_token).await.unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn revoked_session_fails_before_token_expiry() {
        let (manager, _, user) = setup().await;
        let issued = manager.create(&user, &ClientMeta::default()).await.unwrap();
        manager.revoke(&issued.session_token).await.unwrap();

        for _ in 0..2 {
            let err = manager.validate(&issued.session_token).await.unwrap_err();
            assert!(matches!(err, SessionError::SessionRevoked));
        }
        // idempotent
        manager.revoke(&issued.session_token).await.unwrap();
    }

    #[tokio::test]
    async fn multiple_sessions_coexist_and_revoke_independently() {
        let (manager, _, user) = setup().await;
        let first = manager.create(&user, &ClientMeta::default()).await.unwrap();
        let second = manager.create(&user, &ClientMeta::default()).await.unwrap();
        manager.revoke(&first.session_token).await.unwrap();

        assert!(manager.validate(&first.session_token).await.is_err());
        assert!(manager.validate(&second.session_token).await.is_ok());
    }

    #[tokio::test]
    async fn failure_kinds_are_distinguished() {
        let (manager, store, user) = setup().await;

        let err = manager.validate("garbage").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidToken));

        let issued_long_ago = OffsetDateTime::now_utc() - Duration::hours(2);
        let (expired, _) = keys().sign_at(user.id, issued_long_ago).unwrap();
        let err = manager.validate(&expired).await.unwrap_err();
        assert!(matches!(err, SessionError::ExpiredToken));

        let (ghost, _) = keys().sign(Uuid::new_v4()).unwrap();
        let err = manager.validate(&ghost).await.unwrap_err();
        assert!(matches!(err, SessionError::UserNotFound));

        // signed correctly but never stored
        let (unstored, _) = keys().sign(user.id).unwrap();
        let err = manager.validate(&unstored).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionRevoked));

        // stored row expired while the token is still inside its own ttl
        let issued = manager.create(&user, &ClientMeta::default()).await.unwrap();
        store.expire_session(&issued.session_token);
        let err = manager.validate(&issued.session_token).await.unwrap_err();
        assert!(matches!(err, SessionError::SessionRevoked));
    }

    #[tokio::test]
    async fn session_row_keeps_client_metadata() {
        let (manager, store, user) = setup().await;
        let meta = ClientMeta {
            ip: Some("10.0.0.7".into()),
            user_agent: Some("curl/8".into()),
            device_info: Some(serde_json::json!({"platform": "Linux"})),
        };
        let issued = manager.create(&user, &meta).await.unwrap();
        let (row, active) = store.session(&issued.session_token).unwrap();
        assert_eq!(row.user_id, user.id);
        assert_eq!(row.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(row.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(row.device_info, meta.device_info);
        assert_eq!(row.refresh_token, issued.refresh_token);
        assert_eq!(row.expires_at, issued.expires_at);
        assert!(active);
    }
}
