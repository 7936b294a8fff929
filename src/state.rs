use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;

use crate::auth::{
    jwt::JwtKeys,
    rate_limit::RateLimiter,
    repo::{SessionStore, UserStore},
    services::Credentials,
    sessions::SessionManager,
};
use crate::config::AppConfig;
use crate::db::PgStore;
use crate::ml::MlClient;
use crate::predictions::{repo::PredictionStore, services::PredictionRecorder};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub predictions: Arc<dyn PredictionStore>,
    pub ml: MlClient,
    pub limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    /// Connects to Postgres and applies pending migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(PgStore::connect(&config).await?);
        store.migrate().await?;
        Ok(Self::from_parts(config, store.clone(), store.clone(), store))
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        predictions: Arc<dyn PredictionStore>,
    ) -> Self {
        Self {
            ml: MlClient::new(&config.ml),
            limiter: Arc::new(RateLimiter::new(&config.auth_rate_limit)),
            config: Arc::new(config),
            users,
            sessions,
            predictions,
            started_at: Instant::now(),
        }
    }

    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(
            JwtKeys::from_ref(self),
            self.users.clone(),
            self.sessions.clone(),
        )
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.users.clone(), self.config.password_hash_cost)
    }

    pub fn recorder(&self) -> PredictionRecorder {
        PredictionRecorder::new(self.predictions.clone())
    }

    /// State over a fresh in-memory store; the ML endpoint is `ml_base_url`.
    #[cfg(test)]
    pub fn fake(ml_base_url: &str) -> (Self, Arc<crate::memory::MemoryStore>) {
        use crate::config::{JwtConfig, MlConfig, RateLimitConfig};

        let config = AppConfig {
            database_url: "postgres://unused".into(),
            db_max_connections: 1,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 60,
            },
            password_hash_cost: 1,
            ml: MlConfig {
                base_url: ml_base_url.into(),
                timeout_secs: 5,
            },
            cors_origins: vec!["*".into()],
            auth_rate_limit: RateLimitConfig {
                max_attempts: 100,
                window_secs: 60,
            },
            trusted_proxy_hops: 1,
            environment: "test".into(),
        };
        let store = Arc::new(crate::memory::MemoryStore::default());
        let state = Self::from_parts(config, store.clone(), store.clone(), store.clone());
        (state, store)
    }
}
