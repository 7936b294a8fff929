use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, never exposed
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Option<String>,
    pub email_verified: bool,
    pub status: String,
    pub login_attempts: i32,
    pub locked_until: Option<OffsetDateTime>,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_locked_at(&self, now: OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }
}

/// Validated registration data, password already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<Date>,
    pub gender: Option<String>,
}

/// The part of a stored session that decides whether it still admits
/// requests. Revocation flips `is_active`; rows are never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
    pub is_active: bool,
}

impl Session {
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.is_active && now < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub session_token: String,
    pub refresh_token: String,
    pub device_info: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: OffsetDateTime,
}
