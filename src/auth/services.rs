use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use crate::auth::{
    password::{hash_password, verify_against_dummy, verify_password},
    repo::{InsertUserError, UserStore},
    repo_types::{NewUser, User},
};
use crate::error::{ApiError, AuthFailure};

/// Consecutive failures that lock an account.
pub const MAX_LOGIN_ATTEMPTS: i32 = 5;
/// How long a lock lasts.
pub const LOCK_DURATION: Duration = Duration::minutes(30);

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("email already registered")]
    DuplicateEmail,
    /// Same variant for unknown email and wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account temporarily locked")]
    AccountLocked,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::DuplicateEmail => {
                ApiError::Conflict("A user with this email address already exists".into())
            }
            CredentialError::InvalidCredentials => {
                ApiError::Unauthorized(AuthFailure::InvalidCredentials)
            }
            CredentialError::AccountLocked => ApiError::AccountLocked,
            CredentialError::Store(e) => ApiError::Internal(e),
        }
    }
}

/// Profile fields supplied at registration, already validated.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<time::Date>,
    pub gender: Option<String>,
}

/// Account creation and password authentication with lockout.
#[derive(Clone)]
pub struct Credentials {
    users: Arc<dyn UserStore>,
    hash_cost: u32,
}

impl Credentials {
    pub fn new(users: Arc<dyn UserStore>, hash_cost: u32) -> Self {
        Self { users, hash_cost }
    }

    #[instrument(skip(self, password, profile))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        profile: Profile,
    ) -> Result<User, CredentialError> {
        let email = normalize_email(email);

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(email = %email, "email already registered");
            return Err(CredentialError::DuplicateEmail);
        }

        let password_hash = hash_password(password, self.hash_cost)?;

        let new_user = NewUser {
            email,
            password_hash,
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone: profile.phone,
            date_of_birth: profile.date_of_birth,
            gender: profile.gender,
        };

        // A concurrent registration can still win the race past the check above.
        let user = match self.users.insert(new_user).await {
            Ok(u) => u,
            Err(InsertUserError::DuplicateEmail) => {
                warn!("email registered concurrently");
                return Err(CredentialError::DuplicateEmail);
            }
            Err(InsertUserError::Other(e)) => return Err(CredentialError::Store(e)),
        };

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// The lock is checked before the password so that a locked account does
    /// no hash work and reveals nothing about the password.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let email = normalize_email(email);
        let now = OffsetDateTime::now_utc();

        let Some(user) = self.users.find_by_email(&email).await? else {
            verify_against_dummy(password, self.hash_cost);
            warn!(email = %email, "login unknown email");
            return Err(CredentialError::InvalidCredentials);
        };

        if user.is_locked_at(now) {
            warn!(user_id = %user.id, "login attempt on locked account");
            return Err(CredentialError::AccountLocked);
        }

        if !verify_password(password, &user.password_hash)? {
            let updated = self
                .users
                .record_failed_login(user.id, MAX_LOGIN_ATTEMPTS, LOCK_DURATION, now)
                .await?;
            if updated.is_locked_at(now) {
                warn!(user_id = %user.id, attempts = updated.login_attempts, "account locked");
            } else {
                warn!(user_id = %user.id, attempts = updated.login_attempts, "login invalid password");
            }
            return Err(CredentialError::InvalidCredentials);
        }

        let user = self.users.record_successful_login(user.id, now).await?;
        info!(user_id = %user.id, "user authenticated");
        Ok(user)
    }
}
