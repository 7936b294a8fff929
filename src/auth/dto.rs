use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, OffsetDateTime};
use uuid::Uuid;

use crate::auth::{
    repo_types::User,
    services::{is_valid_email, normalize_email, Profile},
    sessions::IssuedSession,
};
use crate::error::ApiError;
use crate::predictions::repo_types::PredictionStats;

pub const MIN_PASSWORD_LEN: usize = 8;
const NAME_MAX: usize = 50;
const EMAIL_MAX: usize = 255;

/// Request body for user registration.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
}

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn blank_to_none(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn canonical_gender(raw: &str) -> Option<&'static str> {
    match raw.to_lowercase().as_str() {
        "male" | "laki-laki" => Some("male"),
        "female" | "perempuan" => Some("female"),
        "other" => Some("other"),
        _ => None,
    }
}

fn check_name(errors: &mut Vec<String>, field: &str, value: &str) -> String {
    let v = value.trim();
    let len = v.chars().count();
    if len == 0 || len > NAME_MAX {
        errors.push(format!("{field} must be between 1 and {NAME_MAX} characters"));
    }
    v.to_string()
}

impl RegisterRequest {
    /// Returns the normalized email and the profile; `today` bounds the birth date.
    pub fn validate(&self, today: Date) -> Result<(String, Profile), ApiError> {
        let mut errors = Vec::new();

        let email = normalize_email(&self.email);
        if !is_valid_email(&email) {
            errors.push("Please provide a valid email address".to_string());
        } else if email.chars().count() > EMAIL_MAX {
            errors.push(format!("email must be at most {EMAIL_MAX} characters"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            ));
        }
        let first_name = check_name(&mut errors, "firstName", &self.first_name);
        let last_name = check_name(&mut errors, "lastName", &self.last_name);

        let phone = blank_to_none(&self.phone).map(str::to_string);
        if let Some(p) = &phone {
            let ok_chars = p
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '));
            if !ok_chars || !(10..=15).contains(&p.chars().count()) {
                errors.push("phone must be 10 to 15 digits".to_string());
            }
        }

        let mut date_of_birth = None;
        if let Some(raw) = blank_to_none(&self.date_of_birth) {
            match Date::parse(raw, format_description!("[year]-[month]-[day]")) {
                Ok(d) if d <= today => date_of_birth = Some(d),
                Ok(_) => errors.push("dateOfBirth cannot be in the future".to_string()),
                Err(_) => errors.push("dateOfBirth must be a date in YYYY-MM-DD format".to_string()),
            }
        }

        let mut gender = None;
        if let Some(raw) = blank_to_none(&self.gender) {
            match canonical_gender(raw) {
                Some(g) => gender = Some(g.to_string()),
                None => errors.push("gender must be male, female or other".to_string()),
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }
        Ok((
            email,
            Profile {
                first_name,
                last_name,
                phone,
                date_of_birth,
                gender,
            },
        ))
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<String, ApiError> {
        let mut errors = Vec::new();
        let email = normalize_email(&self.email);
        if !is_valid_email(&email) {
            errors.push("Please provide a valid email address".to_string());
        } else if email.chars().count() > EMAIL_MAX {
            errors.push(format!("email must be at most {EMAIL_MAX} characters"));
        }
        if self.password.is_empty() {
            errors.push("Password is required".to_string());
        }
        if errors.is_empty() {
            Ok(email)
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    /// `YYYY-MM-DD`.
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
}

fn age_on(dob: Date, today: Date) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month() as u8, today.day()) < (dob.month() as u8, dob.day()) {
        age -= 1;
    }
    age
}

impl ProfileView {
    pub fn of(user: &User, today: Date) -> Self {
        Self {
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            date_of_birth: user.date_of_birth.map(|d| d.to_string()),
            gender: user.gender.clone(),
            age: user.date_of_birth.map(|d| age_on(d, today)),
        }
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub email_verified: bool,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub profile: ProfileView,
}

impl PublicUser {
    pub fn of(user: &User, today: Date) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            email_verified: user.email_verified,
            status: user.status.clone(),
            last_login: user.last_login,
            created_at: user.created_at,
            profile: ProfileView::of(user, today),
        }
    }
}

/// Returned by register and login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: PublicUser,
    pub token: String,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthResponse {
    pub fn new(message: &'static str, user: &User, session: IssuedSession, today: Date) -> Self {
        Self {
            message,
            user: PublicUser::of(user, today),
            token: session.session_token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: PublicUser,
    pub profile: ProfileView,
    pub stats: PredictionStats,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
