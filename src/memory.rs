//! In-process store backing the unit and router tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use anyhow::anyhow;
use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::auth::{
    repo::{InsertUserError, SessionStore, UserStore},
    repo_types::{NewSession, NewUser, Session, User},
};
use crate::predictions::{
    repo::PredictionStore,
    repo_types::{NewPrediction, PredictionRecord, PredictionStats},
};

/// Widths of the bounded columns in `migrations/`; inserts past them fail
/// here as they would in Postgres.
const EMAIL_WIDTH: usize = 255;
const IP_ADDRESS_WIDTH: usize = 64;

fn check_width(column: &str, value: Option<&str>, width: usize) -> anyhow::Result<()> {
    match value {
        Some(v) if v.chars().count() > width => Err(anyhow!(
            "value too long for {column}: {} > {width}",
            v.chars().count()
        )),
        _ => Ok(()),
    }
}

struct SessionRow {
    stored: NewSession,
    is_active: bool,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<SessionRow>,
    /// Insertion order; listings walk it backwards.
    predictions: Vec<PredictionRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_prediction_writes: AtomicBool,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn user(&self, id: Uuid) -> Option<User> {
        let t = self.tables.lock().unwrap();
        t.users.iter().find(|u| u.id == id).cloned()
    }

    pub fn set_locked_until(&self, id: Uuid, until: Option<OffsetDateTime>) {
        let mut t = self.tables.lock().unwrap();
        if let Some(u) = t.users.iter_mut().find(|u| u.id == id) {
            u.locked_until = until;
        }
    }

    /// Pushes the stored expiry into the past without touching the token.
    pub fn expire_session(&self, token: &str) {
        let mut t = self.tables.lock().unwrap();
        if let Some(s) = t.sessions.iter_mut().find(|s| s.stored.session_token == token) {
            s.stored.expires_at = OffsetDateTime::now_utc() - Duration::seconds(1);
        }
    }

    /// The full stored row for `token` and whether it is still active.
    pub fn session(&self, token: &str) -> Option<(NewSession, bool)> {
        let t = self.tables.lock().unwrap();
        t.sessions
            .iter()
            .find(|s| s.stored.session_token == token)
            .map(|s| (s.stored.clone(), s.is_active))
    }

    pub fn fail_prediction_writes(&self, fail: bool) {
        self.fail_prediction_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `ping` fail, as a lost database connection would.
    pub fn set_unreachable(&self, down: bool) {
        self.unreachable.store(down, Ordering::SeqCst);
    }

    pub fn prediction_count(&self) -> usize {
        self.tables.lock().unwrap().predictions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn ping(&self) -> anyhow::Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.user(id))
    }

    async fn insert(&self, user: NewUser) -> Result<User, InsertUserError> {
        check_width("users.email", Some(user.email.as_str()), EMAIL_WIDTH)?;
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(InsertUserError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            date_of_birth: user.date_of_birth,
            gender: user.gender,
            email_verified: false,
            status: "active".into(),
            login_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_for: Duration,
        now: OffsetDateTime,
    ) -> anyhow::Result<User> {
        let mut t = self.tables.lock().unwrap();
        let u = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow!("no user {id}"))?;
        let elapsed = u.locked_until.is_some_and(|until| until <= now);
        u.login_attempts = if elapsed { 1 } else { u.login_attempts + 1 };
        if u.login_attempts >= max_attempts {
            u.locked_until = Some(now + lock_for);
        } else if elapsed {
            u.locked_until = None;
        }
        u.updated_at = now;
        Ok(u.clone())
    }

    async fn record_successful_login(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<User> {
        let mut t = self.tables.lock().unwrap();
        let u = t
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow!("no user {id}"))?;
        u.login_attempts = 0;
        u.locked_until = None;
        u.last_login = Some(now);
        u.updated_at = now;
        Ok(u.clone())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: NewSession) -> anyhow::Result<Session> {
        check_width("user_sessions.ip_address", session.ip_address.as_deref(), IP_ADDRESS_WIDTH)?;
        let mut t = self.tables.lock().unwrap();
        if t.sessions.iter().any(|s| s.stored.session_token == session.session_token) {
            return Err(anyhow!("duplicate session token"));
        }
        let row = Session {
            user_id: session.user_id,
            expires_at: session.expires_at,
            is_active: true,
        };
        t.sessions.push(SessionRow {
            stored: session,
            is_active: true,
        });
        Ok(row)
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<Session>> {
        let t = self.tables.lock().unwrap();
        Ok(t.sessions
            .iter()
            .find(|s| s.stored.session_token == token)
            .map(|s| Session {
                user_id: s.stored.user_id,
                expires_at: s.stored.expires_at,
                is_active: s.is_active,
            }))
    }

    async fn deactivate(&self, token: &str) -> anyhow::Result<u64> {
        let mut t = self.tables.lock().unwrap();
        let mut n = 0;
        for s in t
            .sessions
            .iter_mut()
            .filter(|s| s.stored.session_token == token && s.is_active)
        {
            s.is_active = false;
            n += 1;
        }
        Ok(n)
    }
}

#[async_trait]
impl PredictionStore for MemoryStore {
    async fn insert(&self, p: NewPrediction) -> anyhow::Result<PredictionRecord> {
        if self.fail_prediction_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("prediction_history is unavailable"));
        }
        check_width("prediction_history.ip_address", p.ip_address.as_deref(), IP_ADDRESS_WIDTH)?;
        let now = OffsetDateTime::now_utc();
        let row = PredictionRecord {
            id: Uuid::new_v4(),
            user_id: p.user_id,
            age: p.input.age,
            glucose: p.input.glucose,
            blood_pressure: p.input.blood_pressure,
            bmi: p.input.bmi,
            insulin: p.input.insulin,
            skin_thickness: p.input.skin_thickness,
            diabetes_pedigree_function: p.input.diabetes_pedigree_function,
            pregnancies: p.input.pregnancies,
            prediction_result: p.prediction_result,
            probability: p.probability,
            confidence: p.confidence,
            risk_level: p.risk_level,
            model_version: p.model_version,
            model_accuracy: p.model_accuracy,
            ip_address: p.ip_address,
            user_agent: p.user_agent,
            device_info: p.device_info,
            predicted_at: now,
            created_at: now,
        };
        self.tables.lock().unwrap().predictions.push(row.clone());
        Ok(row)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<PredictionRecord>> {
        let t = self.tables.lock().unwrap();
        Ok(t.predictions
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .skip(usize::try_from(offset)?)
            .take(usize::try_from(limit)?)
            .cloned()
            .collect())
    }

    async fn count_by_user(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let t = self.tables.lock().unwrap();
        Ok(t.predictions.iter().filter(|p| p.user_id == user_id).count() as i64)
    }

    async fn stats_by_user(&self, user_id: Uuid) -> anyhow::Result<PredictionStats> {
        let t = self.tables.lock().unwrap();
        let mut stats = PredictionStats::default();
        let mut sum = 0.0;
        for p in t.predictions.iter().filter(|p| p.user_id == user_id) {
            stats.total_predictions += 1;
            match p.risk_level.as_str() {
                "High" => stats.high_risk_count += 1,
                "Moderate" => stats.moderate_risk_count += 1,
                "Low" => stats.low_risk_count += 1,
                _ => {}
            }
            match p.prediction_result {
                1 => stats.positive_predictions += 1,
                0 => stats.negative_predictions += 1,
                _ => {}
            }
            sum += p.probability;
            stats.last_prediction = stats.last_prediction.max(Some(p.predicted_at));
        }
        if stats.total_predictions > 0 {
            stats.avg_probability = Some(sum / stats.total_predictions as f64);
        }
        Ok(stats)
    }

    async fn find_owned(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<PredictionRecord>> {
        let t = self.tables.lock().unwrap();
        Ok(t.predictions
            .iter()
            .find(|p| p.id == id && p.user_id == user_id)
            .cloned())
    }

    async fn delete_owned(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().unwrap();
        let before = t.predictions.len();
        t.predictions.retain(|p| !(p.id == id && p.user_id == user_id));
        Ok(t.predictions.len() < before)
    }
}
