use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::auth::repo_types::{NewSession, NewUser, Session, User};
use crate::db::{is_unique_violation, PgStore};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, date_of_birth, \
     gender, email_verified, status, login_attempts, locked_until, last_login, created_at, updated_at";

const SESSION_COLUMNS: &str = "user_id, expires_at, is_active";

#[derive(Debug, thiserror::Error)]
pub enum InsertUserError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Round-trip to the datastore, used by the health probe.
    async fn ping(&self) -> anyhow::Result<()>;
    /// Case-insensitive lookup.
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    /// Fails with `DuplicateEmail` when the unique index rejects the row.
    async fn insert(&self, user: NewUser) -> Result<User, InsertUserError>;
    /// Atomically bumps the failure counter and sets `locked_until = now + lock_for`
    /// once it reaches `max_attempts`. An elapsed lock restarts the counter at 1.
    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_for: Duration,
        now: OffsetDateTime,
    ) -> anyhow::Result<User>;
    /// Clears counter and lock, stamps `last_login`.
    async fn record_successful_login(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<User>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: NewSession) -> anyhow::Result<Session>;
    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<Session>>;
    /// Returns how many rows were active before the call.
    async fn deactivate(&self, token: &str) -> anyhow::Result<u64>;
}

#[async_trait]
impl UserStore for PgStore {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, InsertUserError> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, phone, date_of_birth, gender)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(user.date_of_birth)
        .bind(&user.gender)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(u) => Ok(u),
            Err(e) if is_unique_violation(&e) => Err(InsertUserError::DuplicateEmail),
            Err(e) => Err(InsertUserError::Other(e.into())),
        }
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_for: Duration,
        now: OffsetDateTime,
    ) -> anyhow::Result<User> {
        // $3 is "now", $4 the lock deadline. The CASE on the old counter keeps the
        // whole transition inside one statement.
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            WITH next AS (
                SELECT id,
                       CASE WHEN locked_until IS NOT NULL AND locked_until <= $3
                            THEN 1 ELSE login_attempts + 1 END AS attempts
                  FROM users
                 WHERE id = $1
                   FOR UPDATE
            )
            UPDATE users u
               SET login_attempts = next.attempts,
                   locked_until = CASE WHEN next.attempts >= $2 THEN $4
                                       WHEN u.locked_until IS NOT NULL AND u.locked_until <= $3 THEN NULL
                                       ELSE u.locked_until END,
                   updated_at = $3
              FROM next
             WHERE u.id = next.id
            RETURNING {}
            "#,
            prefixed_user_columns("u")
        ))
        .bind(id)
        .bind(max_attempts)
        .bind(now)
        .bind(now + lock_for)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn record_successful_login(&self, id: Uuid, now: OffsetDateTime) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET login_attempts = 0, locked_until = NULL, last_login = $2, updated_at = $2
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }
}

fn prefixed_user_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert(&self, session: NewSession) -> anyhow::Result<Session> {
        let row = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO user_sessions
                (user_id, session_token, refresh_token, device_info, ip_address, user_agent, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.user_id)
        .bind(&session.session_token)
        .bind(&session.refresh_token)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_token(&self, token: &str) -> anyhow::Result<Option<Session>> {
        let row = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM user_sessions WHERE session_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn deactivate(&self, token: &str) -> anyhow::Result<u64> {
        let res = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE WHERE session_token = $1 AND is_active",
        )
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_columns_cover_every_user_column() {
        let cols = prefixed_user_columns("u");
        assert!(cols.starts_with("u.id, u.email"));
        assert!(cols.ends_with("u.updated_at"));
        assert_eq!(cols.matches("u.").count(), USER_COLUMNS.split(',').count());
    }
}
