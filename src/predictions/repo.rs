use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::PgStore;
use crate::predictions::repo_types::{NewPrediction, PredictionRecord, PredictionStats};

const PREDICTION_COLUMNS: &str = "id, user_id, age, glucose, blood_pressure, bmi, insulin, \
     skin_thickness, diabetes_pedigree_function, pregnancies, prediction_result, probability, \
     confidence, risk_level, model_version, model_accuracy, ip_address, user_agent, device_info, \
     predicted_at, created_at";

#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Plain insert; concurrent calls never overwrite each other.
    async fn insert(&self, p: NewPrediction) -> anyhow::Result<PredictionRecord>;
    /// Newest first.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<PredictionRecord>>;
    async fn count_by_user(&self, user_id: Uuid) -> anyhow::Result<i64>;
    async fn stats_by_user(&self, user_id: Uuid) -> anyhow::Result<PredictionStats>;
    async fn find_owned(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<PredictionRecord>>;
    /// Deletes only when `id` belongs to `user_id`; false otherwise.
    async fn delete_owned(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
impl PredictionStore for PgStore {
    async fn insert(&self, p: NewPrediction) -> anyhow::Result<PredictionRecord> {
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query_as::<_, PredictionRecord>(&format!(
            r#"
            INSERT INTO prediction_history
                (user_id, age, glucose, blood_pressure, bmi, insulin, skin_thickness,
                 diabetes_pedigree_function, pregnancies, prediction_result, probability,
                 confidence, risk_level, model_version, model_accuracy, ip_address, user_agent,
                 device_info, predicted_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $19)
            RETURNING {PREDICTION_COLUMNS}
            "#
        ))
        .bind(p.user_id)
        .bind(p.input.age)
        .bind(p.input.glucose)
        .bind(p.input.blood_pressure)
        .bind(p.input.bmi)
        .bind(p.input.insulin)
        .bind(p.input.skin_thickness)
        .bind(p.input.diabetes_pedigree_function)
        .bind(p.input.pregnancies)
        .bind(p.prediction_result)
        .bind(p.probability)
        .bind(p.confidence)
        .bind(&p.risk_level)
        .bind(&p.model_version)
        .bind(p.model_accuracy)
        .bind(&p.ip_address)
        .bind(&p.user_agent)
        .bind(&p.device_info)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRecord>(&format!(
            r#"
            SELECT {PREDICTION_COLUMNS}
              FROM prediction_history
             WHERE user_id = $1
             ORDER BY predicted_at DESC, id DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_by_user(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM prediction_history WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(total)
    }

    async fn stats_by_user(&self, user_id: Uuid) -> anyhow::Result<PredictionStats> {
        let stats = sqlx::query_as::<_, PredictionStats>(
            r#"
            SELECT COUNT(*)                                          AS total_predictions,
                   COUNT(*) FILTER (WHERE risk_level = 'High')       AS high_risk_count,
                   COUNT(*) FILTER (WHERE risk_level = 'Moderate')   AS moderate_risk_count,
                   COUNT(*) FILTER (WHERE risk_level = 'Low')        AS low_risk_count,
                   COUNT(*) FILTER (WHERE prediction_result = 1)     AS positive_predictions,
                   COUNT(*) FILTER (WHERE prediction_result = 0)     AS negative_predictions,
                   AVG(probability)::DOUBLE PRECISION                AS avg_probability,
                   MAX(predicted_at)                                 AS last_prediction
              FROM prediction_history
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn find_owned(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<PredictionRecord>> {
        let row = sqlx::query_as::<_, PredictionRecord>(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM prediction_history WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_owned(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM prediction_history WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
