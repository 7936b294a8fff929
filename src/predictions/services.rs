use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::sessions::ClientMeta;
use crate::error::ApiError;
use crate::ml::dto::{InputFeatures, NormalizedPrediction};
use crate::predictions::{
    repo::PredictionStore,
    repo_types::{NewPrediction, PredictionRecord, PredictionStats},
};

#[derive(Clone)]
pub struct PredictionRecorder {
    store: Arc<dyn PredictionStore>,
}

impl PredictionRecorder {
    pub fn new(store: Arc<dyn PredictionStore>) -> Self {
        Self { store }
    }

    /// Best effort: a storage failure is logged and yields `None` so the
    /// inference result still reaches the caller.
    #[instrument(skip(self, input, result, meta))]
    pub async fn record(
        &self,
        user_id: Uuid,
        input: &InputFeatures,
        result: &NormalizedPrediction,
        meta: &ClientMeta,
    ) -> Option<PredictionRecord> {
        let new = NewPrediction {
            user_id,
            input: *input,
            prediction_result: result.prediction,
            probability: result.probability,
            confidence: result.confidence,
            risk_level: result.risk_level.as_str().to_string(),
            model_version: result.model_info.model_type.clone(),
            model_accuracy: result.model_info.accuracy,
            ip_address: meta.ip.clone(),
            user_agent: meta.user_agent.clone(),
            device_info: meta.device_info.clone(),
        };

        match self.store.insert(new).await {
            Ok(record) => {
                info!(prediction_id = %record.id, risk_level = %record.risk_level, "prediction saved");
                Some(record)
            }
            Err(e) => {
                error!(error = ?e, "failed to save prediction; returning result anyway");
                None
            }
        }
    }

    /// Page `page` (1-based) of `page_size` records, newest first, with the total count.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        user_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> anyhow::Result<(Vec<PredictionRecord>, i64)> {
        let offset = (page.max(1) - 1).saturating_mul(page_size);
        let records = self.store.list_by_user(user_id, page_size, offset).await?;
        let total = self.store.count_by_user(user_id).await?;
        Ok((records, total))
    }

    pub async fn stats(&self, user_id: Uuid) -> anyhow::Result<PredictionStats> {
        self.store.stats_by_user(user_id).await
    }

    pub async fn recent(&self, user_id: Uuid, n: i64) -> anyhow::Result<Vec<PredictionRecord>> {
        self.store.list_by_user(user_id, n, 0).await
    }

    /// Another user's record is reported exactly like a missing one.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, record_id: Uuid) -> Result<(), ApiError> {
        if self.store.find_owned(user_id, record_id).await?.is_none()
            || !self.store.delete_owned(user_id, record_id).await?
        {
            warn!("prediction not found or not owned");
            return Err(ApiError::NotFound(
                "Prediction not found or does not belong to user".into(),
            ));
        }
        info!("prediction deleted");
        Ok(())
    }
}
