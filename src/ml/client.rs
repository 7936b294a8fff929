use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, instrument};

use super::dto::{
    InputFeatures, ModelInfo, NormalizedPrediction, RiskLevel, UpstreamRequest, UpstreamResponse,
};
use super::recommendations::recommendations;
use crate::config::MlConfig;
use crate::error::ApiError;

const POSITIVE_LABEL: &str = "Diabetes";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum MlError {
    #[error("inference service is not reachable: {0}")]
    ServiceUnavailable(String),
    #[error("inference service error: {0}")]
    Upstream(String),
    #[error("inference service timed out after {0:?}")]
    Timeout(Duration),
}

impl From<MlError> for ApiError {
    fn from(e: MlError) -> Self {
        match e {
            MlError::ServiceUnavailable(_) | MlError::Timeout(_) => {
                ApiError::UpstreamUnavailable(e.to_string())
            }
            MlError::Upstream(_) => ApiError::Upstream(e.to_string()),
        }
    }
}

/// Stateless proxy to the external inference endpoint.
#[derive(Clone)]
pub struct MlClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl MlClient {
    pub fn new(cfg: &MlConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent("diabea/0.1")
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, input))]
    pub async fn predict(&self, input: &InputFeatures) -> Result<NormalizedPrediction, MlError> {
        let url = format!("{}/predict/", self.base_url);
        debug!(%url, "calling inference service");

        let res = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&UpstreamRequest::from(input))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let detail = error_detail(status, &body);
            error!(%status, %detail, "inference service returned an error");
            return Err(MlError::Upstream(detail));
        }

        let raw: UpstreamResponse = res.json().await.map_err(|e| {
            if e.is_timeout() {
                MlError::Timeout(self.timeout)
            } else {
                MlError::Upstream(format!("unreadable response: {e}"))
            }
        })?;

        let result = normalize(raw, input)?;
        info!(
            label = %result.label,
            probability = result.probability,
            risk_level = result.risk_level.as_str(),
            "inference complete"
        );
        Ok(result)
    }

    /// Probes the endpoint root.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), MlError> {
        let res = self
            .client
            .get(format!("{}/", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        if res.status().is_success() {
            Ok(())
        } else {
            Err(MlError::Upstream(format!("health probe returned {}", res.status())))
        }
    }

    fn classify(&self, e: reqwest::Error) -> MlError {
        if e.is_timeout() {
            MlError::Timeout(self.timeout)
        } else if e.is_connect() {
            MlError::ServiceUnavailable(e.to_string())
        } else {
            MlError::Upstream(e.to_string())
        }
    }
}

/// FastAPI-style `{"detail": ...}` when present, else the status reason.
fn error_detail(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned())
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        })
}

pub(crate) fn normalize(
    raw: UpstreamResponse,
    input: &InputFeatures,
) -> Result<NormalizedPrediction, MlError> {
    let probability = raw.probability;
    if !(0.0..=1.0).contains(&probability) {
        return Err(MlError::Upstream(format!(
            "probability {probability} outside [0, 1]"
        )));
    }

    let positive = raw.prediction == POSITIVE_LABEL || raw.raw_output == Some(1);
    let (risk_level, confidence) = if positive {
        (RiskLevel::High, probability)
    } else {
        (RiskLevel::Low, 1.0 - probability)
    };
    let message = format!(
        "{} risk of diabetes with probability {}%",
        if positive { "High" } else { "Low" },
        (confidence * 100.0).round()
    );

    Ok(NormalizedPrediction {
        label: raw.prediction,
        prediction: i32::from(positive),
        probability,
        confidence,
        risk_level,
        message,
        recommendations: recommendations(input, positive),
        model_info: ModelInfo {
            model_type: "MLP Neural Network".into(),
            threshold: 0.5,
            accuracy: None,
        },
        raw_output: raw.raw_output,
        input_data: *input,
    })
}
