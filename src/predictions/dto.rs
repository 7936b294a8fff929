use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::dto::PublicUser;
use crate::error::ApiError;
use crate::ml::dto::{InputFeatures, NormalizedPrediction};
use crate::predictions::repo_types::{PredictionRecord, PredictionStats};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw body of `POST /prediction/diabetes`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub age: Option<f64>,
    pub glucose: Option<f64>,
    pub blood_pressure: Option<f64>,
    pub bmi: Option<f64>,
    pub insulin: Option<f64>,
    pub skin_thickness: Option<f64>,
    pub diabetes_pedigree_function: Option<f64>,
    pub pregnancies: Option<f64>,
}

fn check(
    errors: &mut Vec<String>,
    name: &str,
    value: Option<f64>,
    required: bool,
    min: f64,
    max: f64,
) -> f64 {
    match value {
        None if required => {
            errors.push(format!("{name} is required"));
            0.0
        }
        None => 0.0,
        Some(v) if !v.is_finite() || v < min || v > max => {
            errors.push(format!("{name} must be between {min} and {max}"));
            0.0
        }
        Some(v) => v,
    }
}

impl PredictionRequest {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<InputFeatures, ApiError> {
        let mut errors = Vec::new();
        let age = check(&mut errors, "age", self.age, true, 1.0, 120.0);
        let glucose = check(&mut errors, "glucose", self.glucose, true, 0.0, 300.0);
        let blood_pressure = check(&mut errors, "bloodPressure", self.blood_pressure, true, 0.0, 250.0);
        let bmi = check(&mut errors, "bmi", self.bmi, true, 10.0, 70.0);
        let insulin = check(&mut errors, "insulin", self.insulin, false, 0.0, 1000.0);
        let skin_thickness = check(&mut errors, "skinThickness", self.skin_thickness, false, 0.0, 100.0);
        let diabetes_pedigree_function = check(
            &mut errors,
            "diabetesPedigreeFunction",
            self.diabetes_pedigree_function,
            false,
            0.0,
            5.0,
        );
        let pregnancies = check(&mut errors, "pregnancies", self.pregnancies, false, 0.0, 20.0);
        if pregnancies.fract() != 0.0 {
            errors.push("pregnancies must be a whole number".into());
        }

        if !errors.is_empty() {
            return Err(ApiError::validation(errors));
        }
        Ok(InputFeatures {
            age,
            glucose,
            blood_pressure,
            bmi,
            insulin,
            skin_thickness,
            diabetes_pedigree_function,
            pregnancies: pregnancies as i32,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    #[serde(flatten)]
    pub result: NormalizedPrediction,
    /// Absent when the record could not be stored.
    pub record_id: Option<Uuid>,
    pub saved: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Query string of the history endpoint. Kept as text so bad values
/// produce the same 400 body as every other validation failure.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    /// (page, limit) with defaults applied.
    pub fn resolve(&self) -> Result<(i64, i64), ApiError> {
        let mut errors = Vec::new();
        let page = match self.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(s) => match s.parse::<i64>() {
                Ok(p) if p >= 1 => p,
                _ => {
                    errors.push("page must be a whole number of at least 1".to_string());
                    1
                }
            },
        };
        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_PAGE_SIZE,
            Some(s) => match s.parse::<i64>() {
                Ok(l) if (1..=MAX_PAGE_SIZE).contains(&l) => l,
                _ => {
                    errors.push(format!("limit must be between 1 and {MAX_PAGE_SIZE}"));
                    DEFAULT_PAGE_SIZE
                }
            },
        };
        if errors.is_empty() && (page - 1).checked_mul(limit).is_none() {
            errors.push("page is too large for the requested limit".to_string());
        }
        if errors.is_empty() {
            Ok((page, limit))
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

/// Where the prediction was requested from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: Uuid,
    pub input_data: InputFeatures,
    pub prediction: i32,
    pub probability: f64,
    pub confidence: f64,
    pub risk_level: String,
    pub model_version: String,
    pub model_accuracy: Option<f64>,
    pub metadata: RequestMetadata,
    #[serde(with = "time::serde::rfc3339")]
    pub predicted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<PredictionRecord> for HistoryItem {
    fn from(r: PredictionRecord) -> Self {
        Self {
            id: r.id,
            input_data: InputFeatures {
                age: r.age,
                glucose: r.glucose,
                blood_pressure: r.blood_pressure,
                bmi: r.bmi,
                insulin: r.insulin,
                skin_thickness: r.skin_thickness,
                diabetes_pedigree_function: r.diabetes_pedigree_function,
                pregnancies: r.pregnancies,
            },
            prediction: r.prediction_result,
            probability: r.probability,
            confidence: r.confidence,
            risk_level: r.risk_level,
            model_version: r.model_version,
            model_accuracy: r.model_accuracy,
            metadata: RequestMetadata {
                ip_address: r.ip_address,
                user_agent: r.user_agent,
                device_info: r.device_info,
            },
            predicted_at: r.predicted_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PageInfo {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub predictions: Vec<HistoryItem>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub user: PublicUser,
    pub stats: PredictionStats,
    pub recent_predictions: Vec<HistoryItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MlHealthResponse {
    pub status: &'static str,
    pub ml_service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
