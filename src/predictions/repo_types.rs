use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ml::dto::InputFeatures;

/// One stored prediction. Written once, only ever deleted afterwards.
#[derive(Debug, Clone, FromRow)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub age: f64,
    pub glucose: f64,
    pub blood_pressure: f64,
    pub bmi: f64,
    pub insulin: f64,
    pub skin_thickness: f64,
    pub diabetes_pedigree_function: f64,
    pub pregnancies: i32,
    pub prediction_result: i32,
    pub probability: f64,
    pub confidence: f64,
    pub risk_level: String,
    pub model_version: String,
    pub model_accuracy: Option<f64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
    pub predicted_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub user_id: Uuid,
    pub input: InputFeatures,
    pub prediction_result: i32,
    pub probability: f64,
    pub confidence: f64,
    pub risk_level: String,
    pub model_version: String,
    pub model_accuracy: Option<f64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<serde_json::Value>,
}

/// Per-user aggregates over stored predictions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PredictionStats {
    pub total_predictions: i64,
    pub high_risk_count: i64,
    pub moderate_risk_count: i64,
    pub low_risk_count: i64,
    pub positive_predictions: i64,
    pub negative_predictions: i64,
    pub avg_probability: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_prediction: Option<OffsetDateTime>,
}
