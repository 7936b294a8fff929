use serde::{Deserialize, Serialize};

/// The eight clinical inputs, optional fields already defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFeatures {
    pub age: f64,
    pub glucose: f64,
    pub blood_pressure: f64,
    pub bmi: f64,
    pub insulin: f64,
    pub skin_thickness: f64,
    pub diabetes_pedigree_function: f64,
    pub pregnancies: i32,
}

/// Wire body for the inference endpoint. It only takes these five.
#[derive(Debug, Serialize)]
pub(crate) struct UpstreamRequest {
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "BMI")]
    pub bmi: f64,
    #[serde(rename = "Glucose")]
    pub glucose: f64,
    #[serde(rename = "Insulin")]
    pub insulin: f64,
    #[serde(rename = "BloodPressure")]
    pub blood_pressure: f64,
}

impl From<&InputFeatures> for UpstreamRequest {
    fn from(f: &InputFeatures) -> Self {
        Self {
            age: f.age,
            bmi: f.bmi,
            glucose: f.glucose,
            insulin: f.insulin,
            blood_pressure: f.blood_pressure,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamResponse {
    pub prediction: String,
    pub probability: f64,
    #[serde(default)]
    pub raw_output: Option<i64>,
}

/// The model is a binary classifier; history rows written by older model
/// versions may still say `Moderate`, which stats count separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::High => "High",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_type: String,
    pub threshold: f64,
    pub accuracy: Option<f64>,
}

/// Inference result after normalization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPrediction {
    /// Label exactly as the endpoint returned it.
    pub label: String,
    /// 1 for the positive (diabetes) class, else 0.
    pub prediction: i32,
    pub probability: f64,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub message: String,
    pub recommendations: Vec<String>,
    pub model_info: ModelInfo,
    pub raw_output: Option<i64>,
    pub input_data: InputFeatures,
}
