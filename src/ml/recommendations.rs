use super::dto::InputFeatures;

pub const BMI_OBESE: &str = "Your BMI is high; consider a structured weight-loss program";
pub const BMI_OVERWEIGHT: &str = "Your BMI is slightly high; aim to keep a healthy weight";
pub const GLUCOSE_HIGH: &str = "Glucose is very high; see a doctor soon";
pub const GLUCOSE_ELEVATED: &str = "Glucose is slightly high; cut back on sugar";
pub const BLOOD_PRESSURE_HIGH: &str = "Blood pressure is high; reduce salt intake";
pub const AGE_RISK: &str = "Age is a risk factor; get a check-up every 6 months";

/// Advice derived from fixed thresholds. Deterministic for a given input.
pub fn recommendations(input: &InputFeatures, positive: bool) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();

    if positive {
        out.extend([
            "The result indicates a high risk of diabetes",
            "Consult a doctor promptly for further examination",
            "Ask for an HbA1c test and a glucose tolerance test",
        ]);
    } else {
        out.extend([
            "The result indicates a low risk of diabetes",
            "Keep a healthy lifestyle to prevent diabetes",
            "Have a routine check-up every year",
        ]);
    }

    if input.bmi >= 30.0 {
        out.extend([
            BMI_OBESE,
            "Increase physical activity to at least 150 minutes per week",
            "Talk to a nutritionist about a balanced diet",
        ]);
    } else if input.bmi >= 25.0 {
        out.extend([BMI_OVERWEIGHT, "Do light exercise regularly"]);
    }

    if input.glucose >= 140.0 {
        out.extend([
            GLUCOSE_HIGH,
            "Choose foods with a low glycemic index",
            "Keep a regular meal schedule",
        ]);
    } else if input.glucose >= 100.0 {
        out.extend([GLUCOSE_ELEVATED, "Choose foods with a low glycemic index"]);
    }

    if input.blood_pressure >= 140.0 {
        out.extend([
            BLOOD_PRESSURE_HIGH,
            "Practice relaxation techniques to lower stress",
            "Avoid smoking and alcohol",
        ]);
    }

    if input.age >= 45.0 {
        out.extend([AGE_RISK, "Maintain muscle mass with strength training"]);
    }

    out.extend([
        "Eat balanced meals with plenty of vegetables and fruit",
        "Drink at least 8 glasses of water a day",
        "Sleep 7-8 hours a night",
        "Use an app to track your health",
    ]);

    out.into_iter().map(String::from).collect()
}
