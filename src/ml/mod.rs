pub mod client;
pub mod dto;
pub mod recommendations;

pub use client::MlClient;

/// Stand-in inference endpoint served from a local socket.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
        Json, Router,
    };

    use super::dto::InputFeatures;

    #[derive(Clone, Copy)]
    pub enum Upstream {
        Answer {
            label: &'static str,
            probability: f64,
            raw_output: i64,
        },
        Fail {
            status: u16,
            detail: &'static str,
        },
        Stall,
    }

    pub struct MockUpstream {
        pub base_url: String,
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    impl MockUpstream {
        pub fn last_body(&self) -> Option<serde_json::Value> {
            self.bodies.lock().unwrap().last().cloned()
        }
    }

    type Shared = (Upstream, Arc<Mutex<Vec<serde_json::Value>>>);

    async fn predict(
        State((mode, bodies)): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> Response {
        bodies.lock().unwrap().push(body);
        match mode {
            Upstream::Answer {
                label,
                probability,
                raw_output,
            } => Json(serde_json::json!({
                "prediction": label,
                "probability": probability,
                "raw_output": raw_output,
            }))
            .into_response(),
            Upstream::Fail { status, detail } => (
                StatusCode::from_u16(status).unwrap(),
                Json(serde_json::json!({ "detail": detail })),
            )
                .into_response(),
            Upstream::Stall => {
                tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                StatusCode::OK.into_response()
            }
        }
    }

    pub async fn spawn_upstream(mode: Upstream) -> MockUpstream {
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/predict/", post(predict))
            .with_state((mode, bodies.clone()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        MockUpstream {
            base_url: format!("http://{addr}"),
            bodies,
        }
    }

    /// A base URL nothing listens on.
    pub async fn unused_base_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// age 45, BMI 28.5, glucose 120, blood pressure 80, insulin 50.
    pub fn fixture_input() -> InputFeatures {
        InputFeatures {
            age: 45.0,
            glucose: 120.0,
            blood_pressure: 80.0,
            bmi: 28.5,
            insulin: 50.0,
            skin_thickness: 0.0,
            diabetes_pedigree_function: 0.0,
            pregnancies: 0,
        }
    }
}
