use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Full error chain of a 500, carried on the response for
/// [`reveal_internal_detail`]. Never serialized by itself.
#[derive(Debug, Clone)]
struct InternalDetail(String);

/// Why a request was refused authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    MissingCredential,
    InvalidToken,
    ExpiredToken,
    SessionRevoked,
    UserNotFound,
    InvalidCredentials,
}

impl AuthFailure {
    fn message(self) -> &'static str {
        match self {
            AuthFailure::MissingCredential => "No valid token provided",
            AuthFailure::InvalidToken => "Token is malformed",
            AuthFailure::ExpiredToken => "Token expired, please login again",
            AuthFailure::SessionRevoked => "Session expired, please login again",
            AuthFailure::UserNotFound => "User not found",
            AuthFailure::InvalidCredentials => "Invalid email or password",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },
    #[error("authentication failed: {0:?}")]
    Unauthorized(AuthFailure),
    #[error("account locked")]
    AccountLocked,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<AuthFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

impl ApiError {
    pub fn validation(details: Vec<String>) -> Self {
        ApiError::Validation {
            message: "Please check your input data".into(),
            details,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        ApiError::Validation {
            message: msg.clone(),
            details: vec![msg],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, kind, details) = match self {
            ApiError::Validation { message, details } => (
                StatusCode::BAD_REQUEST,
                "Validation failed",
                message,
                None,
                details,
            ),
            ApiError::Unauthorized(failure) => (
                StatusCode::UNAUTHORIZED,
                "Authentication failed",
                failure.message().to_string(),
                Some(failure),
                Vec::new(),
            ),
            ApiError::AccountLocked => (
                StatusCode::LOCKED,
                "Account locked",
                "Account is temporarily locked due to too many failed login attempts".into(),
                None,
                Vec::new(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", msg, None, Vec::new()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", msg, None, Vec::new()),
            ApiError::TooManyRequests { retry_after_secs } => {
                let body = ErrorBody {
                    error: "Too many requests",
                    message: "Too many authentication attempts, please try again later".into(),
                    kind: None,
                    details: Vec::new(),
                };
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(axum::http::header::RETRY_AFTER, retry_after_secs.to_string())],
                    Json(body),
                )
                    .into_response();
            }
            ApiError::UpstreamUnavailable(msg) => {
                tracing::warn!(error = %msg, "inference service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Prediction service unavailable",
                    msg,
                    None,
                    Vec::new(),
                )
            }
            ApiError::Upstream(msg) => {
                tracing::warn!(error = %msg, "inference service error");
                (
                    StatusCode::BAD_GATEWAY,
                    "Prediction failed",
                    msg,
                    None,
                    Vec::new(),
                )
            }
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                let body = ErrorBody {
                    error: "Internal server error",
                    message: "An internal error occurred".into(),
                    kind: None,
                    details: Vec::new(),
                };
                let mut res = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
                res.extensions_mut().insert(InternalDetail(format!("{err:#}")));
                return res;
            }
        };

        let body = ErrorBody {
            error,
            message,
            kind,
            details,
        };
        (status, Json(body)).into_response()
    }
}

/// Development-only layer: rewrites 500 bodies to carry the error chain.
pub async fn reveal_internal_detail(request: Request, next: Next) -> Response {
    let mut res = next.run(request).await;
    match res.extensions_mut().remove::<InternalDetail>() {
        Some(InternalDetail(detail)) => {
            let body = ErrorBody {
                error: "Internal server error",
                message: detail,
                kind: None,
                details: Vec::new(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
        None => res,
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

/// `Json` whose rejection is a 400 in the same body shape as every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);
