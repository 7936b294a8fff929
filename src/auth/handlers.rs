use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MeResponse, MessageResponse, ProfileView, PublicUser, RegisterRequest},
        extractors::AuthUser,
        rate_limit::limit_auth_attempts,
        sessions::ClientMeta,
    },
    error::{ApiError, AppJson},
    state::AppState,
};

pub fn auth_routes(state: AppState) -> Router<AppState> {
    let throttled = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route_layer(middleware::from_fn_with_state(state, limit_auth_attempts));

    Router::new()
        .merge(throttled)
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_me))
}

fn today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

#[instrument(skip(state, meta, payload))]
pub async fn register(
    State(state): State<AppState>,
    meta: ClientMeta,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let (email, profile) = payload.validate(today())?;

    let user = state
        .credentials()
        .register(&email, &payload.password, profile)
        .await?;
    let session = state.session_manager().create(&user, &meta).await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new("User registered successfully", &user, session, today())),
    ))
}

#[instrument(skip(state, meta, payload))]
pub async fn login(
    State(state): State<AppState>,
    meta: ClientMeta,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = payload.validate()?;

    let user = state
        .credentials()
        .authenticate(&email, &payload.password)
        .await?;
    let session = state.session_manager().create(&user, &meta).await?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse::new("Login successful", &user, session, today())))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.session_manager().revoke(&auth.token).await?;
    info!("user logged out");
    Ok(Json(MessageResponse {
        message: "Logout successful",
    }))
}

#[instrument(skip_all, fields(user_id = %auth.user.id))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<MeResponse>, ApiError> {
    let stats = state.recorder().stats(auth.user.id).await?;
    let today = today();
    Ok(Json(MeResponse {
        user: PublicUser::of(&auth.user, today),
        profile: ProfileView::of(&auth.user, today),
        stats,
    }))
}
