use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest, TokenResponse},
        guard::{AuthUser, CurrentUser},
        services::AuthService,
    },
    error::AppResult,
    state::AppState,
};

/// Reachable without a token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

/// Mounted behind the auth guard.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(profile))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(auth, payload))]
pub async fn register(
    State(auth): State<AuthService>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(auth.login(payload).await?))
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn profile(AuthUser(user): AuthUser) -> Json<CurrentUser> {
    Json(user)
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn refresh(
    State(auth): State<AuthService>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<TokenResponse>> {
    Ok(Json(auth.refresh(&user)?))
}

#[instrument(skip_all, fields(user_id = user.id))]
pub async fn logout(
    State(auth): State<AuthService>,
    AuthUser(user): AuthUser,
) -> Json<MessageResponse> {
    Json(auth.logout(&user))
}
