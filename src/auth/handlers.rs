use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::dto::{ForgotPasswordRequest, LoginRequest, MessageResponse, UserResponse},
    error::AccountError,
    state::AppState,
    users::repo_types::{NewUser, PasswordInput},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password/:token", patch(reset_password))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<UserResponse>), AccountError> {
    let user = state.accounts.register(payload).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::success(user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<UserResponse>, AccountError> {
    let user = state
        .accounts
        .login(&payload.email, &payload.password)
        .await?;
    Ok(Json(UserResponse::success(user)))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AccountError> {
    state.accounts.request_password_reset(&payload.email).await?;
    Ok(Json(MessageResponse {
        status: "success",
        message: "If the email is registered, a reset link has been sent",
    }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<PasswordInput>,
) -> Result<Json<UserResponse>, AccountError> {
    let user = state
        .accounts
        .complete_password_reset(&token, payload)
        .await?;
    Ok(Json(UserResponse::success(user)))
}
