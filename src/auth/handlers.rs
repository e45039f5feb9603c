use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MessageResponse, RegisterRequest, UpdateUserRequest,
            UpdateUserResponse,
        },
        extractors::AuthUser,
        repo_types::Role,
        services,
    },
    error::AppResult,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/update-user", put(update_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let Json(payload) = payload?;
    services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            success: true,
            message: "User registered successfully, please login".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(payload) = payload?;
    let (token, user) = services::authenticate(&state, payload.email, payload.password).await?;
    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".into(),
        token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload), fields(user_id = %auth.id))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<Json<UpdateUserResponse>> {
    auth.authorize(&[Role::Passenger, Role::Rider])?;
    let Json(payload) = payload?;
    let user = services::update_profile(&state, auth.id, payload).await?;
    Ok(Json(UpdateUserResponse {
        success: true,
        message: "Profile updated, please login".into(),
        updated_user: user.into(),
    }))
}
