use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use tracing::warn;

use crate::{
    api::{
        types::{
            HealthResponse, NotFoundResponse, RegisterResponse, RootResponse, SendResponse,
            TokensResponse,
        },
        AppState,
    },
    error::ApiError,
    push::PushMessage,
    registry::RegisterDevice,
};

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        warn!("rejected request body: {rejection}");
        ApiError::Validation(rejection.body_text())
    })
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Hello from root",
    })
}

pub async fn healthcheck(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.registry.health().await?;
    Ok(Json(HealthResponse {
        success: true,
        message: "Successfully connected to the store",
    }))
}

pub async fn register_device(
    State(state): State<AppState>,
    payload: Result<Json<RegisterDevice>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let req = body(payload)?;
    let registration = state.registry.register_device(req).await?;

    Ok(Json(RegisterResponse {
        success: true,
        message: registration.message(),
        data: registration.user,
    }))
}

pub async fn get_token_by_username(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<TokensResponse>, ApiError> {
    let data = state.registry.latest_tokens_by_email(&email).await?;
    Ok(Json(TokensResponse {
        success: true,
        data,
    }))
}

/// `/getTokenByUsername` reached without an email segment.
pub async fn missing_email() -> ApiError {
    ApiError::Validation("Email is required".into())
}

pub async fn send_notification(
    State(state): State<AppState>,
    payload: Result<Json<PushMessage>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    // a body sent without a JSON content type reads as `{}`; the provider rejects it
    let msg = match payload {
        Err(JsonRejection::MissingJsonContentType(_)) => PushMessage::default(),
        other => body(other)?,
    };
    let response = state.push.send(&msg).await.map_err(ApiError::Delivery)?;

    Ok(Json(SendResponse {
        success: true,
        response,
    }))
}

pub async fn not_found() -> (StatusCode, Json<NotFoundResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse { error: "Not Found" }),
    )
}
