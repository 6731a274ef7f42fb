//! Axum Handlers for the REST API
//!
//! These are the two backend endpoints the browser front-end calls directly:
//! the completion proxy and the speech-token endpoint.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use parley_core::{conversation::Turn, llm_client::CompletionResponse, speech::SpeechToken};
use std::sync::Arc;
use tracing::{error, info};

use crate::{models::ErrorResponse, state::AppState};

pub enum ApiError {
    BadRequest(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Forwards a conversation to the OpenAI-compatible API and returns the
/// completion in `{ choices: [ { message: { role, content } } ] }` form.
pub async fn openai_api_call(
    State(state): State<Arc<AppState>>,
    Json(turns): Json<Vec<Turn>>,
) -> Result<Json<CompletionResponse>, ApiError> {
    let client = state.openai.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("OPENAI_API_KEY is not configured".to_string())
    })?;
    if turns.is_empty() {
        return Err(ApiError::BadRequest(
            "The conversation must contain at least one turn".to_string(),
        ));
    }

    info!(turns = turns.len(), "Proxying completion request");
    let response = client.create(&turns).await?;
    Ok(Json(response))
}

/// Issues a fresh speech token from the configured subscription.
pub async fn get_speech_token(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SpeechToken>, ApiError> {
    let issuer = state.token_issuer.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Speech subscription is not configured".to_string())
    })?;
    let token = issuer.fetch_token().await?;
    Ok(Json(token))
}

pub async fn health() -> &'static str {
    "ok"
}
