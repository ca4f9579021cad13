use std::sync::{MutexGuard, PoisonError};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use emotion_relay_core::query::conversation_context::ConversationContext;

use emotion_relay_core::ingestion::infrastructure::push_frame_source::{decode_frame, PushedFrame};

use crate::error::ApiError;
use crate::types::{FrameAck, PromptRequest, PromptResponse};
use crate::AppState;

pub async fn current_emotion(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.query.current_emotion())
}

pub async fn agent_context(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.query.agent_context())
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.query.health())
}

/// Classifies one frame and answers directly. The shared state and the
/// subscribers are not touched.
pub async fn process_frame(
    State(state): State<AppState>,
    body: Result<Json<PushedFrame>, JsonRejection>,
) -> Result<Json<FrameAck>, ApiError> {
    let Json(message) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let frame = decode_frame(&message.frame, 0).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let pipeline = state.pipeline.clone().ok_or(ApiError::Unavailable)?;

    let reading = tokio::task::spawn_blocking(move || {
        pipeline.analyze(&frame).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::Internal)?;

    Ok(Json(FrameAck::success(&reading)))
}

/// Builds the prompt for one user turn from the current reading and records
/// that reading in the conversation history.
pub async fn conversation_prompt(
    State(state): State<AppState>,
    body: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let reading = state.query.current_emotion();
    let prompt = conversation(&state).prompt(&reading, &request.message);
    Ok(Json(PromptResponse { prompt }))
}

pub async fn conversation_summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(conversation(&state).summary())
}

pub async fn clear_conversation(State(state): State<AppState>) -> StatusCode {
    conversation(&state).clear();
    StatusCode::NO_CONTENT
}

fn conversation(state: &AppState) -> MutexGuard<'_, ConversationContext> {
    state
        .conversation
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}
