//! Notification intake endpoint
//!
//! The body is passed to the pipeline as raw bytes so that an unparseable
//! payload surfaces as a `MALFORMED_EVENT` error (422) rather than axum's
//! own JSON rejection.

use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use tracing::error;

use crate::error::ApiResult;
use crate::pipeline::InvocationOutcome;
use crate::AppState;

/// POST /events
///
/// 200 with the invocation outcome; 422 for events that will never succeed;
/// 503 for failures worth redelivering.
pub async fn receive_event(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<InvocationOutcome>> {
    match state.pipeline.handle_event(&body).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            error!(code = e.code(), retryable = e.is_retryable(), "Invocation failed: {}", e);
            *state.last_error.write().await = Some(e.to_string());
            Err(e.into())
        }
    }
}

/// Build notification intake routes
pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", post(receive_event))
}
