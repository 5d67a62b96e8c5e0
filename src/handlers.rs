use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, HeaderName};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, ErrorCode, MSG_UPSTREAM_UNAVAILABLE, Result, log_error};
use crate::models::AskRequest;
use crate::pipeline::StreamEvent;
use crate::AppState;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

// ============================================================================
// INFO HANDLERS
// ============================================================================

pub async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "宠物食品安全 AI 问答后端服务运行中",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "ask": "/ask",
            "health": "/health"
        }
    }))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

// ============================================================================
// SSE STREAM HANDLER
// ============================================================================

/// POST /ask
/// Body: AskRequest JSON
///
/// Returns: `text/event-stream`, one `data: <json>\n\n` frame per StreamEvent
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse> {
    let question = request.validated_question()?;
    log::info!(
        "📥 /ask: {} chars, profile: {}",
        question.chars().count(),
        request.pet_profile.is_some()
    );

    let rx = state
        .pipeline
        .handle_request_stream(question, request.pet_profile);

    Ok((
        [(CACHE_CONTROL, "no-cache"), (X_ACCEL_BUFFERING.clone(), "no")],
        Sse::new(event_stream(rx)),
    ))
}

fn event_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    ReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)))
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json_data) => Event::default().data(json_data),
        Err(e) => {
            log::error!("❌ Failed to serialize {:?}: {}", event, e);
            let err = AppError::new(ErrorCode::Internal, MSG_UPSTREAM_UNAVAILABLE);
            Event::default().data(fallback_payload(&err))
        }
    }
}

/// Terminal `error` payload sent in place of an event that failed to encode.
fn fallback_payload(err: &AppError) -> String {
    log_error(err);
    json!({ "error": err.message }).to_string()
}
