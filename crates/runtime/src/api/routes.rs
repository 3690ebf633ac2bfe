//! Request dispatcher
//!
//! Validates `/v1/generate` bodies and hands them to the streaming or the
//! buffered path. Static endpoints and the not-found fallback live here too.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::FutureExt;
use serde_json::Value;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::server::ServerState;
use super::types::{ApiError, GenerateRequest, HealthResponse, StatusResponse, ToolsResponse};
use crate::generation::{
    assemble, GenerationEngine, GenerationInput, GenerationOptions, StreamFrame,
    StreamOrchestrator,
};
use crate::types::PromptId;

const PANIC_MESSAGE: &str = "Generation engine panicked";

/// `POST /v1/generate`
pub async fn generate(State(state): State<ServerState>, body: Bytes) -> Response {
    let request = match parse_body(&body) {
        Ok(request) => request,
        Err(err) => return err.into_response(),
    };

    if request.input.is_empty() {
        return ApiError::bad_request("Missing required field: input").into_response();
    }

    let stream = request.stream;
    let input = GenerationInput {
        input: request.input,
        prompt_id: PromptId::from_client(request.prompt_id),
        history: request.history,
        options: GenerationOptions {
            model: request.model,
            api_key: request.api_key,
            base_url: request.base_url,
            working_directory: request
                .working_directory
                .or_else(|| state.default_working_directory.clone()),
        },
    };

    tracing::info!(prompt_id = %input.prompt_id, stream, "Generation request accepted");

    if stream {
        stream_response(state.engine.clone(), input)
    } else {
        buffered_response(state.engine.as_ref(), input).await
    }
}

/// Parse the raw body. An empty body reads as `{}`.
fn parse_body(body: &[u8]) -> Result<GenerateRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerateRequest::default());
    }
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(GenerateRequest::from_json(&value))
}

/// Start the orchestrator on its own task and stream its frames as SSE.
///
/// The frame stream owns a drop guard for the cancellation token: when the
/// client goes away the body is dropped and the generation is cancelled.
fn stream_response(engine: Arc<dyn GenerationEngine>, input: GenerationInput) -> Response {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel::<StreamFrame>();
    let prompt_id = input.prompt_id.clone();

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut orchestrator = StreamOrchestrator::new(tx, task_cancel.clone());
        let outcome = AssertUnwindSafe(orchestrator.run(engine.as_ref(), input))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!(%prompt_id, "Streaming generation completed");
            }
            Ok(Err(e)) if e.is_cancelled() || task_cancel.is_cancelled() => {
                tracing::debug!(%prompt_id, "Streaming generation cancelled");
            }
            Ok(Err(e)) => {
                tracing::error!(%prompt_id, error = %e, "Streaming generation failed");
                orchestrator.fail(&e.to_string());
            }
            Err(_) => {
                tracing::error!(%prompt_id, "Generation engine panicked during streaming");
                orchestrator.fail(PANIC_MESSAGE);
            }
        }
    });

    let frames = futures::stream::unfold((rx, cancel.drop_guard()), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok::<_, Infallible>(sse_event(&frame)), (rx, guard)))
    });

    Sse::new(frames)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// Render one frame as an SSE event.
///
/// SSE cannot carry bare carriage returns, so CR and CRLF line endings are
/// sent as LF. Event names are single-line.
fn sse_event(frame: &StreamFrame) -> Event {
    let name: String = frame
        .name()
        .chars()
        .map(|c| if c == '\r' || c == '\n' { '_' } else { c })
        .collect();
    Event::default().event(name).data(sse_data(&frame.data))
}

fn sse_data(data: &str) -> String {
    data.replace("\r\n", "\n").replace('\r', "\n")
}

/// Wait for the whole result and answer with one JSON object.
async fn buffered_response(engine: &dyn GenerationEngine, input: GenerationInput) -> Response {
    let cancel = CancellationToken::new();
    // Dropping the handler future (client disconnect) cancels the engine call.
    let _guard = cancel.clone().drop_guard();
    let prompt_id = input.prompt_id.clone();

    match AssertUnwindSafe(assemble(engine, input, cancel))
        .catch_unwind()
        .await
    {
        Ok(Ok(reply)) => {
            tracing::info!(%prompt_id, "Buffered generation completed");
            (StatusCode::OK, Json(reply)).into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(%prompt_id, error = %e, "Buffered generation failed");
            ApiError::internal(e.to_string()).into_response()
        }
        Err(_) => {
            tracing::error!(%prompt_id, "Generation engine panicked");
            ApiError::internal(PANIC_MESSAGE).into_response()
        }
    }
}

/// `GET /healthz`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// `GET /status`
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse::ready())
}

/// `GET /v1/tools`
pub async fn tools(State(state): State<ServerState>) -> Result<Json<ToolsResponse>, ApiError> {
    let tools = state.engine.available_tools().map_err(|e| {
        tracing::error!(error = %e, "Failed to list tools");
        ApiError::internal(e.to_string())
    })?;
    Ok(Json(ToolsResponse { tools }))
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}
