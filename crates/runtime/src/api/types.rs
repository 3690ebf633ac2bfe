//! Request and response bodies for the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use crate::generation::ToolDescriptor;

/// Decoded `POST /v1/generate` body.
///
/// Built from an arbitrary JSON value rather than derived, so a body with
/// unexpected field types still reaches validation instead of failing to
/// parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub input: String,
    pub stream: bool,
    pub prompt_id: Option<String>,
    pub history: Option<Value>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub working_directory: Option<PathBuf>,
}

impl GenerateRequest {
    /// Read the known fields out of a parsed body. Anything that is not an
    /// object yields an empty request.
    pub fn from_json(body: &Value) -> Self {
        let Some(fields) = body.as_object() else {
            return Self::default();
        };

        Self {
            input: fields.get("input").map(coerce_input).unwrap_or_default(),
            stream: fields.get("stream").is_some_and(is_truthy),
            prompt_id: fields.get("prompt_id").and_then(scalar_text),
            history: fields.get("history").filter(|v| !v.is_null()).cloned(),
            model: fields.get("model").and_then(scalar_text),
            api_key: fields.get("api_key").and_then(scalar_text),
            base_url: fields.get("base_url").and_then(scalar_text),
            working_directory: fields
                .get("working_directory")
                .and_then(scalar_text)
                .map(PathBuf::from),
        }
    }
}

/// Text form of the `input` field: strings as-is, `null` and `[]` as empty,
/// everything else as its JSON text.
fn coerce_input(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Array(items) if items.is_empty() => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Non-empty string or number, as text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEndpoints {
    pub generate: String,
    pub health: String,
    pub status: String,
    pub tools: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFeatures {
    pub streaming: bool,
    pub conversation_history: bool,
    pub tool_execution: bool,
}

/// Body of `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub mode: String,
    pub endpoints: StatusEndpoints,
    pub features: StatusFeatures,
}

impl StatusResponse {
    pub fn ready() -> Self {
        Self {
            status: "ready".to_string(),
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: "server-only".to_string(),
            endpoints: StatusEndpoints {
                generate: "POST /v1/generate".to_string(),
                health: "GET /healthz".to_string(),
                status: "GET /status".to_string(),
                tools: "GET /v1/tools".to_string(),
            },
            features: StatusFeatures {
                streaming: true,
                conversation_history: true,
                tool_execution: true,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// Error body shared by every non-2xx JSON response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An HTTP status paired with the message rendered as `{"error": ...}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
