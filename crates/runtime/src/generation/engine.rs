//! Boundary of the generation engine.
//!
//! The engine is an opaque capability: it takes an input and the prior
//! conversation history, reports output incrementally through a
//! [`GenerationObserver`], and resolves once with a [`GenerationResult`].
//! Response assembly (streamed or buffered) lives on top of this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::types::{GenerationError, PromptId};

/// Type tag of a structured engine event.
///
/// The tag domain is open: the two tool kinds carry formatting meaning for
/// the response layer, anything else is forwarded by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    ToolCall,
    ToolResult,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::Other(name) => name,
        }
    }

    /// Tool activity ends the current block of narrative text, so the next
    /// content chunk starts fresh.
    pub fn is_tool_activity(&self) -> bool {
        matches!(self, EventKind::ToolCall | EventKind::ToolResult)
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "tool_call" => EventKind::ToolCall,
            "tool_result" => EventKind::ToolResult,
            _ => EventKind::Other(value),
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        EventKind::from(value.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured event emitted mid-generation and recorded in the transcript.
///
/// Serializes as a flat JSON object whose `type` field is the kind, followed
/// by the payload fields as the engine produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl TranscriptEvent {
    pub fn new(kind: impl Into<EventKind>, mut payload: Map<String, Value>) -> Self {
        // The kind is authoritative; a stray `type` key would be serialized twice.
        payload.remove("type");
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn is(&self, kind: &EventKind) -> bool {
        &self.kind == kind
    }
}

/// Per-request overrides passed through to the engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub working_directory: Option<PathBuf>,
}

/// Everything the engine needs for a single call.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub input: String,
    pub prompt_id: PromptId,
    /// Prior conversation state; opaque to the response layer
    pub history: Option<Value>,
    pub options: GenerationOptions,
}

/// Terminal outcome of a successful engine call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    pub final_text: String,
    /// Append-only record of the structured events of this call
    pub transcript: Vec<TranscriptEvent>,
    /// Updated conversation state; opaque to the response layer
    pub history: Value,
    pub usage: Option<Value>,
}

/// Description of a tool exposed by an engine's registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub description: String,
}

/// Live callbacks invoked by the engine, in output order.
pub trait GenerationObserver: Send {
    fn on_content_chunk(&mut self, chunk: &str);

    fn on_event(&mut self, event: &TranscriptEvent);
}

/// A text-generation engine.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Run one generation.
    ///
    /// When `observer` is `Some`, every content chunk and structured event is
    /// reported through it before the call resolves. Implementations must
    /// return [`GenerationError::Cancelled`] promptly once `cancel` fires.
    async fn generate(
        &self,
        input: GenerationInput,
        cancel: CancellationToken,
        observer: Option<&mut dyn GenerationObserver>,
    ) -> Result<GenerationResult, GenerationError>;

    /// Tools the engine can execute
    fn available_tools(&self) -> Result<Vec<ToolDescriptor>, GenerationError>;
}
