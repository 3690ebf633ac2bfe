//! Single-reply response assembly.
//!
//! The buffered path registers no live callbacks: it waits for the engine's
//! terminal result, cleans the final text once and renders one JSON object.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::engine::{EventKind, GenerationEngine, GenerationInput, TranscriptEvent};
use super::normalize::{collapse_excess_blank_lines, is_blank, strip_leading_newlines};
use crate::types::{GenerationError, PromptId};

/// Body of a successful buffered response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferedReply {
    pub output: String,
    pub prompt_id: PromptId,
    pub messages: Vec<TranscriptEvent>,
    pub history: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

/// Clean the full final text using the transcript for context.
///
/// Leading newlines are only stripped when one of the last two transcript
/// events is a tool result. This looks further back than the streaming path,
/// which only knows the single previous frame.
pub fn clean_final_text(final_text: &str, transcript: &[TranscriptEvent]) -> String {
    if final_text.is_empty() {
        return String::new();
    }

    let follows_tool_result = transcript
        .iter()
        .rev()
        .take(2)
        .any(|event| event.is(&EventKind::ToolResult));

    let text = if final_text.starts_with('\n') && follows_tool_result {
        strip_leading_newlines(final_text)
    } else {
        final_text
    };

    let cleaned = collapse_excess_blank_lines(text);
    if is_blank(&cleaned) {
        String::new()
    } else {
        cleaned.into_owned()
    }
}

/// Run one engine call without callbacks and build the reply object.
pub async fn assemble(
    engine: &dyn GenerationEngine,
    input: GenerationInput,
    cancel: CancellationToken,
) -> Result<BufferedReply, GenerationError> {
    let prompt_id = input.prompt_id.clone();
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        result = engine.generate(input, cancel.clone(), None) => result,
    };
    let result = outcome?;

    Ok(BufferedReply {
        output: clean_final_text(&result.final_text, &result.transcript),
        prompt_id,
        messages: result.transcript,
        history: result.history,
        usage: result.usage,
    })
}
