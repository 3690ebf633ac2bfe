//! OpenAI-compatible chat completion engine
//!
//! Streams `/chat/completions` responses and reports each content delta to the
//! observer as it arrives. Works with OpenRouter, OpenAI and any local server
//! speaking the same protocol.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::engine::{
    GenerationEngine, GenerationInput, GenerationObserver, GenerationResult, ToolDescriptor,
};
use crate::config::LlmConfig;
use crate::types::GenerationError;

const DEFAULT_MODEL: &str = "gpt-4o";

/// Generation engine backed by an OpenAI-compatible HTTP endpoint
pub struct LlmEngine {
    client: reqwest::Client,
    defaults: Option<LlmConfig>,
}

/// Endpoint and model resolved for a single call
struct ResolvedTarget {
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmEngine {
    pub fn new(defaults: Option<LlmConfig>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        match &defaults {
            Some(llm) => tracing::info!(
                "LLM engine initialized: provider={} model={}",
                llm.provider,
                llm.model
            ),
            None => tracing::info!(
                "No default LLM provider configured; requests must supply base_url"
            ),
        }

        Ok(Self { client, defaults })
    }

    fn resolve(&self, input: &GenerationInput) -> Result<ResolvedTarget, GenerationError> {
        let options = &input.options;
        let defaults = self.defaults.as_ref();

        let base_url = options
            .base_url
            .clone()
            .or_else(|| defaults.map(|d| d.base_url.clone()))
            .ok_or(GenerationError::ProviderNotConfigured)?;

        Ok(ResolvedTarget {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: options
                .api_key
                .clone()
                .or_else(|| defaults.and_then(|d| d.api_key.clone())),
            model: options
                .model
                .clone()
                .or_else(|| defaults.map(|d| d.model.clone()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: defaults.map(|d| d.max_tokens).unwrap_or(4096),
            temperature: defaults.map(|d| d.temperature).unwrap_or(0.3),
        })
    }

    fn system_prompt(working_directory: Option<&Path>) -> String {
        let mut prompt = "You are a helpful assistant. Answer clearly and concisely.".to_string();
        if let Some(dir) = working_directory {
            prompt.push_str(&format!(
                "\nYour working directory is {}.",
                dir.display()
            ));
        }
        prompt
    }
}

/// Conversation messages from an opaque history value; anything but an
/// array of objects is treated as an empty conversation.
fn history_messages(history: Option<&Value>) -> Vec<Value> {
    match history {
        Some(Value::Array(items)) => items.iter().filter(|m| m.is_object()).cloned().collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl GenerationEngine for LlmEngine {
    async fn generate(
        &self,
        input: GenerationInput,
        cancel: CancellationToken,
        mut observer: Option<&mut dyn GenerationObserver>,
    ) -> Result<GenerationResult, GenerationError> {
        let target = self.resolve(&input)?;

        let mut history = history_messages(input.history.as_ref());
        history.push(json!({ "role": "user", "content": input.input }));

        let mut messages = vec![json!({
            "role": "system",
            "content": Self::system_prompt(input.options.working_directory.as_deref()),
        })];
        messages.extend(history.iter().cloned());

        let body = json!({
            "model": target.model,
            "messages": messages,
            "max_tokens": target.max_tokens,
            "temperature": target.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", target.base_url))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(api_key) = &target.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let start = std::time::Instant::now();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            response = request.send() => response.map_err(|e| GenerationError::Request(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                text = response.text() => text.unwrap_or_else(|_| "Unknown error".to_string()),
            };
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let mut decoder = ChunkDecoder::default();
        let mut bytes = response.bytes_stream();
        let mut final_text = String::new();
        let mut usage = None;

        'stream: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                next = bytes.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| GenerationError::Request(e.to_string()))?;

            for delta in decoder.push(&chunk)? {
                match delta {
                    StreamDelta::Content(text) => {
                        if let Some(observer) = observer.as_deref_mut() {
                            observer.on_content_chunk(&text);
                        }
                        final_text.push_str(&text);
                    }
                    StreamDelta::Usage(value) => usage = Some(value),
                    StreamDelta::Done => break 'stream,
                }
            }
        }

        tracing::info!(
            "LLM generation completed: prompt_id={} model={} latency={:?} response_len={}",
            input.prompt_id,
            target.model,
            start.elapsed(),
            final_text.len(),
        );

        history.push(json!({ "role": "assistant", "content": final_text }));

        Ok(GenerationResult {
            final_text,
            transcript: Vec::new(),
            history: Value::Array(history),
            usage,
        })
    }

    fn available_tools(&self) -> Result<Vec<ToolDescriptor>, GenerationError> {
        Ok(Vec::new())
    }
}

/// A decoded piece of a streamed completion
#[derive(Debug, Clone, PartialEq)]
enum StreamDelta {
    Content(String),
    Usage(Value),
    Done,
}

/// Incremental decoder for the `data:` lines of an SSE completion stream.
///
/// Network chunks may split lines anywhere, so bytes are buffered until a
/// full line is available.
#[derive(Default)]
struct ChunkDecoder {
    buffer: Vec<u8>,
}

impl ChunkDecoder {
    fn push(&mut self, chunk: &Bytes) -> Result<Vec<StreamDelta>, GenerationError> {
        self.buffer.extend_from_slice(chunk);
        let mut deltas = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" {
                deltas.push(StreamDelta::Done);
                continue;
            }

            let value: Value = serde_json::from_str(data)
                .map_err(|e| GenerationError::Decode(e.to_string()))?;

            if let Some(message) = value.get("error") {
                return Err(GenerationError::Engine(
                    message
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| message.to_string()),
                ));
            }

            if let Some(text) = value
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("delta"))
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
            {
                if !text.is_empty() {
                    deltas.push(StreamDelta::Content(text.to_string()));
                }
            }

            if let Some(usage) = value.get("usage").filter(|u| !u.is_null()) {
                deltas.push(StreamDelta::Usage(usage.clone()));
            }
        }

        Ok(deltas)
    }
}
