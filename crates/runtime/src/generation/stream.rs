//! Incremental response rendering.
//!
//! [`StreamOrchestrator`] receives the engine's live callbacks and turns them
//! into an ordered sequence of [`StreamFrame`]s pushed into a channel. The
//! receiving side (the HTTP layer) maps each frame to one server-sent event.
//!
//! Frame order for a completed stream is: any number of `content` and event
//! frames, one `history`, at most one `usage`, then `done`. An `error` frame
//! replaces everything after the point of failure.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::engine::{
    EventKind, GenerationEngine, GenerationInput, GenerationObserver, GenerationResult,
    TranscriptEvent,
};
use super::normalize::{collapse_excess_blank_lines, is_blank, strip_leading_newlines};
use crate::types::GenerationError;

/// Wire type of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Content,
    /// Mirrors the event's own type tag
    Event(EventKind),
    History,
    Usage,
    Done,
    Error,
}

impl FrameKind {
    pub fn name(&self) -> &str {
        match self {
            FrameKind::Content => "content",
            FrameKind::Event(kind) => kind.as_str(),
            FrameKind::History => "history",
            FrameKind::Usage => "usage",
            FrameKind::Done => "done",
            FrameKind::Error => "error",
        }
    }
}

/// One unit of the server-push protocol: a named event plus its data.
///
/// `content` and `done` carry raw text; every other frame carries JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub kind: FrameKind,
    pub data: String,
}

impl StreamFrame {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Content,
            data: text.into(),
        }
    }

    pub fn event(event: &TranscriptEvent) -> Self {
        Self {
            kind: FrameKind::Event(event.kind.clone()),
            data: to_json_text(event),
        }
    }

    pub fn history(history: &Value) -> Self {
        Self {
            kind: FrameKind::History,
            data: to_json_text(history),
        }
    }

    pub fn usage(usage: &Value) -> Self {
        Self {
            kind: FrameKind::Usage,
            data: to_json_text(usage),
        }
    }

    pub fn done() -> Self {
        Self {
            kind: FrameKind::Done,
            data: "true".to_string(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            kind: FrameKind::Error,
            data: to_json_text(&serde_json::json!({ "message": message })),
        }
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }
}

fn to_json_text<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Stateful adapter from engine callbacks to wire frames.
pub struct StreamOrchestrator {
    frames: mpsc::UnboundedSender<StreamFrame>,
    cancel: CancellationToken,
    last_frame: Option<FrameKind>,
    /// True at the start of output and right after tool activity
    previous_content_empty: bool,
    closed: bool,
}

impl StreamOrchestrator {
    pub fn new(frames: mpsc::UnboundedSender<StreamFrame>, cancel: CancellationToken) -> Self {
        Self {
            frames,
            cancel,
            last_frame: None,
            previous_content_empty: true,
            closed: false,
        }
    }

    /// Drive one engine call to completion, emitting every frame up to and
    /// including `done`.
    ///
    /// Returns the engine's error without emitting anything for it; the caller
    /// decides whether it becomes an `error` frame (see [`Self::fail`]).
    pub async fn run(
        &mut self,
        engine: &dyn GenerationEngine,
        input: GenerationInput,
    ) -> Result<(), GenerationError> {
        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = engine.generate(
                input,
                cancel.clone(),
                Some(&mut *self as &mut dyn GenerationObserver),
            ) => result,
        };

        self.finish(&outcome?);
        Ok(())
    }

    /// Emit the terminal frames for a successful call and close the stream.
    pub fn finish(&mut self, result: &GenerationResult) {
        self.emit(StreamFrame::history(&result.history));
        if let Some(usage) = &result.usage {
            self.emit(StreamFrame::usage(usage));
        }
        self.emit(StreamFrame::done());
        self.closed = true;
    }

    /// Emit an `error` frame and close the stream.
    pub fn fail(&mut self, message: &str) {
        self.emit(StreamFrame::error(message));
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Apply the per-chunk cleanup rules; `None` means the chunk is suppressed.
    fn clean_chunk(&self, chunk: &str) -> Option<String> {
        let after_tool_result = matches!(
            &self.last_frame,
            Some(FrameKind::Event(EventKind::ToolResult))
        );
        let chunk = if self.previous_content_empty || after_tool_result {
            strip_leading_newlines(chunk)
        } else {
            chunk
        };

        let cleaned = collapse_excess_blank_lines(chunk);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.into_owned())
        }
    }

    fn emit(&mut self, frame: StreamFrame) {
        if self.closed || self.cancel.is_cancelled() {
            return;
        }
        if self.frames.send(frame).is_err() {
            tracing::debug!("Stream receiver dropped, suppressing further frames");
            self.closed = true;
        }
    }
}

impl GenerationObserver for StreamOrchestrator {
    fn on_content_chunk(&mut self, chunk: &str) {
        let Some(cleaned) = self.clean_chunk(chunk) else {
            return;
        };

        self.previous_content_empty = is_blank(&cleaned);
        self.emit(StreamFrame::content(cleaned));
        self.last_frame = Some(FrameKind::Content);
    }

    fn on_event(&mut self, event: &TranscriptEvent) {
        self.emit(StreamFrame::event(event));
        self.last_frame = Some(FrameKind::Event(event.kind.clone()));
        if event.kind.is_tool_activity() {
            self.previous_content_empty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn orchestrator() -> (
        StreamOrchestrator,
        mpsc::UnboundedReceiver<StreamFrame>,
        CancellationToken,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (StreamOrchestrator::new(tx, cancel.clone()), rx, cancel)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamFrame>) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn event(kind: &str) -> TranscriptEvent {
        TranscriptEvent::new(kind, serde_json::Map::new())
    }

    #[test]
    fn first_chunk_loses_leading_newlines() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("\n\nHi");
        orch.on_content_chunk(" there");
        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![StreamFrame::content("Hi"), StreamFrame::content(" there")]
        );
    }

    #[test]
    fn newlines_kept_mid_text() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("Hello");
        orch.on_content_chunk("\n\nWorld");
        let frames = drain(&mut rx);
        assert_eq!(frames[1], StreamFrame::content("\n\nWorld"));
    }

    #[test]
    fn excess_blank_lines_collapse_within_chunk() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("a\n\n\n\n\nb");
        assert_eq!(drain(&mut rx), vec![StreamFrame::content("a\n\nb")]);
    }

    #[test]
    fn newline_only_chunk_at_start_is_suppressed() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("\n\n\n");
        orch.on_content_chunk("");
        assert!(drain(&mut rx).is_empty());

        // State untouched: the next chunk is still treated as the start of output.
        orch.on_content_chunk("\nok");
        assert_eq!(drain(&mut rx), vec![StreamFrame::content("ok")]);
    }

    #[test]
    fn whitespace_chunk_keeps_next_chunk_stripping() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("   ");
        orch.on_content_chunk("\n\nnext");
        assert_eq!(
            drain(&mut rx),
            vec![StreamFrame::content("   "), StreamFrame::content("next")]
        );
    }

    #[test]
    fn tool_events_reset_block_start() {
        for kind in ["tool_call", "tool_result"] {
            let (mut orch, mut rx, _) = orchestrator();
            orch.on_content_chunk("before");
            orch.on_event(&event(kind));
            orch.on_content_chunk("\n\nafter");
            let frames = drain(&mut rx);
            assert_eq!(frames.len(), 3);
            assert_eq!(frames[1].name(), kind);
            assert_eq!(frames[2], StreamFrame::content("after"), "after {kind}");
        }
    }

    #[test]
    fn other_events_do_not_reset_block_start() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("before");
        orch.on_event(&event("status"));
        orch.on_content_chunk("\nafter");
        let frames = drain(&mut rx);
        assert_eq!(frames[1].name(), "status");
        assert_eq!(frames[2], StreamFrame::content("\nafter"));
    }

    #[test]
    fn event_frame_carries_event_json() {
        let (mut orch, mut rx, _) = orchestrator();
        let call = TranscriptEvent::new(
            "tool_call",
            json!({"name": "ls"}).as_object().cloned().unwrap_or_default(),
        );
        orch.on_event(&call);
        let frames = drain(&mut rx);
        let data: Value = serde_json::from_str(&frames[0].data).unwrap();
        assert_eq!(data, json!({"type": "tool_call", "name": "ls"}));
    }

    #[test]
    fn finish_orders_terminal_frames() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.on_content_chunk("text");
        orch.finish(&GenerationResult {
            final_text: "text".to_string(),
            transcript: vec![],
            history: json!([{"role": "user"}]),
            usage: Some(json!({"tokens": 5})),
        });
        let names: Vec<String> = drain(&mut rx).iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["content", "history", "usage", "done"]);
        assert!(orch.is_closed());
    }

    #[test]
    fn finish_without_usage_skips_usage_frame() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.finish(&GenerationResult {
            history: json!([]),
            ..Default::default()
        });
        let frames = drain(&mut rx);
        assert_eq!(
            frames,
            vec![StreamFrame::history(&json!([])), StreamFrame::done()]
        );
        assert_eq!(frames[1].data, "true");
    }

    #[test]
    fn nothing_is_written_after_close() {
        let (mut orch, mut rx, _) = orchestrator();
        orch.fail("boom");
        orch.on_content_chunk("late");
        orch.finish(&GenerationResult::default());
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name(), "error");
        let data: Value = serde_json::from_str(&frames[0].data).unwrap();
        assert_eq!(data, json!({"message": "boom"}));
    }

    #[test]
    fn nothing_is_written_after_cancellation() {
        let (mut orch, mut rx, cancel) = orchestrator();
        orch.on_content_chunk("early");
        cancel.cancel();
        orch.on_content_chunk("late");
        assert_eq!(drain(&mut rx), vec![StreamFrame::content("early")]);
    }

    #[test]
    fn dropped_receiver_closes_orchestrator() {
        let (mut orch, rx, _) = orchestrator();
        drop(rx);
        orch.on_content_chunk("nobody listening");
        assert!(orch.is_closed());
    }
}
