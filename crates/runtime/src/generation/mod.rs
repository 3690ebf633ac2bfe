//! Generation response orchestration
//!
//! Drives a [`GenerationEngine`] and renders its output either as a stream of
//! frames ([`stream`]) or as a single buffered reply ([`buffered`]). Both paths
//! share the text cleanup rules in [`normalize`].

pub mod buffered;
pub mod engine;
pub mod llm;
pub mod normalize;
pub mod stream;

pub use buffered::{assemble, clean_final_text, BufferedReply};
pub use engine::{
    EventKind, GenerationEngine, GenerationInput, GenerationObserver, GenerationOptions,
    GenerationResult, ToolDescriptor, TranscriptEvent,
};
pub use llm::LlmEngine;
pub use stream::{FrameKind, StreamFrame, StreamOrchestrator};
