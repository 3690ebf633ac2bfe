//! Kiln runtime
//!
//! Text generation over HTTP. The runtime takes a validated request, drives a
//! generation engine through a cancellable call, and renders the engine's
//! output either as one JSON reply or as a stream of server-sent events.

pub mod config;
pub mod generation;
pub mod types;
pub mod workspace;

#[cfg(feature = "http-api")]
pub mod api;

pub use config::{LlmConfig, LlmProvider, ServerConfig};
pub use generation::{GenerationEngine, LlmEngine};
pub use types::*;
pub use workspace::{ProvisionResult, WorkspaceConfig};

#[cfg(feature = "http-api")]
pub use api::{HttpApiServer, ServerState};
