//! HTTP surface for the generation service
//!
//! Routes `/v1/generate` to the streaming or buffered path and serves the
//! small set of static endpoints. The module is only compiled with the
//! `http-api` feature.

#[cfg(feature = "http-api")]
pub mod server;

#[cfg(feature = "http-api")]
pub mod routes;

#[cfg(feature = "http-api")]
pub mod types;

#[cfg(feature = "http-api")]
pub use server::{HttpApiServer, ServerState};

#[cfg(feature = "http-api")]
pub use types::ApiError;
