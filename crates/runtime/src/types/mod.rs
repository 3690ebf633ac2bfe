//! Core types shared across the Kiln runtime

use rand::RngCore;
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::*;

/// Identifier attached to a single generation request.
///
/// Clients may supply their own; otherwise one is generated as a random hex
/// token. The id is echoed back unchanged in the response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    /// Number of random bytes behind a generated id (hex-encoded to twice as many chars)
    const RANDOM_BYTES: usize = 16;

    /// Generate a fresh, unpredictable prompt id
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Use the client-supplied id when it is non-empty, otherwise generate one
    pub fn from_client(value: Option<String>) -> Self {
        match value {
            Some(id) if !id.is_empty() => Self(id),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PromptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PromptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
