//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::DocumentPayload;
use crate::pipeline::{GenerationError, GenerationHandler};

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiContext {
    pub handler: Arc<GenerationHandler>,
}

impl ApiContext {
    pub fn new(handler: Arc<GenerationHandler>) -> Self {
        Self { handler }
    }
}

/// `POST /generate` body. Missing fields deserialize empty so the
/// endpoint can answer with its own messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub files: Vec<DocumentPayload>,
    #[serde(default)]
    pub mode: String,
}

/// Final NDJSON line of a stream that failed after it started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamErrorLine {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl StreamErrorLine {
    pub fn from_error(error: &GenerationError) -> Self {
        Self {
            error: error.to_string(),
            code: Some(error.code().to_string()),
            timeout_secs: error.timeout_secs(),
        }
    }

    pub fn into_error(self) -> GenerationError {
        GenerationError::from_wire(self.code.as_deref(), &self.error, self.timeout_secs)
    }
}

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
