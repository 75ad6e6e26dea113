//! Model backend seam.
//!
//! A backend takes one mode's prompts, the document and the response schema,
//! and streams back the raw text of a JSON array in arbitrary fragments.
//! Decoding and validation happen in the generation handler, so backends
//! stay thin transport adapters.

pub mod gemini;
pub mod mock;

pub use gemini::GeminiBackend;
pub use mock::MockBackend;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use super::encoder::EncodeError;
use crate::models::{DocumentPayload, Mode};

/// Text fragments of the model's JSON output, in order.
pub type TextStream = BoxStream<'static, Result<String, BackendError>>;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Cannot reach model backend at {0}")]
    Connection(String),

    #[error("Model backend request timed out")]
    Timeout,

    #[error("Model backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Generation blocked: {0}")]
    Blocked(String),

    #[error("Model stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Unreadable model response: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Document(#[from] EncodeError),
}

/// One generation call.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub mode: Mode,
    pub system_prompt: &'static str,
    pub user_prompt: &'static str,
    pub document: Arc<DocumentPayload>,
    pub response_schema: Value,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Start generating. Errors before the first fragment are returned
    /// directly; later failures arrive as an `Err` item on the stream.
    async fn generate(&self, request: BackendRequest) -> Result<TextStream, BackendError>;
}
