pub mod schema; // Mode → item shape, array shape, prompts
pub mod encoder; // Raw file → self-describing payload
pub mod partial; // Incremental JSON array decoding of model output
pub mod validation; // Item and array shape checks
pub mod backend; // Model backend seam (Gemini, mock)
pub mod generation; // Streaming generation request handler

pub use generation::{GenerationEvent, GenerationHandler};

use thiserror::Error;

/// Terminal failure of one generation attempt.
///
/// Cloneable so the same reason can be carried in an event, logged, and
/// surfaced to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("No document uploaded")]
    NoDocument,

    #[error("Invalid mode")]
    InvalidMode(String),

    #[error("{}", .details.join("\n"))]
    SchemaValidationFailed { details: Vec<String> },

    #[error("Generation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("{0}")]
    Backend(String),
}

impl GenerationError {
    /// Stable machine-readable code, carried next to the message on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoDocument => "NO_DOCUMENT",
            Self::InvalidMode(_) => "INVALID_MODE",
            Self::SchemaValidationFailed { .. } => "SCHEMA_VALIDATION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Backend(_) => "BACKEND_ERROR",
        }
    }

    /// Limit that was hit, for `Timeout`.
    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            Self::Timeout { secs } => Some(*secs),
            _ => None,
        }
    }

    /// Rebuild an error from its wire code, message and timeout limit.
    ///
    /// A `TIMEOUT` code without a limit keeps the server's message as a
    /// backend error rather than inventing a number.
    pub fn from_wire(code: Option<&str>, message: &str, timeout_secs: Option<u64>) -> Self {
        match (code, timeout_secs) {
            (Some("NO_DOCUMENT"), _) => Self::NoDocument,
            (Some("INVALID_MODE"), _) => Self::InvalidMode(message.to_string()),
            (Some("SCHEMA_VALIDATION_FAILED"), _) => Self::SchemaValidationFailed {
                details: message.lines().map(str::to_string).collect(),
            },
            (Some("TIMEOUT"), Some(secs)) => Self::Timeout { secs },
            _ => Self::Backend(message.to_string()),
        }
    }
}
