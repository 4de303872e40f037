//! OCR domain — hand a rasterized region to the recognition backend.
//!
//! The backend is whatever answers `{ base64Image }` with `{ text }`; in
//! production that is an edge function on the hosted backend (see
//! `edge_function.rs`). External code should only use the items exported
//! here.

mod edge_function;
pub mod lyrics;
mod submitter;

pub use edge_function::EdgeFunctionBackend;
pub use submitter::RecognitionSubmitter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Shown when the backend fails without saying why.
pub const GENERIC_FAILURE: &str = "Failed to recognize text in the image";
/// Shown when the backend answers but the answer holds no usable text.
pub const NO_TEXT_FAILURE: &str = "No text was returned for the selected region";

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionRequest {
    /// Base64 JPEG, without a `data:` prefix.
    pub base64_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionResponse {
    pub text: String,
}

/// A failed backend call, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendFailure {
    /// Human-readable message from upstream, if it sent one.
    pub message: Option<String>,
    /// HTTP status, when the failure came with one.
    pub status: Option<u16>,
}

impl BackendFailure {
    pub fn new(message: Option<String>, status: Option<u16>) -> Self {
        Self { message, status }
    }
}

/// One call to a text-recognition service.
///
/// Returns the raw response payload (`Value::Null` when there was none);
/// deciding whether it holds usable text is the submitter's job.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    async fn invoke(
        &self,
        request: &RecognitionRequest,
    ) -> Result<serde_json::Value, BackendFailure>;
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    /// The attempt failed. `message` is upstream's text verbatim when
    /// `upstream` is set, otherwise one of the generic descriptions.
    #[error("{message}")]
    Failed { message: String, upstream: bool },
    /// Another request from the same submitter is still pending.
    #[error("a recognition request is already in progress")]
    Busy,
}

impl RecognitionError {
    pub fn upstream(message: impl Into<String>) -> Self {
        RecognitionError::Failed {
            message: message.into(),
            upstream: true,
        }
    }

    pub fn generic(message: &str) -> Self {
        RecognitionError::Failed {
            message: message.to_string(),
            upstream: false,
        }
    }

    pub fn from_failure(failure: BackendFailure) -> Self {
        match failure.message {
            Some(m) if !m.trim().is_empty() => Self::upstream(m),
            _ => Self::generic(GENERIC_FAILURE),
        }
    }
}
