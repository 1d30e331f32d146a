//! Error types for the scriptmark library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`GradeError`] — **Fatal**: this submission cannot be graded at all
//!   (unreadable document, empty content, invalid rubric or configuration).
//!   Returned as `Err(GradeError)` from [`crate::Grader::grade`].
//!
//! * [`ModelError`] — **Recoverable**: a model call failed (timeout,
//!   unreachable endpoint, unparseable response). The orchestrator absorbs
//!   these by switching to the heuristic fallback estimator, so they never
//!   escape `grade` — except [`ModelError::Cancelled`], which surfaces as
//!   [`GradeError::Cancelled`] because an abort is caller intent, not a
//!   model fault.
//!
//! The separation keeps the caller's contract simple: a `GradeError` means
//! the document itself is the problem; everything model-related still
//! produces a usable [`crate::GradingResult`].

use thiserror::Error;

/// All fatal errors returned by the scriptmark library.
///
/// Model-call failures use [`ModelError`] and are recovered through the
/// fallback estimator rather than propagated here.
#[derive(Debug, Error)]
pub enum GradeError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The submission bytes could not be turned into text.
    #[error("Submission is not a readable document: {reason}\nSupported inputs are PDF files and UTF-8 plain text.")]
    UnreadableDocument { reason: String },

    /// The cleaned submission text is below the grading minimum.
    #[error("Submission content is too short to grade: {len} characters after cleanup (minimum {min}).\nThe document may be blank or a scan without a text layer.")]
    ContentTooShort { len: usize, min: usize },

    // ── Rubric errors ─────────────────────────────────────────────────────
    /// Rubric validation failed at construction.
    #[error("Invalid rubric: {0}")]
    InvalidRubric(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Cancellation ──────────────────────────────────────────────────────
    /// The caller cancelled the grading call while the model was in flight.
    #[error("Grading was cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable model-call error.
///
/// Produced by [`crate::model::GenerateClient`] implementations and the
/// retry driver, and consumed by the orchestrator: any of these (other than
/// `Cancelled`) sends the submission down the fallback path instead of
/// failing the grade.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// A single attempt exceeded its time budget.
    #[error("Model call timed out after {timeout_ms}ms on attempt {attempt}")]
    Timeout { attempt: u32, timeout_ms: u64 },

    /// The endpoint could not be reached, or the exchange did not complete
    /// as a well-formed generate call (connection refused, broken body).
    #[error("Failed to reach model endpoint: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Model endpoint returned HTTP {status}: {detail}")]
    Endpoint { status: u16, detail: String },

    /// Every attempt in the retry budget failed.
    #[error("Model unavailable after {attempts} attempts.\nLast error: {last_error}\nCheck that the endpoint is running and the model is pulled.")]
    Unavailable { attempts: u32, last_error: String },

    /// The response text contained no valid grading payload.
    #[error("Model response is not a valid grading payload: {0}")]
    Malformed(String),

    /// The caller's cancellation token fired.
    #[error("Model call cancelled")]
    Cancelled,
}

impl ModelError {
    /// True when this error should consume a retry attempt with a grown
    /// timeout rather than the same one.
    pub(crate) fn is_timeout(&self) -> bool {
        matches!(self, ModelError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_too_short_display() {
        let e = GradeError::ContentTooShort { len: 10, min: 50 };
        let msg = e.to_string();
        assert!(msg.contains("10 characters"), "got: {msg}");
        assert!(msg.contains("minimum 50"), "got: {msg}");
    }

    #[test]
    fn unreadable_document_display() {
        let e = GradeError::UnreadableDocument {
            reason: "empty file".into(),
        };
        assert!(e.to_string().contains("empty file"));
        assert!(e.to_string().contains("PDF"));
    }

    #[test]
    fn timeout_display() {
        let e = ModelError::Timeout {
            attempt: 2,
            timeout_ms: 5000,
        };
        assert!(e.to_string().contains("5000ms"));
        assert!(e.to_string().contains("attempt 2"));
    }

    #[test]
    fn unavailable_display_carries_last_error() {
        let e = ModelError::Unavailable {
            attempts: 3,
            last_error: "connection refused".into(),
        };
        assert!(e.to_string().contains("3 attempts"));
        assert!(e.to_string().contains("connection refused"));
    }

    #[test]
    fn timeout_classification() {
        assert!(ModelError::Timeout {
            attempt: 1,
            timeout_ms: 100
        }
        .is_timeout());
        assert!(!ModelError::Transport("x".into()).is_timeout());
    }
}
