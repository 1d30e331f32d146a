//! Document extraction: submission bytes to raw text.
//!
//! ## Why dispatch on magic bytes, not file names?
//!
//! Uploads arrive with unreliable names and mime types; the `%PDF` header
//! does not lie. Bytes that carry it go through structured PDF text
//! extraction, everything else must be valid UTF-8 plain text. Binary
//! garbage fails here, as [`GradeError::UnreadableDocument`], instead of
//! surfacing later as a nonsense grade.

use crate::error::GradeError;
use tracing::debug;

/// True when the bytes carry the PDF magic header.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// Extracts the raw text of a submission.
///
/// Synchronous and CPU-bound for PDFs; the orchestrator calls it through
/// `spawn_blocking`.
pub fn extract(bytes: &[u8]) -> Result<String, GradeError> {
    if bytes.is_empty() {
        return Err(GradeError::UnreadableDocument {
            reason: "empty file".into(),
        });
    }

    let text = if is_pdf(bytes) {
        debug!(len = bytes.len(), "extracting text from PDF");
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| GradeError::UnreadableDocument {
            reason: format!("PDF text extraction failed: {e}"),
        })?
    } else {
        debug!(len = bytes.len(), "decoding submission as UTF-8 text");
        std::str::from_utf8(bytes)
            .map_err(|e| GradeError::UnreadableDocument {
                reason: format!("not a PDF and not valid UTF-8 text: {e}"),
            })?
            .to_string()
    };

    if text.trim().is_empty() {
        return Err(GradeError::UnreadableDocument {
            reason: "document contains no extractable text (a scan without a text layer?)".into(),
        });
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_detection() {
        assert!(is_pdf(b"%PDF-1.7 rest"));
        assert!(!is_pdf(b"plain text"));
        assert!(!is_pdf(b"%PD"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn empty_input_is_unreadable() {
        let err = extract(b"").unwrap_err();
        assert!(matches!(err, GradeError::UnreadableDocument { .. }));
    }

    #[test]
    fn plain_text_passes_through() {
        let text = extract("An essay about rivers.\nSecond line.".as_bytes()).unwrap();
        assert_eq!(text, "An essay about rivers.\nSecond line.");
    }

    #[test]
    fn invalid_utf8_is_unreadable() {
        let err = extract(&[0xff, 0xfe, 0x41, 0x00, 0x9c]).unwrap_err();
        match err {
            GradeError::UnreadableDocument { reason } => {
                assert!(reason.contains("UTF-8"), "got: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_pdf_is_unreadable() {
        let err = extract(b"%PDF-1.4\nnot really a pdf body").unwrap_err();
        match err {
            GradeError::UnreadableDocument { reason } => {
                assert!(reason.contains("PDF"), "got: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn whitespace_only_text_is_unreadable() {
        let err = extract(b"   \n\t  ").unwrap_err();
        assert!(matches!(err, GradeError::UnreadableDocument { .. }));
    }
}
