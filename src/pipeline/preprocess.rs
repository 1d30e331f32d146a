//! Content preprocessing: deterministic cleanup rules between extraction
//! and prompting.
//!
//! PDF extraction output is messy: stray control characters, zero-width
//! marks from copy-paste, erratic line breaks from the layout engine. Each
//! rule below is a pure `&str -> String` transformation; [`preprocess`]
//! chains them in a fixed order, then applies the length gate and bound.
//! Determinism matters: the same submission must produce the same prompt
//! on every run.

use crate::error::GradeError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Invisible format characters (zero-width space/joiners, BOM,
/// directional marks). Removed outright so they cannot split words.
static RE_FORMAT_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Cf}").unwrap());

/// Control characters, including newlines and tabs. Replaced with spaces so
/// words separated only by a line break stay separated.
static RE_CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Cc}").unwrap());

/// Any whitespace run.
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Applies the cleanup rules without length gating.
pub fn clean_content(text: &str) -> String {
    let text = drop_format_chars(text);
    let text = blank_control_chars(&text);
    collapse_whitespace(&text)
}

/// Cleans the extracted text, rejects it when too short, truncates it when
/// too long.
///
/// The minimum is checked against the cleaned length before truncation, so
/// a submission cannot fail the gate because of the bound.
pub fn preprocess(raw: &str, min_len: usize, max_len: usize) -> Result<String, GradeError> {
    let cleaned = clean_content(raw);
    let len = cleaned.chars().count();
    if len < min_len {
        return Err(GradeError::ContentTooShort { len, min: min_len });
    }
    Ok(truncate_chars(&cleaned, max_len))
}

// ── Rules ────────────────────────────────────────────────────────────────

fn drop_format_chars(text: &str) -> String {
    RE_FORMAT_CHARS.replace_all(text, "").into_owned()
}

fn blank_control_chars(text: &str) -> String {
    RE_CONTROL_CHARS.replace_all(text, " ").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Cuts at a char boundary; counting chars, not bytes, keeps the bound
/// meaningful for accented scripts.
fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        text.chars().take(max_len).collect::<String>().trim_end().to_string()
    }
}
