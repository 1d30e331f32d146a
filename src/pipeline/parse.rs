//! Response parsing: from raw model text to a validated grading payload.
//!
//! Models rarely return the bare JSON object the prompt demands. Typical
//! responses wrap it in ```json fences, preface it with "Here is my
//! assessment:", or (for reasoning models) prepend a `<think>` block whose
//! prose can even contain stray braces. The steps below deal with each in
//! turn:
//!
//! 1. drop `<think>…</think>` blocks;
//! 2. drop code-fence marker lines;
//! 3. take the first *balanced* `{…}` span, counting braces outside string
//!    literals;
//! 4. decode and validate against the rubric.
//!
//! Every failure is [`ModelError::Malformed`] — an expected outcome that
//! routes the submission to the fallback estimator, not a bug.

use crate::error::ModelError;
use crate::output::ParsedGrading;
use crate::rubric::{normalise_key, Rubric};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

/// Reasoning-model scratchpads. Removed before scanning because their prose
/// may contain unbalanced braces.
static RE_THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// A code-fence marker line (```` ``` ```` or ```` ```json ````), wherever
/// it appears.
static RE_FENCE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*```[a-zA-Z]*\s*$").unwrap());

/// Removes reasoning-model scratchpads. Also used on correction templates,
/// where the remaining prose is the deliverable.
pub(crate) fn strip_reasoning(raw: &str) -> String {
    RE_THINK_BLOCK.replace_all(raw, "").into_owned()
}

/// Parses and validates a model response against the rubric.
pub fn parse_grading(raw: &str, rubric: &Rubric) -> Result<ParsedGrading, ModelError> {
    let text = strip_reasoning(raw);
    let text = RE_FENCE_LINE.replace_all(&text, "");

    let span = balanced_json_span(&text).ok_or_else(|| {
        ModelError::Malformed("no JSON object found in response".into())
    })?;
    debug!(span_chars = span.len(), "located JSON span in model response");

    let parsed: ParsedGrading = serde_json::from_str(span)
        .map_err(|e| ModelError::Malformed(format!("JSON decode failed: {e}")))?;
    validate_against_rubric(parsed, rubric)
}

/// Returns the first balanced `{…}` span, brace-counting outside string
/// literals so a `}` inside a reason text does not end the scan early.
fn balanced_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Checks the decoded payload and canonicalises justification keys to the
/// rubric's criterion names.
fn validate_against_rubric(
    parsed: ParsedGrading,
    rubric: &Rubric,
) -> Result<ParsedGrading, ModelError> {
    if !parsed.grade.is_finite() {
        return Err(ModelError::Malformed(format!(
            "grade is not a finite number: {}",
            parsed.grade
        )));
    }

    let canonical: BTreeMap<String, &str> = rubric
        .criteria()
        .iter()
        .map(|c| (normalise_key(&c.name), c.name.as_str()))
        .collect();

    let mut rekeyed = BTreeMap::new();
    for (key, entry) in parsed.justification {
        let name = canonical.get(normalise_key(&key).as_str()).ok_or_else(|| {
            ModelError::Malformed(format!("justification names unknown criterion '{key}'"))
        })?;
        if !entry.score.is_finite() {
            return Err(ModelError::Malformed(format!(
                "criterion '{name}' score is not a finite number"
            )));
        }
        if rekeyed.insert((*name).to_string(), entry).is_some() {
            return Err(ModelError::Malformed(format!(
                "duplicate justification entry for criterion '{name}'"
            )));
        }
    }

    for criterion in rubric.criteria() {
        if !rekeyed.contains_key(&criterion.name) {
            return Err(ModelError::Malformed(format!(
                "justification is missing criterion '{}'",
                criterion.name
            )));
        }
    }

    Ok(ParsedGrading {
        justification: rekeyed,
        ..parsed
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rubric() -> Rubric {
        Rubric::out_of_100()
    }

    fn payload(grade: &str) -> String {
        format!(
            r#"{{
  "grade": {grade},
  "feedback": {{
    "strengths": ["clear intro"],
    "improvements": ["cite more"],
    "details": "Good effort."
  }},
  "justification": {{
    "key_concepts": {{ "score": 20, "reason": "solid" }},
    "methodology": {{ "score": 19, "reason": "sound" }},
    "argumentation": {{ "score": 20, "reason": "coherent" }},
    "presentation": {{ "score": 19, "reason": "tidy" }}
  }}
}}"#
        )
    }

    #[test]
    fn bare_json_parses() {
        let parsed = parse_grading(&payload("78"), &rubric()).unwrap();
        assert_eq!(parsed.grade, 78.0);
        assert_eq!(parsed.justification.len(), 4);
    }

    #[test]
    fn fenced_json_parses() {
        let raw = format!("```json\n{}\n```", payload("61.5"));
        let parsed = parse_grading(&raw, &rubric()).unwrap();
        assert_eq!(parsed.grade, 61.5);
    }

    #[test]
    fn prose_wrapped_json_parses() {
        let raw = format!(
            "Here is my assessment of the submission:\n\n{}\n\nHope this helps!",
            payload("70")
        );
        assert_eq!(parse_grading(&raw, &rubric()).unwrap().grade, 70.0);
    }

    #[test]
    fn think_block_with_stray_brace_is_ignored() {
        let raw = format!(
            "<think>the rubric says {{ partial credit... I'll award 70</think>\n{}",
            payload("70")
        );
        assert_eq!(parse_grading(&raw, &rubric()).unwrap().grade, 70.0);
    }

    #[test]
    fn braces_inside_strings_do_not_end_the_scan() {
        let raw = payload("55").replace("\"solid\"", "\"solid {see p.2} work\"");
        assert_eq!(parse_grading(&raw, &rubric()).unwrap().grade, 55.0);
    }

    #[test]
    fn no_json_fails() {
        let err = parse_grading("I would give this a 78 out of 100.", &rubric()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn truncated_json_fails() {
        let mut raw = payload("78");
        raw.truncate(raw.len() - 40);
        let err = parse_grading(&raw, &rubric()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn non_numeric_grade_fails() {
        let err = parse_grading(&payload("\"seventy\""), &rubric()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn missing_criterion_fails() {
        let raw = payload("78").replace(
            "\"presentation\": { \"score\": 19, \"reason\": \"tidy\" }",
            "\"presentation_extra\": { \"score\": 19, \"reason\": \"tidy\" }",
        );
        let err = parse_grading(&raw, &rubric()).unwrap_err();
        match err {
            ModelError::Malformed(msg) => {
                assert!(msg.contains("presentation_extra"), "got: {msg}")
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn criterion_keys_are_normalised() {
        let raw = payload("78").replace("\"key_concepts\"", "\"Key Concepts\"");
        let parsed = parse_grading(&raw, &rubric()).unwrap();
        assert!(parsed.justification.contains_key("key_concepts"));
    }

    #[test]
    fn missing_feedback_field_fails() {
        let raw = payload("78").replace("\"improvements\": [\"cite more\"],", "");
        let err = parse_grading(&raw, &rubric()).unwrap_err();
        assert!(matches!(err, ModelError::Malformed(_)));
    }

    #[test]
    fn balanced_span_extraction() {
        assert_eq!(balanced_json_span("x {\"a\": {}} y"), Some("{\"a\": {}}"));
        assert_eq!(balanced_json_span("no braces"), None);
        assert_eq!(balanced_json_span("{ unclosed"), None);
    }
}
