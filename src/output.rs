//! Output types: the model's grading payload and the final result handed
//! back to callers.
//!
//! [`ParsedGrading`] is the JSON contract the prompt demands from the model.
//! [`GradingResult`] is what [`crate::Grader::grade`] returns after
//! clamping, flattening and (possibly) falling back: everything a caller
//! needs to persist a grade row (`score`, `comment`, auto-generated flag
//! via [`GradeOrigin`], serialized justification).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::GradeError;
use crate::rubric::{normalise_key, Rubric};

/// Per-criterion score and reasoning, one entry per rubric criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionJustification {
    /// Points awarded for this criterion.
    pub score: f64,
    /// One or two sentences explaining the award.
    pub reason: String,
}

/// Structured feedback block of the grading payload.
///
/// All three fields are required: a payload missing any of them fails
/// schema validation and routes to the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    /// What the submission does well.
    pub strengths: Vec<String>,
    /// Concrete things to improve.
    pub improvements: Vec<String>,
    /// Free-form overall commentary.
    pub details: String,
}

/// The model's full grading payload after JSON extraction and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedGrading {
    /// Overall grade as the model awarded it (clamped later by the
    /// orchestrator, never trusted raw).
    pub grade: f64,
    pub feedback: Feedback,
    /// Keyed by criterion name as the model echoed it; matched against the
    /// rubric after normalisation.
    pub justification: BTreeMap<String, CriterionJustification>,
}

impl ParsedGrading {
    /// Flattens the feedback block into one prose comment suitable for a
    /// grade record.
    pub(crate) fn feedback_text(&self) -> String {
        let mut out = String::new();
        if !self.feedback.strengths.is_empty() {
            out.push_str("Strengths:\n");
            for s in &self.feedback.strengths {
                out.push_str("- ");
                out.push_str(s);
                out.push('\n');
            }
        }
        if !self.feedback.improvements.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Areas for improvement:\n");
            for s in &self.feedback.improvements {
                out.push_str("- ");
                out.push_str(s);
                out.push('\n');
            }
        }
        let details = self.feedback.details.trim();
        if !details.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(details);
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    /// Serializes the justification as a JSON object keyed in rubric order.
    ///
    /// The parser guarantees one entry per criterion, so a missing key here
    /// is an internal error, not a model fault.
    pub(crate) fn justification_json(&self, rubric: &Rubric) -> Result<String, GradeError> {
        let by_key: BTreeMap<String, &CriterionJustification> = self
            .justification
            .iter()
            .map(|(k, v)| (normalise_key(k), v))
            .collect();
        let mut ordered = serde_json::Map::new();
        for criterion in rubric.criteria() {
            let key = normalise_key(&criterion.name);
            let entry = by_key.get(&key).ok_or_else(|| {
                GradeError::Internal(format!("justification lost entry for '{key}'"))
            })?;
            let value = serde_json::to_value(entry)
                .map_err(|e| GradeError::Internal(format!("justification serialise: {e}")))?;
            ordered.insert(criterion.name.clone(), value);
        }
        serde_json::to_string(&serde_json::Value::Object(ordered))
            .map_err(|e| GradeError::Internal(format!("justification serialise: {e}")))
    }
}

/// How the final grade was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeOrigin {
    /// Parsed from a model response.
    Model,
    /// Produced by the length-heuristic fallback estimator.
    Heuristic,
}

/// Instrumentation for one grading call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingStats {
    /// Model attempts actually issued (0 when grading failed before the
    /// model, e.g. on an unreadable document).
    pub attempts: u32,
    /// Milliseconds spent in model calls, including backoff waits.
    pub model_ms: u64,
    /// End-to-end milliseconds for the grading call.
    pub total_ms: u64,
    /// Cleaned submission length in characters.
    pub content_chars: usize,
    /// Why the fallback ran, when it did.
    pub fallback_reason: Option<String>,
}

/// Final outcome of grading one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    /// Final grade, clamped into `[0, rubric total]`.
    pub grade: f64,
    /// Feedback prose for the grade record.
    pub feedback: String,
    /// Serialized per-criterion breakdown, a JSON object keyed by criterion
    /// name in rubric order.
    pub justification: String,
    /// Whether the model or the heuristic produced the grade.
    pub origin: GradeOrigin,
    /// Timing and attempt accounting.
    pub stats: GradingStats,
}

impl GradingResult {
    /// True when this grade came from the heuristic estimator and should be
    /// queued for teacher review.
    pub fn is_fallback(&self) -> bool {
        self.origin == GradeOrigin::Heuristic
    }
}
