//! Heuristic fallback estimation when the model cannot grade.
//!
//! An unreachable endpoint or an unparseable response must not block a
//! class's worth of submissions, so grading falls back to a deterministic
//! length heuristic: a base percentage plus one point per
//! `words_per_point` words, clamped into a deliberately unremarkable band
//! and scaled to the rubric total. The feedback says plainly that a teacher
//! must review the grade.
//!
//! The estimator is a pure function of the cleaned content and the policy.
//! It cannot fail: this is the terminal safety net of the pipeline.

use crate::config::FallbackPolicy;
use crate::output::{CriterionJustification, Feedback, ParsedGrading};
use crate::rubric::Rubric;
use std::collections::BTreeMap;
use tracing::debug;

/// Produces a provisional grading payload from the cleaned submission text.
///
/// The per-criterion breakdown awards every criterion the same percentage,
/// so the split respects each criterion's maximum whatever the rubric
/// weights are.
pub fn estimate(content: &str, rubric: &Rubric, policy: &FallbackPolicy) -> ParsedGrading {
    let words = content.split_whitespace().count();
    let raw_pct = policy.base_pct + words as f64 / policy.words_per_point;
    let pct = raw_pct
        .clamp(policy.floor_pct, policy.ceiling_pct)
        .round()
        .clamp(policy.floor_pct.floor(), policy.ceiling_pct.ceil());

    let total = rubric.total();
    let grade = (pct * total) / 100.0;
    debug!(words, pct, grade, "estimated grade from submission length");

    let mut justification = BTreeMap::new();
    for criterion in rubric.criteria() {
        justification.insert(
            criterion.name.clone(),
            CriterionJustification {
                score: (pct * criterion.max_score) / 100.0,
                reason: format!(
                    "Proportional share of a length-based estimate ({} words); not assessed individually.",
                    words
                ),
            },
        );
    }

    ParsedGrading {
        grade,
        feedback: Feedback {
            strengths: vec!["The submission was received and contains substantive content.".into()],
            improvements: vec![
                "This grade is a provisional estimate; ask your teacher for detailed feedback."
                    .into(),
            ],
            details: format!(
                "Automatic estimate based on answer length ({words} words). \
                 The grading model was unavailable, so a teacher should review this grade."
            ),
        },
        justification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FallbackPolicy {
        FallbackPolicy::default()
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn short_content_hits_the_floor() {
        let parsed = estimate(&words(10), &Rubric::out_of_100(), &policy());
        assert_eq!(parsed.grade, 50.0);
    }

    #[test]
    fn long_content_hits_the_ceiling() {
        let parsed = estimate(&words(10_000), &Rubric::out_of_100(), &policy());
        assert_eq!(parsed.grade, 85.0);
    }

    #[test]
    fn mid_length_follows_the_formula() {
        // 50 + 1000/100 = 60 (percent of a 100-point rubric)
        let parsed = estimate(&words(1000), &Rubric::out_of_100(), &policy());
        assert_eq!(parsed.grade, 60.0);
    }

    #[test]
    fn percentage_is_rounded_to_an_integer() {
        // 50 + 250/100 = 52.5 → 53
        let parsed = estimate(&words(250), &Rubric::out_of_100(), &policy());
        assert_eq!(parsed.grade, 53.0);
    }

    #[test]
    fn grade_scales_to_the_rubric_total() {
        let rubric = Rubric::out_of_20();
        let parsed = estimate(&words(1000), &rubric, &policy());
        assert_eq!(parsed.grade, 12.0);

        let sum: f64 = parsed.justification.values().map(|j| j.score).sum();
        assert!((sum - parsed.grade).abs() < 1e-9, "sum {sum} vs grade {}", parsed.grade);
        assert_eq!(parsed.justification["key_concepts"].score, 4.8);
        assert_eq!(parsed.justification["presentation"].score, 1.2);
    }

    #[test]
    fn estimate_is_deterministic() {
        let content = words(321);
        let a = estimate(&content, &Rubric::out_of_100(), &policy());
        let b = estimate(&content, &Rubric::out_of_100(), &policy());
        assert_eq!(a.grade, b.grade);
        assert_eq!(a.feedback.details, b.feedback.details);
    }

    #[test]
    fn one_entry_per_criterion() {
        let parsed = estimate(&words(100), &Rubric::out_of_100(), &policy());
        assert_eq!(parsed.justification.len(), 4);
        assert!(parsed.feedback.details.contains("100 words"));
    }
}
