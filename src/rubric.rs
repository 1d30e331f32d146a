//! Rubric model: the ordered evaluation criteria a submission is graded
//! against.
//!
//! A [`Rubric`] is validated on construction and immutable afterwards, so a
//! single instance can be shared across concurrent grading calls. The sum of
//! the criterion maxima is the grading scale ([`Rubric::total`]); nothing
//! else in the crate assumes a particular total.

use serde::{Deserialize, Serialize};

use crate::error::GradeError;

/// One evaluation criterion within a [`Rubric`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    /// Machine-friendly name, used as the justification key the model must
    /// echo back (e.g. `key_concepts`).
    pub name: String,
    /// One-sentence description shown to the model.
    pub description: String,
    /// Bullet points steering what the model should look for.
    pub guidance: Vec<String>,
    /// Maximum score this criterion contributes to the total.
    pub max_score: f64,
}

impl Criterion {
    /// Convenience constructor used by the presets and tests.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        guidance: &[&str],
        max_score: f64,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            guidance: guidance.iter().map(|g| (*g).to_string()).collect(),
            max_score,
        }
    }
}

/// An ordered, validated set of [`Criterion`]s.
///
/// Construct with [`Rubric::new`] (which validates) or one of the shipped
/// presets. There are no mutating methods.
#[derive(Debug, Clone, Serialize)]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

impl Rubric {
    /// Builds a rubric from an ordered criterion list.
    ///
    /// Validation rules:
    /// * at least one criterion;
    /// * criterion names non-empty and unique after [key normalisation](normalise_key);
    /// * every `max_score` finite and strictly positive.
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, GradeError> {
        if criteria.is_empty() {
            return Err(GradeError::InvalidRubric(
                "rubric must contain at least one criterion".into(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for c in &criteria {
            if c.name.trim().is_empty() {
                return Err(GradeError::InvalidRubric(
                    "criterion name must not be empty".into(),
                ));
            }
            if !c.max_score.is_finite() || c.max_score <= 0.0 {
                return Err(GradeError::InvalidRubric(format!(
                    "criterion '{}' has non-positive max score {}",
                    c.name, c.max_score
                )));
            }
            if !seen.insert(normalise_key(&c.name)) {
                return Err(GradeError::InvalidRubric(format!(
                    "duplicate criterion name '{}'",
                    c.name
                )));
            }
        }
        Ok(Self { criteria })
    }

    /// The criteria in grading order.
    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    /// Sum of the criterion maxima. This is the scale final grades are
    /// clamped to.
    pub fn total(&self) -> f64 {
        self.criteria.iter().map(|c| c.max_score).sum()
    }

    /// Default rubric: four criteria worth 25 points each, total 100.
    pub fn out_of_100() -> Self {
        Self {
            criteria: standard_criteria(&[25.0, 25.0, 25.0, 25.0]),
        }
    }

    /// Alternate rubric on a 20-point scale (8/6/4/2), for courses graded
    /// out of 20.
    pub fn out_of_20() -> Self {
        Self {
            criteria: standard_criteria(&[8.0, 6.0, 4.0, 2.0]),
        }
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self::out_of_100()
    }
}

/// The four standard criteria with caller-chosen weights.
///
/// Order matters: it is the order criteria appear in the prompt and in the
/// serialized justification.
fn standard_criteria(weights: &[f64; 4]) -> Vec<Criterion> {
    vec![
        Criterion::new(
            "key_concepts",
            "Mastery of the key concepts the exam covers.",
            &[
                "Central notions are identified and defined correctly",
                "Concepts are applied to the question actually asked",
                "No major misconception invalidates the answer",
            ],
            weights[0],
        ),
        Criterion::new(
            "methodology",
            "Methodological approach and rigour of the reasoning.",
            &[
                "The approach fits the problem",
                "Steps are justified rather than asserted",
                "Calculations or derivations are carried through correctly",
            ],
            weights[1],
        ),
        Criterion::new(
            "argumentation",
            "Quality and coherence of the argumentation.",
            &[
                "Claims are supported by evidence from the course material",
                "Counterpoints or limits are acknowledged where relevant",
                "The line of reasoning is easy to follow",
            ],
            weights[2],
        ),
        Criterion::new(
            "presentation",
            "Structure, clarity and presentation of the answer.",
            &[
                "The answer is organised with a visible structure",
                "Language is precise and readable",
                "Length is appropriate to the question",
            ],
            weights[3],
        ),
    ]
}

/// Normalises a criterion name for key matching: lowercased, trimmed,
/// whitespace and hyphens folded to single underscores.
///
/// Lets the parser bind a model's `"Key Concepts"` to the rubric's
/// `key_concepts`.
pub(crate) fn normalise_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_sep = true;
    for ch in name.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !last_sep {
                out.push('_');
                last_sep = true;
            }
        } else {
            for lc in ch.to_lowercase() {
                out.push(lc);
            }
            last_sep = false;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_totals() {
        assert_eq!(Rubric::out_of_100().total(), 100.0);
        assert_eq!(Rubric::out_of_20().total(), 20.0);
    }

    #[test]
    fn preset_criterion_order() {
        let rubric = Rubric::out_of_100();
        let names: Vec<_> = rubric
            .criteria()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["key_concepts", "methodology", "argumentation", "presentation"]
        );
    }

    #[test]
    fn empty_rubric_rejected() {
        let err = Rubric::new(vec![]).unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let criteria = vec![
            Criterion::new("clarity", "Clarity.", &[], 10.0),
            Criterion::new("Clarity", "Clarity again.", &[], 10.0),
        ];
        let err = Rubric::new(criteria).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "got: {err}");
    }

    #[test]
    fn non_positive_weight_rejected() {
        let criteria = vec![Criterion::new("clarity", "Clarity.", &[], 0.0)];
        assert!(Rubric::new(criteria).is_err());
    }

    #[test]
    fn custom_rubric_total() {
        let rubric = Rubric::new(vec![
            Criterion::new("a", "A.", &[], 3.0),
            Criterion::new("b", "B.", &[], 7.0),
        ])
        .unwrap();
        assert_eq!(rubric.total(), 10.0);
    }

    #[test]
    fn key_normalisation() {
        assert_eq!(normalise_key("Key Concepts"), "key_concepts");
        assert_eq!(normalise_key("  key-concepts "), "key_concepts");
        assert_eq!(normalise_key("KEY_CONCEPTS"), "key_concepts");
        assert_eq!(normalise_key("presentation"), "presentation");
    }
}
