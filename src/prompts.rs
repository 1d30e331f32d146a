//! Prompts for model-based grading.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening a grading rule or the required
//!    JSON shape means editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the assembled prompt without
//!    calling a real model, so a criterion accidentally dropped from the
//!    prompt is caught immediately.
//!
//! Prompt assembly is deterministic: the same rubric, title, template and
//! content always produce byte-identical prompts, which keeps repeated runs
//! comparable.

use crate::rubric::Rubric;

/// Role and grading rules prefix of every grading prompt.
pub const GRADING_PREAMBLE: &str = r#"You are an experienced examiner grading a student's exam submission. Assess the submission against the rubric below, awarding partial credit where it is earned.

Follow these rules precisely:

1. EVIDENCE
   - Judge only what is actually written in the submission
   - Reference specific passages when justifying a score
   - Do not reward filler, repetition, or restating the question

2. SCORING
   - Score each criterion independently, from 0 to its maximum
   - The overall grade must equal the sum of the criterion scores
   - Identical answers must receive identical scores

3. FEEDBACK
   - Write feedback the student can act on
   - Name at least one strength and one concrete improvement
   - Keep the tone professional

4. OUTPUT FORMAT
   - Respond with ONE JSON object and nothing else
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary before or after the JSON"#;

/// Builds the full grading prompt for one submission.
///
/// Sections appear in a fixed order: preamble, exam title, rubric, optional
/// correction template, submission content, required JSON shape. The shape
/// block lists one justification key per rubric criterion so the model has
/// no room to invent or drop criteria.
pub fn build_grading_prompt(
    rubric: &Rubric,
    exam_title: &str,
    content: &str,
    correction_template: Option<&str>,
) -> String {
    let total = rubric.total();
    let mut prompt = String::with_capacity(2048 + content.len());

    prompt.push_str(GRADING_PREAMBLE);
    prompt.push_str("\n\nEXAM: ");
    prompt.push_str(exam_title.trim());
    prompt.push('\n');

    prompt.push_str(&format!("\nRUBRIC (total: {} points):\n", fmt_points(total)));
    for criterion in rubric.criteria() {
        prompt.push_str(&format!(
            "\n- {} (max {} points): {}\n",
            criterion.name,
            fmt_points(criterion.max_score),
            criterion.description
        ));
        if !criterion.guidance.is_empty() {
            prompt.push_str("  What to look for:\n");
            for g in &criterion.guidance {
                prompt.push_str("  * ");
                prompt.push_str(g);
                prompt.push('\n');
            }
        }
    }

    if let Some(template) = correction_template {
        let template = template.trim();
        if !template.is_empty() {
            prompt.push_str(
                "\nCORRECTION TEMPLATE (reference answer; calibrate scores against it):\n\"\"\"\n",
            );
            prompt.push_str(template);
            prompt.push_str("\n\"\"\"\n");
        }
    }

    prompt.push_str("\nSUBMISSION:\n\"\"\"\n");
    prompt.push_str(content);
    prompt.push_str("\n\"\"\"\n");

    prompt.push_str("\nRespond with a JSON object of exactly this shape:\n{\n");
    prompt.push_str(&format!("  \"grade\": <number, 0 to {}>,\n", fmt_points(total)));
    prompt.push_str("  \"feedback\": {\n");
    prompt.push_str("    \"strengths\": [\"...\"],\n");
    prompt.push_str("    \"improvements\": [\"...\"],\n");
    prompt.push_str("    \"details\": \"...\"\n");
    prompt.push_str("  },\n");
    prompt.push_str("  \"justification\": {\n");
    let last = rubric.criteria().len() - 1;
    for (i, criterion) in rubric.criteria().iter().enumerate() {
        prompt.push_str(&format!(
            "    \"{}\": {{ \"score\": <0 to {}>, \"reason\": \"...\" }}{}\n",
            criterion.name,
            fmt_points(criterion.max_score),
            if i == last { "" } else { "," }
        ));
    }
    prompt.push_str("  }\n}");

    prompt
}

/// Builds the prompt that generates a correction template from the exam
/// subject text.
///
/// The output is prose for teachers, not JSON; it is not parsed.
pub fn build_template_prompt(subject: &str, exam_title: &str) -> String {
    format!(
        r#"You are an experienced examiner preparing a correction template for the exam "{title}".

From the exam subject below, produce a correction template for the grading team:

1. For each question, give the expected answer and the key points that earn credit
2. Allocate marks per question and per key point
3. Note common mistakes and how much credit partial answers deserve
4. Keep it concise enough to use while grading a stack of papers

EXAM SUBJECT:
"""
{subject}
"""

Write the correction template as plain structured text."#,
        title = exam_title.trim(),
        subject = subject.trim()
    )
}

/// Formats a point value without a trailing `.0` for whole numbers.
fn fmt_points(value: f64) -> String {
    if (value - value.round()).abs() < f64::EPSILON && value.abs() < 1e15 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value}")
    }
}
