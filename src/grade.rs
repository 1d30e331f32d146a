//! Grading orchestration: the staged pipeline behind [`Grader::grade`].
//!
//! ## Failure philosophy
//!
//! Document-level problems (unreadable bytes, not enough content) surface as
//! errors — there is nothing defensible to grade. Model-level problems
//! (endpoint down, response garbage) never surface: the heuristic estimator
//! produces a provisional grade instead, because one flaky endpoint must not
//! block a class's worth of submissions. Cancellation is the one exception
//! on the model path: it is caller intent and returns
//! [`GradeError::Cancelled`].

use crate::config::GradingConfig;
use crate::error::{GradeError, ModelError};
use crate::model::{GenerateClient, OllamaClient};
use crate::output::{GradeOrigin, GradingResult, GradingStats};
use crate::pipeline::{extract, fallback, invoke, parse, preprocess};
use crate::progress::ProgressCallback;
use crate::prompts;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One submission in a batch: a label for reporting plus the raw bytes.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Caller-supplied name, usually the file name. Only used in progress
    /// events and logs.
    pub label: String,
    /// Raw submission bytes (PDF or UTF-8 text).
    pub bytes: Vec<u8>,
}

impl Submission {
    pub fn new(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            bytes,
        }
    }
}

/// Grades submissions against a configured rubric and model endpoint.
///
/// A `Grader` is immutable and `Send + Sync`: build one per exam and share
/// it across concurrent grading tasks. All collaborators are injected
/// through [`GradingConfig`]; there are no globals.
///
/// # Example
/// ```rust,no_run
/// use scriptmark::{Grader, GradingConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let grader = Grader::new(GradingConfig::default())?;
/// let bytes = std::fs::read("submission.pdf")?;
/// let result = grader.grade(bytes, "Algorithms Final").await?;
/// println!("{} (origin: {:?})", result.grade, result.origin);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Grader {
    config: GradingConfig,
    client: Arc<dyn GenerateClient>,
}

impl fmt::Debug for Grader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Grader {
    /// Builds a grader, resolving the model client from the configuration.
    pub fn new(config: GradingConfig) -> Result<Self, GradeError> {
        let client = resolve_client(&config)?;
        Ok(Self { config, client })
    }

    /// Builds a grader around an explicit client, ignoring any client in
    /// the configuration. This is the injection seam for tests.
    pub fn with_client(config: GradingConfig, client: Arc<dyn GenerateClient>) -> Self {
        Self { config, client }
    }

    /// The configuration this grader was built with.
    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Grades one submission.
    ///
    /// # Errors
    /// Returns `Err(GradeError)` only for document-level failures
    /// (unreadable bytes, content below the minimum). Model failures are
    /// absorbed by the fallback estimator; check
    /// [`GradingResult::is_fallback`] to queue those grades for review.
    pub async fn grade(
        &self,
        file_bytes: Vec<u8>,
        exam_title: &str,
    ) -> Result<GradingResult, GradeError> {
        self.grade_cancellable(file_bytes, exam_title, &CancellationToken::new())
            .await
    }

    /// [`grade`](Self::grade) with a cancellation token.
    ///
    /// Cancelling the token aborts an in-flight model call (the request
    /// future is dropped) and returns [`GradeError::Cancelled`].
    pub async fn grade_cancellable(
        &self,
        file_bytes: Vec<u8>,
        exam_title: &str,
        cancel: &CancellationToken,
    ) -> Result<GradingResult, GradeError> {
        let total_start = Instant::now();
        info!(
            exam = %exam_title,
            bytes = file_bytes.len(),
            "grading submission"
        );

        // ── Step 1: Extract document text ────────────────────────────────
        // PDF extraction is CPU-bound, so it runs on the blocking pool.
        let raw = tokio::task::spawn_blocking(move || extract::extract(&file_bytes))
            .await
            .map_err(|e| GradeError::Internal(format!("extraction task failed: {e}")))??;

        // ── Step 2: Clean and bound the content ──────────────────────────
        let content = preprocess::preprocess(
            &raw,
            self.config.min_content_len,
            self.config.max_content_len,
        )?;
        let content_chars = content.chars().count();
        debug!(chars = content_chars, "content ready for grading");

        // ── Step 3: Build the prompt ─────────────────────────────────────
        let prompt = prompts::build_grading_prompt(
            &self.config.rubric,
            exam_title,
            &content,
            self.config.correction_template.as_deref(),
        );

        // ── Step 4: Call the model with retries ──────────────────────────
        let model_start = Instant::now();
        let invoked = invoke::call_with_retries(&self.client, &prompt, &self.config, cancel).await;
        let model_ms = model_start.elapsed().as_millis() as u64;

        // ── Step 5: Parse the response, or fall back ─────────────────────
        let (parsed, origin, attempts, fallback_reason) = match invoked {
            Ok(outcome) => match parse::parse_grading(&outcome.text, &self.config.rubric) {
                Ok(parsed) => (parsed, GradeOrigin::Model, outcome.attempts, None),
                Err(e) => {
                    warn!(error = %e, "model response unusable, estimating from length");
                    (
                        fallback::estimate(&content, &self.config.rubric, &self.config.fallback),
                        GradeOrigin::Heuristic,
                        outcome.attempts,
                        Some(e.to_string()),
                    )
                }
            },
            Err(ModelError::Cancelled) => return Err(GradeError::Cancelled),
            Err(e) => {
                warn!(error = %e, "model unavailable, estimating from length");
                let attempts = match &e {
                    ModelError::Unavailable { attempts, .. } => *attempts,
                    _ => self.config.max_attempts,
                };
                (
                    fallback::estimate(&content, &self.config.rubric, &self.config.fallback),
                    GradeOrigin::Heuristic,
                    attempts,
                    Some(e.to_string()),
                )
            }
        };

        // ── Step 6: Clamp and assemble the result ────────────────────────
        let total = self.config.rubric.total();
        let grade = parsed.grade.clamp(0.0, total);
        if grade != parsed.grade {
            warn!(
                raw_grade = parsed.grade,
                clamped = grade,
                total,
                "grade out of range, clamped"
            );
        }
        let feedback = parsed.feedback_text();
        let justification = parsed.justification_json(&self.config.rubric)?;

        let stats = GradingStats {
            attempts,
            model_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
            content_chars,
            fallback_reason,
        };
        info!(
            grade,
            total,
            origin = ?origin,
            attempts = stats.attempts,
            total_ms = stats.total_ms,
            "grading complete"
        );

        Ok(GradingResult {
            grade,
            feedback,
            justification,
            origin,
            stats,
        })
    }

    /// Grades a batch of submissions with bounded concurrency.
    ///
    /// Results come back in input order. A submission that cannot be graded
    /// (unreadable, too short) yields an `Err` at its position without
    /// affecting the rest of the batch.
    ///
    /// # Example
    /// ```rust,no_run
    /// use scriptmark::{Grader, GradingConfig, Submission};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let grader = Grader::new(GradingConfig::default())?;
    /// let batch = vec![
    ///     Submission::new("alice.pdf", std::fs::read("alice.pdf")?),
    ///     Submission::new("bob.txt", std::fs::read("bob.txt")?),
    /// ];
    /// for outcome in grader.grade_batch(batch, "History Midterm", 4, None).await {
    ///     println!("{outcome:?}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn grade_batch(
        &self,
        submissions: Vec<Submission>,
        exam_title: &str,
        concurrency: usize,
        progress: Option<ProgressCallback>,
    ) -> Vec<Result<GradingResult, GradeError>> {
        let total = submissions.len();
        let concurrency = concurrency.max(1);
        info!(total, concurrency, exam = %exam_title, "grading batch");
        if let Some(ref cb) = progress {
            cb.on_batch_start(total);
        }

        let mut indexed: Vec<(usize, Result<GradingResult, GradeError>)> =
            stream::iter(submissions.into_iter().enumerate().map(|(index, submission)| {
                let progress = progress.clone();
                let Submission { label, bytes } = submission;
                async move {
                    if let Some(ref cb) = progress {
                        cb.on_submission_start(index, total, &label);
                    }
                    let result = self.grade(bytes, exam_title).await;
                    if let Some(ref cb) = progress {
                        match &result {
                            Ok(r) => cb.on_submission_complete(
                                index,
                                total,
                                &label,
                                r.grade,
                                r.is_fallback(),
                            ),
                            Err(e) => {
                                cb.on_submission_error(index, total, &label, &e.to_string())
                            }
                        }
                    }
                    (index, result)
                }
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        // buffer_unordered yields in completion order; restore input order.
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<_> = indexed.into_iter().map(|(_, result)| result).collect();

        let graded = results.iter().filter(|r| r.is_ok()).count();
        info!(total, graded, "batch complete");
        if let Some(ref cb) = progress {
            cb.on_batch_complete(total, graded);
        }
        results
    }

    /// Generates a correction template from the exam subject text.
    ///
    /// Uses the same client and retry policy as grading, but returns the
    /// model's prose as-is (minus reasoning scratchpads): templates are
    /// teacher-facing material, so there is no heuristic fallback — the
    /// caller decides what an unavailable model means for their workflow.
    pub async fn correction_template(
        &self,
        subject_text: &str,
        exam_title: &str,
    ) -> Result<String, ModelError> {
        let prompt = prompts::build_template_prompt(subject_text, exam_title);
        let outcome = invoke::call_with_retries(
            &self.client,
            &prompt,
            &self.config,
            &CancellationToken::new(),
        )
        .await?;
        info!(attempts = outcome.attempts, exam = %exam_title, "correction template generated");
        Ok(parse::strip_reasoning(&outcome.text).trim().to_string())
    }
}

/// Resolve the generate client, most-specific first:
///
/// 1. **Pre-built client** (`config.client`) — the caller constructed the
///    client entirely; used as-is. This is how tests inject fakes and how
///    embedders add middleware.
/// 2. **HTTP client** against `config.base_url` — the normal case.
fn resolve_client(config: &GradingConfig) -> Result<Arc<dyn GenerateClient>, GradeError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    Ok(Arc::new(OllamaClient::new(config)?))
}
