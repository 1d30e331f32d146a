//! Configuration types for grading.
//!
//! All grading behaviour is controlled through [`GradingConfig`], built via
//! its [`GradingConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to construct one `Grader` per exam, share it across concurrent
//! grading tasks, and diff two runs to understand why their grades differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::GradeError;
use crate::model::GenerateClient;
use crate::rubric::Rubric;
use std::fmt;
use std::sync::Arc;

/// Default generate-endpoint base URL (a local Ollama server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "deepseek-r1:8b";

/// Configuration for grading submissions.
///
/// Built via [`GradingConfig::builder()`] or using
/// [`GradingConfig::default()`].
///
/// # Example
/// ```rust
/// use scriptmark::{GradingConfig, Rubric};
///
/// let config = GradingConfig::builder()
///     .model("deepseek-r1:8b")
///     .max_attempts(2)
///     .rubric(Rubric::out_of_20())
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct GradingConfig {
    /// Base URL of the generate endpoint. Default: `http://localhost:11434/api`.
    ///
    /// The client POSTs to `{base_url}/generate`. Pointing this at a shared
    /// department server instead of localhost is the usual deployment change.
    pub base_url: String,

    /// Model identifier sent in every request. Default: `deepseek-r1:8b`.
    pub model: String,

    /// Sampling temperature. Default: 0.2.
    ///
    /// Low temperature keeps repeated gradings of the same submission close
    /// together. Higher values make the justification prose livelier at the
    /// cost of score stability.
    pub temperature: f32,

    /// Nucleus sampling cut-off. Default: 0.9.
    pub top_p: f32,

    /// Maximum tokens the model may generate per call. Default: 1024.
    ///
    /// The grading payload (grade, feedback lists, one justification entry
    /// per criterion) fits comfortably under 1024 tokens. Setting this too
    /// low truncates the JSON mid-object, which reads as a malformed
    /// response and triggers the fallback.
    pub max_tokens: u32,

    /// Total attempt budget per grading call, including the first. Default: 3.
    ///
    /// Local model servers fail mostly in transient ways (model still
    /// loading, connection refused during restart). Three attempts absorb
    /// those without stalling a batch behind one dead endpoint.
    pub max_attempts: u32,

    /// Time budget for the first model attempt, in milliseconds. Default: 60 000.
    ///
    /// Reasoning models routinely spend tens of seconds on a full exam
    /// answer. Attempts after a timeout get this budget multiplied by
    /// [`timeout_growth`](Self::timeout_growth) once per preceding timeout.
    pub request_timeout_ms: u64,

    /// Multiplier applied to the attempt timeout after a timed-out attempt.
    /// Must be strictly greater than 1. Default: 1.5.
    ///
    /// A timeout usually means the model needed longer, not that it is down,
    /// so the next attempt gets more room. Non-timeout failures keep the
    /// current budget.
    pub timeout_growth: f64,

    /// Initial delay between attempts in milliseconds (exponential
    /// backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s. Keeps N concurrent
    /// graders from hammering a recovering endpoint in lockstep.
    pub retry_backoff_ms: u64,

    /// Minimum cleaned-content length in characters. Default: 50.
    ///
    /// Anything shorter is near-certainly a blank page or a scan without a
    /// text layer; grading it would only launder noise into a number.
    pub min_content_len: usize,

    /// Maximum cleaned-content length in characters; longer submissions are
    /// truncated. Default: 4000.
    ///
    /// Bounds prompt size (and with it latency and context pressure) for
    /// very long submissions. Truncation is silent and deterministic.
    pub max_content_len: usize,

    /// The rubric submissions are graded against. Default: [`Rubric::out_of_100`].
    pub rubric: Rubric,

    /// Parameters of the heuristic fallback estimator.
    pub fallback: FallbackPolicy,

    /// Correction template embedded in the grading prompt as reference
    /// material, typically generated once per exam. Default: none.
    pub correction_template: Option<String>,

    /// Pre-constructed model client. When set, `base_url` and the HTTP
    /// client are unused; this is the seam tests and embedders inject fakes
    /// through.
    pub client: Option<Arc<dyn GenerateClient>>,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            top_p: 0.9,
            max_tokens: 1024,
            max_attempts: 3,
            request_timeout_ms: 60_000,
            timeout_growth: 1.5,
            retry_backoff_ms: 500,
            min_content_len: 50,
            max_content_len: 4000,
            rubric: Rubric::out_of_100(),
            fallback: FallbackPolicy::default(),
            correction_template: None,
            client: None,
        }
    }
}

impl fmt::Debug for GradingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradingConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("timeout_growth", &self.timeout_growth)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("min_content_len", &self.min_content_len)
            .field("max_content_len", &self.max_content_len)
            .field("rubric_total", &self.rubric.total())
            .field("fallback", &self.fallback)
            .field(
                "correction_template",
                &self.correction_template.as_ref().map(|t| t.len()),
            )
            .field("client", &self.client.as_ref().map(|_| "<dyn GenerateClient>"))
            .finish()
    }
}

impl GradingConfig {
    /// Create a new builder for `GradingConfig`.
    pub fn builder() -> GradingConfigBuilder {
        GradingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GradingConfig`].
#[derive(Debug)]
pub struct GradingConfigBuilder {
    config: GradingConfig,
}

impl GradingConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn timeout_growth(mut self, factor: f64) -> Self {
        self.config.timeout_growth = factor;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn min_content_len(mut self, n: usize) -> Self {
        self.config.min_content_len = n;
        self
    }

    pub fn max_content_len(mut self, n: usize) -> Self {
        self.config.max_content_len = n;
        self
    }

    pub fn rubric(mut self, rubric: Rubric) -> Self {
        self.config.rubric = rubric;
        self
    }

    pub fn fallback(mut self, policy: FallbackPolicy) -> Self {
        self.config.fallback = policy;
        self
    }

    pub fn correction_template(mut self, template: impl Into<String>) -> Self {
        self.config.correction_template = Some(template.into());
        self
    }

    pub fn client(mut self, client: Arc<dyn GenerateClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GradingConfig, GradeError> {
        let c = &self.config;
        if c.base_url.trim().is_empty() {
            return Err(GradeError::InvalidConfig("base_url must not be empty".into()));
        }
        if c.model.trim().is_empty() {
            return Err(GradeError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_attempts == 0 {
            return Err(GradeError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_ms == 0 {
            return Err(GradeError::InvalidConfig(
                "request_timeout_ms must be ≥ 1".into(),
            ));
        }
        if !c.timeout_growth.is_finite() || c.timeout_growth <= 1.0 {
            return Err(GradeError::InvalidConfig(format!(
                "timeout_growth must be > 1, got {}",
                c.timeout_growth
            )));
        }
        if c.min_content_len > c.max_content_len {
            return Err(GradeError::InvalidConfig(format!(
                "min_content_len ({}) exceeds max_content_len ({})",
                c.min_content_len, c.max_content_len
            )));
        }
        self.config.fallback.validate()?;
        Ok(self.config)
    }
}

// ── Fallback policy ──────────────────────────────────────────────────────

/// Parameters of the heuristic fallback estimator, all expressed as
/// percentages of the rubric total.
///
/// The estimator scores `base_pct + words / words_per_point` percentage
/// points, clamped into `[floor_pct, ceiling_pct]`. The defaults place
/// every fallback grade in the unremarkable middle band, visibly short of
/// the top marks a real model (or teacher) can award.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallbackPolicy {
    /// Starting percentage before length credit. Default: 50.
    pub base_pct: f64,
    /// Words per additional percentage point. Default: 100.
    pub words_per_point: f64,
    /// Lowest percentage the estimator can produce. Default: 50.
    pub floor_pct: f64,
    /// Highest percentage the estimator can produce. Default: 85.
    pub ceiling_pct: f64,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            base_pct: 50.0,
            words_per_point: 100.0,
            floor_pct: 50.0,
            ceiling_pct: 85.0,
        }
    }
}

impl FallbackPolicy {
    pub(crate) fn validate(&self) -> Result<(), GradeError> {
        let all = [
            self.base_pct,
            self.words_per_point,
            self.floor_pct,
            self.ceiling_pct,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(GradeError::InvalidConfig(
                "fallback policy values must be finite".into(),
            ));
        }
        if self.words_per_point <= 0.0 {
            return Err(GradeError::InvalidConfig(
                "fallback words_per_point must be > 0".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.floor_pct)
            || !(0.0..=100.0).contains(&self.ceiling_pct)
            || self.floor_pct > self.ceiling_pct
        {
            return Err(GradeError::InvalidConfig(format!(
                "fallback floor/ceiling must satisfy 0 ≤ floor ≤ ceiling ≤ 100, got {}..{}",
                self.floor_pct, self.ceiling_pct
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = GradingConfig::builder().build().unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.rubric.total(), 100.0);
    }

    #[test]
    fn growth_factor_must_exceed_one() {
        let err = GradingConfig::builder()
            .timeout_growth(1.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout_growth"), "got: {err}");

        assert!(GradingConfig::builder()
            .timeout_growth(0.5)
            .build()
            .is_err());
        assert!(GradingConfig::builder()
            .timeout_growth(1.01)
            .build()
            .is_ok());
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(GradingConfig::builder().max_attempts(0).build().is_err());
    }

    #[test]
    fn content_bounds_ordering() {
        let err = GradingConfig::builder()
            .min_content_len(5000)
            .max_content_len(4000)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("min_content_len"), "got: {err}");
    }

    #[test]
    fn sampling_setters_clamp() {
        let config = GradingConfig::builder()
            .temperature(5.0)
            .top_p(2.0)
            .build()
            .unwrap();
        assert_eq!(config.temperature, 2.0);
        assert_eq!(config.top_p, 1.0);
    }

    #[test]
    fn fallback_policy_validation() {
        let bad = FallbackPolicy {
            floor_pct: 90.0,
            ceiling_pct: 85.0,
            ..FallbackPolicy::default()
        };
        let err = GradingConfig::builder().fallback(bad).build().unwrap_err();
        assert!(err.to_string().contains("floor"), "got: {err}");

        let bad = FallbackPolicy {
            words_per_point: 0.0,
            ..FallbackPolicy::default()
        };
        assert!(GradingConfig::builder().fallback(bad).build().is_err());
    }
}
