//! # scriptmark
//!
//! Grade exam submissions (PDF or plain text) against a weighted rubric
//! using a local LLM endpoint.
//!
//! ## Why this crate?
//!
//! Hand-grading a stack of scripts is slow, and trusting an LLM with marks
//! unsupervised is reckless. This crate takes the middle road: the model
//! reads each submission against an explicit rubric and must justify every
//! criterion score in structured JSON. When the endpoint is down or the
//! response is unusable, a conservative length-based estimate steps in,
//! flagged for teacher review. Grading always completes — every grade is
//! bounded, explained, and attributed to either the model or the heuristic.
//!
//! ## Pipeline Overview
//!
//! ```text
//! submission bytes
//!  │
//!  ├─ 1. Extract     sniff the PDF magic header, pull out text
//!  ├─ 2. Preprocess  strip control chars, collapse whitespace, bound length
//!  ├─ 3. Prompt      deterministic rubric-driven instructions
//!  ├─ 4. Invoke      /generate call with growing timeouts + backoff retries
//!  ├─ 5. Parse       dig JSON out of fences/reasoning, validate vs rubric
//!  └─ 6. Result      clamp to [0, total]; fall back to estimate on failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scriptmark::{Grader, GradingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Talks to Ollama on localhost:11434 with the default 100-point rubric.
//!     let grader = Grader::new(GradingConfig::default())?;
//!     let bytes = std::fs::read("alice.pdf")?;
//!     let result = grader.grade(bytes, "History Final").await?;
//!     println!("{} / 100", result.grade);
//!     eprintln!("{}", result.feedback);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scriptmark` binary (clap + anyhow + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! scriptmark = { version = "0.3", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! Any endpoint speaking the Ollama `/api/generate` contract works. Models
//! that reason before answering tend to grade more defensibly:
//!
//! | Model | VRAM | Notes |
//! |-------|------|-------|
//! | `deepseek-r1:8b`  | ~6 GB  | Default — step-by-step reasoning, reliable JSON |
//! | `deepseek-r1:32b` | ~20 GB | Stronger on long essays, slower |
//! | `llama3.1:8b`     | ~6 GB  | Faster, no scratchpad, thinner justifications |
//!
//! The parser is lenient either way: `<think>` blocks and markdown fences
//! are stripped before the JSON payload is located.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod grade;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod rubric;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    FallbackPolicy, GradingConfig, GradingConfigBuilder, DEFAULT_BASE_URL, DEFAULT_MODEL,
};
pub use error::{GradeError, ModelError};
pub use grade::{Grader, Submission};
pub use model::{GenerateClient, GenerateRequest, GenerateResponse, OllamaClient};
pub use output::{
    CriterionJustification, Feedback, GradeOrigin, GradingResult, GradingStats, ParsedGrading,
};
pub use progress::{GradingProgressCallback, NoopProgressCallback, ProgressCallback};
pub use rubric::{Criterion, Rubric};
