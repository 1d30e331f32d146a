//! Pipeline stages for exam grading.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and keeps the
//! only stage with network I/O ([`invoke`]) behind a trait, so the whole
//! pipeline runs against a fake client in tests.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ preprocess ──▶ invoke ──▶ parse ──▶ (grade)
//! (bytes)     (clean/bound)  (model)    (JSON)       │
//!                   │                      │ malformed/unavailable
//!                   └───────▶ fallback ◀───┘
//!                            (estimate)
//! ```
//!
//! 1. [`extract`] — sniff PDF vs plain text and pull out the raw string;
//!    CPU-bound, so the orchestrator wraps it in `spawn_blocking`
//! 2. [`preprocess`] — strip control characters, collapse whitespace,
//!    enforce the content-length floor and ceiling
//! 3. [`invoke`] — drive the model call with timeout, retry and backoff
//! 4. [`parse`] — dig the JSON grading payload out of the model's prose and
//!    validate it against the rubric
//! 5. [`fallback`] — length-based estimate used when the model is down or
//!    its response is unusable; never fails

pub mod extract;
pub mod fallback;
pub mod invoke;
pub mod parse;
pub mod preprocess;
