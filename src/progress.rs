//! Progress-callback trait for batch-grading events.
//!
//! Pass an [`Arc<dyn GradingProgressCallback>`] to
//! [`crate::Grader::grade_batch`] to receive real-time events as
//! submissions are graded.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar — without the library knowing anything
//! about how the host application communicates. The trait is `Send + Sync`
//! because submissions are graded concurrently.
//!
//! # Example
//!
//! ```rust
//! use scriptmark::GradingProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl GradingProgressCallback for CountingCallback {
//!     fn on_submission_complete(
//!         &self,
//!         index: usize,
//!         total: usize,
//!         label: &str,
//!         grade: f64,
//!         fallback: bool,
//!     ) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         let note = if fallback { " (estimated)" } else { "" };
//!         eprintln!("{}/{} {label}: {grade}{note}", index + 1, total);
//!     }
//! }
//!
//! let callback: Arc<dyn GradingProgressCallback> = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//! callback.on_submission_complete(0, 30, "alice.pdf", 78.0, false);
//! ```

use std::sync::Arc;

/// Called by [`crate::Grader::grade_batch`] as it works through a batch.
///
/// Implementations must be `Send + Sync` (submissions are graded
/// concurrently). All methods have default no-op implementations so callers
/// only override what they care about.
///
/// # Thread safety
///
/// `on_submission_start`, `on_submission_complete` and
/// `on_submission_error` may be called concurrently from different tasks.
/// Implementations must protect shared mutable state with appropriate
/// synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait GradingProgressCallback: Send + Sync {
    /// Called once before any submission is graded.
    ///
    /// # Arguments
    /// * `total` — number of submissions in the batch
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when a submission's grading starts.
    ///
    /// # Arguments
    /// * `index` — 0-indexed position in the batch
    /// * `total` — submissions in the batch
    /// * `label` — caller-supplied submission label (usually the file name)
    fn on_submission_start(&self, index: usize, total: usize, label: &str) {
        let _ = (index, total, label);
    }

    /// Called when a submission is graded, by the model or the fallback.
    ///
    /// # Arguments
    /// * `index`    — 0-indexed position in the batch
    /// * `total`    — submissions in the batch
    /// * `label`    — caller-supplied submission label
    /// * `grade`    — final clamped grade
    /// * `fallback` — true when the heuristic estimator produced the grade
    fn on_submission_complete(
        &self,
        index: usize,
        total: usize,
        label: &str,
        grade: f64,
        fallback: bool,
    ) {
        let _ = (index, total, label, grade, fallback);
    }

    /// Called when a submission cannot be graded at all (unreadable
    /// document, content too short).
    ///
    /// # Arguments
    /// * `index` — 0-indexed position in the batch
    /// * `total` — submissions in the batch
    /// * `label` — caller-supplied submission label
    /// * `error` — human-readable error description
    fn on_submission_error(&self, index: usize, total: usize, label: &str, error: &str) {
        let _ = (index, total, label, error);
    }

    /// Called once after every submission has been attempted.
    ///
    /// # Arguments
    /// * `total`  — submissions in the batch
    /// * `graded` — submissions that produced a grade (model or fallback)
    fn on_batch_complete(&self, total: usize, graded: usize) {
        let _ = (total, graded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl GradingProgressCallback for NoopProgressCallback {}

/// Convenience alias for the injected callback type.
pub type ProgressCallback = Arc<dyn GradingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: Arc<AtomicUsize>,
        completes: Arc<AtomicUsize>,
        errors: Arc<AtomicUsize>,
        batch_total: Arc<AtomicUsize>,
        graded_total: Arc<AtomicUsize>,
    }

    impl GradingProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_submission_start(&self, _index: usize, _total: usize, _label: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_submission_complete(
            &self,
            _index: usize,
            _total: usize,
            _label: &str,
            _grade: f64,
            _fallback: bool,
        ) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_submission_error(&self, _index: usize, _total: usize, _label: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _total: usize, graded: usize) {
            self.graded_total.store(graded, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(5);
        cb.on_submission_start(0, 5, "a.pdf");
        cb.on_submission_complete(0, 5, "a.pdf", 61.0, false);
        cb.on_submission_error(1, 5, "b.pdf", "unreadable");
        cb.on_batch_complete(5, 4);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: Arc::new(AtomicUsize::new(0)),
            completes: Arc::new(AtomicUsize::new(0)),
            errors: Arc::new(AtomicUsize::new(0)),
            batch_total: Arc::new(AtomicUsize::new(0)),
            graded_total: Arc::new(AtomicUsize::new(0)),
        };

        tracker.on_batch_start(3);
        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 3);

        tracker.on_submission_start(0, 3, "a.pdf");
        tracker.on_submission_complete(0, 3, "a.pdf", 70.0, false);
        tracker.on_submission_start(1, 3, "b.pdf");
        tracker.on_submission_complete(1, 3, "b.pdf", 60.0, true);
        tracker.on_submission_start(2, 3, "c.pdf");
        tracker.on_submission_error(2, 3, "c.pdf", "content too short");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_batch_complete(3, 2);
        assert_eq!(tracker.graded_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn GradingProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_submission_start(0, 10, "x.txt");
        cb.on_submission_complete(0, 10, "x.txt", 85.0, false);
    }
}
