//! Progress-callback trait for range runs.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] with
//! [`crate::process::CirculairePipeline::with_progress`] to receive one event
//! per circular as a range is processed.
//!
//! # Why callbacks instead of channels?
//!
//! The callback is the least-invasive integration point: the CLI drives a
//! terminal progress bar from it, a service can forward events to a queue
//! or a database row, and the library knows nothing about either.
//!
//! # Example
//!
//! ```rust
//! use circulaire_extract::BatchProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     records: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, year: u32, index: u32, records: usize) {
//!         self.records.fetch_add(records, Ordering::SeqCst);
//!         eprintln!("{index:02}/{year:02}: {records} records");
//!     }
//! }
//! ```

use crate::process::BatchHalt;
use std::sync::Arc;

/// Called by range processing for each circular.
///
/// All methods have no-op defaults so callers only override what they
/// care about.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first index.
    fn on_range_start(&self, year: u32, start: u32, end: u32) {
        let _ = (year, start, end);
    }

    /// The cursor says this circular was already processed.
    fn on_document_skipped(&self, year: u32, index: u32) {
        let _ = (year, index);
    }

    /// Called before the circular is fetched.
    fn on_document_start(&self, year: u32, index: u32) {
        let _ = (year, index);
    }

    /// The circular was extracted and parsed.
    ///
    /// * `records`: medication records kept after filtering
    fn on_document_complete(&self, year: u32, index: u32, records: usize) {
        let _ = (year, index, records);
    }

    /// The circular could not be fetched or read.
    fn on_document_failed(&self, year: u32, index: u32, error: &str) {
        let _ = (year, index, error);
    }

    /// The consecutive-failure ceiling was reached.
    fn on_range_halted(&self, halt: &BatchHalt) {
        let _ = halt;
    }

    /// Called once when the range ends, halted or not.
    fn on_range_complete(&self, successes: usize, failures: usize) {
        let _ = (successes, failures);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type held by the pipeline.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        failures: AtomicUsize,
        records: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_document_complete(&self, _year: u32, _index: u32, records: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.records.fetch_add(records, Ordering::SeqCst);
        }

        fn on_document_failed(&self, _year: u32, _index: u32, _error: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_range_start(25, 1, 10);
        cb.on_document_start(25, 1);
        cb.on_document_complete(25, 1, 12);
        cb.on_document_failed(25, 2, "not found");
        cb.on_range_halted(&BatchHalt {
            index: 6,
            consecutive_failures: 5,
            successes: 1,
        });
        cb.on_range_complete(1, 5);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker: Arc<TrackingCallback> = Arc::default();
        let cb: ProgressCallback = tracker.clone();
        cb.on_document_complete(25, 1, 30);
        cb.on_document_complete(25, 2, 12);
        cb.on_document_failed(25, 3, "HTTP 500");
        cb.on_document_skipped(25, 4);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.records.load(Ordering::SeqCst), 42);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }
}
