//! Streaming range API: emit circulars as they are processed.
//!
//! ## Why stream?
//!
//! A range run over a year fetches dozens of circulars with a polite delay
//! between requests, and OCR'd ones take minutes each. The eager
//! [`crate::process::CirculairePipeline::process_range`] returns only at the
//! end; [`process_range_stream`] yields each
//! [`DocumentOutcome`](crate::process::DocumentOutcome) as soon as
//! it is known, so callers can write outputs and report progress
//! incrementally. The sequencing, cursor and stop condition are the same.

use crate::cursor::ProcessingCursor;
use crate::error::CirculaireError;
use crate::pipeline::fetch::DocumentFetcher;
use crate::process::{CirculairePipeline, RangeItem, RangeRun};
use futures::stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

/// A boxed stream of range items.
pub type RangeStream = Pin<Box<dyn Stream<Item = Result<RangeItem, CirculaireError>> + Send>>;

struct StreamState {
    run: RangeRun,
    pipeline: CirculairePipeline,
    fetcher: Arc<dyn DocumentFetcher>,
    cursor: Arc<dyn ProcessingCursor>,
}

/// Process circulars `start..=end` of `year`, yielding items in index order.
///
/// The stream ends after a [`RangeItem::Halted`] item, after the last index,
/// or after the first `Err` (configuration, binding or cursor failure).
///
/// # Example
/// ```rust,no_run
/// use circulaire_extract::{
///     process_range_stream, CirculairePipeline, HttpFetcher, InMemoryCursor, PipelineConfig,
///     RangeItem,
/// };
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PipelineConfig::default();
/// let fetcher = Arc::new(HttpFetcher::new(&config)?);
/// let pipeline = CirculairePipeline::with_defaults(config);
/// let mut items = process_range_stream(pipeline, fetcher, Arc::new(InMemoryCursor::new()), 25, 1, 40);
/// while let Some(item) = items.next().await {
///     match item? {
///         RangeItem::Document(doc) => println!("{:02}/{:02}: {:?}", doc.index, doc.year, doc.status),
///         RangeItem::Halted(halt) => eprintln!("halted at {}", halt.index),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn process_range_stream(
    pipeline: CirculairePipeline,
    fetcher: Arc<dyn DocumentFetcher>,
    cursor: Arc<dyn ProcessingCursor>,
    year: u32,
    start: u32,
    end: u32,
) -> RangeStream {
    let state = StreamState {
        run: RangeRun::new(year, start, end),
        pipeline,
        fetcher,
        cursor,
    };
    let s = stream::unfold(state, |mut state| async move {
        let item = state
            .run
            .step(&state.pipeline, state.fetcher.as_ref(), state.cursor.as_ref())
            .await?;
        Some((item, state))
    });
    Box::pin(s)
}
