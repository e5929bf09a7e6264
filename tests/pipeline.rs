//! Integration tests for the document pipeline and range runs.
//!
//! pdfium, Tesseract and the publisher are replaced by in-process fakes so
//! these run anywhere. A fake "PDF" is its own page text, pages separated
//! by form feeds.

use async_trait::async_trait;
use circulaire_extract::output::PageSource;
use circulaire_extract::{
    process_range_stream, BatchProgressCallback, Candidate, CirculaireError, CirculairePipeline,
    DocumentFetcher, DocumentIdentity, DocumentStatus, Extractor, FetchedDocument,
    InMemoryCatalog, InMemoryCursor, MatchStage, MatchStatus, PageError, PageRenderer,
    PipelineConfig, ProcessingCursor, RangeItem, Specialty, TextLayerSource, TextRecognizer,
};
use futures::StreamExt;
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fixtures ─────────────────────────────────────────────────────────────────

const CIRCULAR: &str = "\
منشور رقم 2025/04
تونس في 10/02/2025
1- اختصاصات بشرية محلية
SAIPH
303760 DIARETYL 2mg Gél. Bt 10 1.403 1.526
303761 DIARETYL 4mg Gél. Bt 10 2.103 2.287 3.268 A 0.354
اختصاصات بيطرية مستوردة
MERIAL
500001 FRONTLINE 10% Sol. Fl 1 10.000 11.000 14.000";

/// What a scan's text layer looks like: a producer banner, nothing else.
const SCANNED_LAYER: &str = "Scanned by CamScanner";

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Text layer read straight from the bytes.
#[derive(Default)]
struct FakeTextLayer {
    calls: AtomicUsize,
}

#[async_trait]
impl TextLayerSource for FakeTextLayer {
    async fn page_texts(
        &self,
        bytes: &[u8],
        _filename: &str,
    ) -> Result<Vec<String>, CirculaireError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(String::from_utf8_lossy(bytes)
            .split('\x0c')
            .map(str::to_string)
            .collect())
    }
}

struct BlankRenderer;

#[async_trait]
impl PageRenderer for BlankRenderer {
    async fn render_page(
        &self,
        _bytes: &[u8],
        _page_index: usize,
        _dpi: u32,
        _max_pixels: u32,
    ) -> Result<DynamicImage, String> {
        Ok(DynamicImage::new_rgb8(8, 8))
    }
}

/// Returns scripted page texts in call order; `Err` once the script runs out.
struct ScriptedRecognizer {
    pages: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedRecognizer {
    fn new(pages: &[&str]) -> Self {
        Self {
            pages: Mutex::new(pages.iter().rev().map(|p| p.to_string()).collect()),
            delay: None,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            pages: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn recognize(&self, _image: &DynamicImage, _languages: &str) -> Result<String, String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| "no more pages".to_string())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Serves documents by index; absent indices are not found.
#[derive(Default)]
struct FakeFetcher {
    docs: HashMap<u32, String>,
    requested: Mutex<Vec<u32>>,
}

impl FakeFetcher {
    fn with(indices: &[u32]) -> Self {
        Self {
            docs: indices.iter().map(|&i| (i, CIRCULAR.to_string())).collect(),
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentFetcher for FakeFetcher {
    async fn fetch(
        &self,
        year: u32,
        index: u32,
    ) -> Result<Option<FetchedDocument>, CirculaireError> {
        self.requested.lock().unwrap().push(index);
        Ok(self.docs.get(&index).map(|text| FetchedDocument {
            identity: DocumentIdentity {
                index: Some(index),
                year: Some(year),
                filename: format!("circ{index:02}{year:02}.pdf"),
            },
            bytes: text.as_bytes().to_vec(),
        }))
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for RecordingProgress {
    fn on_document_skipped(&self, _year: u32, index: u32) {
        self.events.lock().unwrap().push(format!("skip {index}"));
    }
    fn on_document_complete(&self, _year: u32, index: u32, records: usize) {
        self.events.lock().unwrap().push(format!("ok {index} {records}"));
    }
    fn on_document_failed(&self, _year: u32, index: u32, _error: &str) {
        self.events.lock().unwrap().push(format!("fail {index}"));
    }
    fn on_range_halted(&self, halt: &circulaire_extract::BatchHalt) {
        self.events.lock().unwrap().push(format!("halt {}", halt.index));
    }
}

/// Route library logs through the test harness; `RUST_LOG` applies.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> PipelineConfig {
    PipelineConfig::builder()
        .request_delay_ms(0)
        .preprocess_for_ocr(false)
        .build()
        .unwrap()
}

fn pipeline_with(
    layer: Arc<FakeTextLayer>,
    recognizer: ScriptedRecognizer,
    config: PipelineConfig,
) -> CirculairePipeline {
    CirculairePipeline::new(Extractor::new(
        layer,
        Arc::new(BlankRenderer),
        Arc::new(recognizer),
        config,
    ))
}

fn pipeline(config: PipelineConfig) -> CirculairePipeline {
    pipeline_with(
        Arc::new(FakeTextLayer::default()),
        ScriptedRecognizer::new(&[]),
        config,
    )
}

// ── Single documents ─────────────────────────────────────────────────────────

#[tokio::test]
async fn digital_circular_is_parsed_and_priced() {
    init_logging();
    let doc = tokio_test::assert_ok!(
        pipeline(config())
            .process_document(
                DocumentIdentity::from_filename("circ0425.pdf"),
                CIRCULAR.as_bytes(),
            )
            .await
    );

    assert!(!doc.extraction.ocr_used);
    assert_eq!(doc.parsed.circulaire_number.as_deref(), Some("2025/04"));
    assert_eq!(doc.parsed.date.as_deref(), Some("2025-02-10"));
    assert_eq!(doc.parsed.medications.len(), 3);

    let inferred = &doc.parsed.medications[0];
    assert_eq!(inferred.price_public, Some(2.18));
    assert!(inferred.price_public_calculated);

    let printed = &doc.parsed.medications[1];
    assert_eq!(printed.price_public, Some(3.268));
    assert!(!printed.price_public_calculated);

    assert_eq!(doc.parsed.laboratories, vec!["SAIPH", "MERIAL"]);
    assert_eq!(doc.simplified.len(), 2);
    assert_eq!(doc.simplified[0].circulaire, "2025/04");
}

#[tokio::test]
async fn empty_bytes_never_reach_the_parser() {
    let layer = Arc::new(FakeTextLayer::default());
    let err = pipeline_with(layer.clone(), ScriptedRecognizer::new(&[]), config())
        .process_document(DocumentIdentity::from_filename("circ0125.pdf"), b"")
        .await
        .unwrap_err();

    assert!(
        matches!(err, CirculaireError::UnreadableDocument { .. }),
        "got {err}"
    );
    assert_eq!(layer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn document_without_usable_text_is_unreadable() {
    // The only page fails OCR and has no text layer to fall back on.
    let err = pipeline(config())
        .process_document(DocumentIdentity::from_filename("circ0225.pdf"), b" ")
        .await
        .unwrap_err();
    assert!(
        matches!(err, CirculaireError::UnreadableDocument { .. }),
        "got {err}"
    );
}

#[tokio::test]
async fn scanned_circular_falls_back_to_ocr() {
    let recognizer = ScriptedRecognizer::new(&[CIRCULAR]);
    let doc = pipeline_with(Arc::new(FakeTextLayer::default()), recognizer, config())
        .process_document(
            DocumentIdentity::from_filename("circ0325.pdf"),
            SCANNED_LAYER.as_bytes(),
        )
        .await
        .unwrap();

    assert!(doc.extraction.ocr_used);
    assert!(doc.extraction.page_errors.is_empty());
    assert_eq!(doc.parsed.medications.len(), 3);
    assert_eq!(doc.parsed.medications[0].code.as_deref(), Some("303760"));
}

#[tokio::test]
async fn slow_page_times_out_and_keeps_its_text_layer() {
    let config = PipelineConfig::builder()
        .force_ocr(true)
        .preprocess_for_ocr(false)
        .ocr_page_timeout_secs(1)
        .build()
        .unwrap();
    let layer = Arc::new(FakeTextLayer::default());
    let extraction = pipeline_with(
        layer,
        ScriptedRecognizer::slow(Duration::from_secs(5)),
        config,
    )
    .extract_text(format!("{CIRCULAR}\x0c").as_bytes(), "circ0425.pdf")
    .await
    .unwrap();

    assert!(extraction.ocr_used);
    assert_eq!(extraction.page_count, 2);
    assert_eq!(
        extraction.page_errors,
        vec![
            PageError::OcrTimeout { page: 1, secs: 1 },
            PageError::OcrTimeout { page: 2, secs: 1 },
        ]
    );
    assert_eq!(extraction.pages[0].source, PageSource::TextLayer);
    assert_eq!(extraction.pages[1].source, PageSource::Empty);
    assert!(extraction.text.contains("DIARETYL 2mg"));
}

#[tokio::test]
async fn veterinary_records_can_be_dropped() {
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .skip_veterinary(true)
        .build()
        .unwrap();
    let doc = pipeline(config)
        .process_document(
            DocumentIdentity::from_filename("circ0425.pdf"),
            CIRCULAR.as_bytes(),
        )
        .await
        .unwrap();

    assert_eq!(doc.parsed.medications.len(), 2);
    assert!(doc
        .parsed
        .medications
        .iter()
        .all(|m| m.specialty == Specialty::Human));
    assert_eq!(doc.parsed.laboratories, vec!["SAIPH"]);
    assert!(doc
        .parsed
        .sections_found
        .iter()
        .all(|s| s.specialty == Specialty::Human));
}

#[tokio::test]
async fn parsed_records_match_the_catalog() {
    let pipeline = pipeline(config());
    let doc = pipeline
        .process_document(
            DocumentIdentity::from_filename("circ0425.pdf"),
            CIRCULAR.as_bytes(),
        )
        .await
        .unwrap();
    let catalog = InMemoryCatalog::new(vec![
        Candidate {
            id: "p-2mg".into(),
            name: "DIARETYL 2MG GELULE".into(),
            laboratory: Some("SAIPH".into()),
            code: Some("303760".into()),
        },
        Candidate {
            id: "p-4mg".into(),
            name: "DIARETYL 4mg Gél. Bt 10".into(),
            laboratory: Some("SAIPH".into()),
            code: None,
        },
    ]);

    let matches = pipeline
        .match_records(&doc.parsed.medications, &catalog)
        .unwrap();
    assert_eq!(matches.len(), 3);

    assert_eq!(matches[0].stage, Some(MatchStage::ExactCode));
    assert_eq!(matches[0].confidence, 100.0);

    assert_eq!(matches[1].status, MatchStatus::Matched);
    assert_eq!(matches[1].stage, Some(MatchStage::Brand));
    assert_eq!(matches[1].candidate.as_ref().map(|c| c.id.as_str()), Some("p-4mg"));

    assert_eq!(matches[2].status, MatchStatus::NotFound);
    assert!(matches[2].candidate.is_none());
}

#[tokio::test]
async fn missing_circular_is_not_found() {
    let fetcher = FakeFetcher::with(&[]);
    let err = pipeline(config())
        .fetch_and_process(&fetcher, 25, 7)
        .await
        .unwrap_err();
    assert!(
        matches!(err, CirculaireError::DocumentNotFound { year: 25, index: 7 }),
        "got {err}"
    );
}

// ── Range runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn range_halts_after_consecutive_failures() {
    init_logging();
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .max_consecutive_failures(2)
        .build()
        .unwrap();
    let progress = Arc::new(RecordingProgress::default());
    let pipeline = pipeline(config).with_progress(progress.clone());
    let fetcher = FakeFetcher::with(&[1, 2, 5]);
    let cursor = InMemoryCursor::new();

    let outcome = tokio_test::assert_ok!(pipeline.process_range(&fetcher, &cursor, 25, 1, 5).await);

    assert_eq!(outcome.successes, 2);
    assert_eq!(outcome.failures, 2);
    let halt = outcome.halted.expect("halted");
    assert_eq!(halt.index, 4);
    assert_eq!(halt.consecutive_failures, 2);
    assert_eq!(halt.successes, 2);
    assert_eq!(fetcher.requested(), vec![1, 2, 3, 4]);
    assert_eq!(cursor.last_processed(25).unwrap(), Some(2));
    assert_eq!(
        *progress.events.lock().unwrap(),
        vec!["ok 1 3", "ok 2 3", "fail 3", "fail 4", "halt 4"]
    );
}

#[tokio::test]
async fn success_resets_the_failure_count() {
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .max_consecutive_failures(2)
        .build()
        .unwrap();
    let fetcher = FakeFetcher::with(&[2, 4]);
    let outcome = pipeline(config)
        .process_range(&fetcher, &InMemoryCursor::new(), 25, 1, 5)
        .await
        .unwrap();

    assert!(outcome.halted.is_none());
    assert_eq!(outcome.successes, 2);
    assert_eq!(outcome.failures, 3);
    assert_eq!(fetcher.requested(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn zero_ceiling_never_halts() {
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .max_consecutive_failures(0)
        .build()
        .unwrap();
    let fetcher = FakeFetcher::with(&[]);
    let outcome = pipeline(config)
        .process_range(&fetcher, &InMemoryCursor::new(), 25, 1, 8)
        .await
        .unwrap();

    assert!(outcome.halted.is_none());
    assert_eq!(outcome.failures, 8);
}

#[tokio::test]
async fn each_year_gets_its_own_failure_count() {
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .max_consecutive_failures(2)
        .build()
        .unwrap();
    let fetcher = FakeFetcher::with(&[3]);
    let outcomes = pipeline(config)
        .process_years(&fetcher, &InMemoryCursor::new(), &[24, 25], 1, 4)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    let (year, first) = &outcomes[0];
    assert_eq!(*year, 24);
    assert_eq!(first.halted.map(|h| h.index), Some(2));
    let (year, second) = &outcomes[1];
    assert_eq!(*year, 25);
    assert_eq!(second.halted.map(|h| h.index), Some(2));
    assert_eq!(fetcher.requested(), vec![1, 2, 1, 2]);
}

#[tokio::test]
async fn range_ending_at_the_last_index_terminates() {
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .max_consecutive_failures(0)
        .build()
        .unwrap();
    let fetcher = FakeFetcher::with(&[]);
    let outcome = pipeline(config)
        .process_range(&fetcher, &InMemoryCursor::new(), 25, u32::MAX - 1, u32::MAX)
        .await
        .unwrap();

    assert_eq!(outcome.failures, 2);
    assert_eq!(fetcher.requested(), vec![u32::MAX - 1, u32::MAX]);
}

#[tokio::test]
async fn cursor_skips_processed_circulars() {
    let fetcher = FakeFetcher::with(&[1, 2, 3, 4]);
    let cursor = InMemoryCursor::new();
    cursor.advance(25, 2).unwrap();

    let outcome = pipeline(config())
        .process_range(&fetcher, &cursor, 25, 1, 4)
        .await
        .unwrap();

    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.successes, 2);
    assert!(matches!(outcome.outcomes[0].status, DocumentStatus::Skipped));
    assert_eq!(fetcher.requested(), vec![3, 4]);
    assert_eq!(cursor.last_processed(25).unwrap(), Some(4));
}

#[tokio::test]
async fn stream_yields_outcomes_in_order_then_halt() {
    let config = PipelineConfig::builder()
        .request_delay_ms(0)
        .max_consecutive_failures(1)
        .build()
        .unwrap();
    let fetcher = Arc::new(FakeFetcher::with(&[1]));
    let items: Vec<RangeItem> = process_range_stream(
        pipeline(config),
        fetcher.clone(),
        Arc::new(InMemoryCursor::new()),
        25,
        1,
        3,
    )
    .map(|item| item.unwrap())
    .collect()
    .await;

    assert_eq!(items.len(), 3);
    match &items[0] {
        RangeItem::Document(doc) => {
            assert_eq!(doc.index, 1);
            assert!(matches!(doc.status, DocumentStatus::Processed(_)));
        }
        other => panic!("expected document, got {other:?}"),
    }
    match &items[1] {
        RangeItem::Document(doc) => {
            assert_eq!(doc.index, 2);
            assert!(matches!(doc.status, DocumentStatus::Failed { .. }));
        }
        other => panic!("expected document, got {other:?}"),
    }
    assert!(matches!(items[2], RangeItem::Halted(h) if h.index == 2));
    assert_eq!(fetcher.requested(), vec![1, 2]);
}
