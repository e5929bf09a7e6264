//! Eager entry points: one document, a batch of records, a range of circulars.
//!
//! ## Per-document sequence
//!
//! ```text
//! bytes ─▶ extract ─▶ usable? ─no─▶ UnreadableDocument (parser never runs)
//!                        │yes
//!                        ▼
//!                  parse_records ─▶ drop veterinary? ─▶ infer prices ─▶ views
//! ```
//!
//! Matching is a separate call ([`CirculairePipeline::match_records`]) since
//! it needs a catalog the extraction side never touches.
//!
//! ## Range runs
//!
//! [`CirculairePipeline::process_range`] walks `start..=end` for one year.
//! Indices at or below the cursor are skipped. Each fetch after the first
//! waits `request_delay_ms`. A missing or unreadable circular counts as a
//! failure; `max_consecutive_failures` failures in a row halt the run,
//! since past the last published circular every index is missing. A success
//! resets the count. Use [`crate::stream::process_range_stream`] to receive
//! documents as they finish. [`CirculairePipeline::process_years`] repeats
//! the run per year, each with a fresh failure count.

use crate::config::PipelineConfig;
use crate::cursor::ProcessingCursor;
use crate::error::CirculaireError;
use crate::matcher::source::CandidateSource;
use crate::matcher::{MatchResult, ProductMatcher};
use crate::output::{
    DocumentIdentity, ExtractionResult, ExtractionSummary, MedicationRecord, ParsedCirculaire,
    ProcessedCirculaire, SimplifiedEntry, SimplifiedMedication, Specialty, UNKNOWN_LABORATORY,
};
use crate::parser::parse_records;
use crate::pipeline::extract::Extractor;
use crate::pipeline::fetch::DocumentFetcher;
use crate::pipeline::input::{self, FetchedDocument};
use crate::pipeline::ocr::TesseractRecognizer;
use crate::pipeline::pdf::PdfiumBackend;
use crate::pricing;
use crate::progress::ProgressCallback;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Extraction, parsing and matching wired to one configuration.
#[derive(Clone)]
pub struct CirculairePipeline {
    extractor: Extractor,
    matcher: ProductMatcher,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for CirculairePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CirculairePipeline")
            .field("extractor", &self.extractor)
            .field("matcher", &self.matcher)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl CirculairePipeline {
    pub fn new(extractor: Extractor) -> Self {
        let matcher = ProductMatcher::new(extractor.config());
        Self {
            extractor,
            matcher,
            progress: None,
        }
    }

    /// pdfium for the text layer and rendering, Tesseract for OCR.
    pub fn with_defaults(config: PipelineConfig) -> Self {
        let backend = Arc::new(PdfiumBackend::new());
        Self::new(Extractor::new(
            backend.clone(),
            backend,
            Arc::new(TesseractRecognizer::new()),
            config,
        ))
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        self.extractor.config()
    }

    pub(crate) fn progress(&self) -> Option<&ProgressCallback> {
        self.progress.as_ref()
    }

    /// Extract normalized text only.
    pub async fn extract_text(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionResult, CirculaireError> {
        self.extractor.extract(bytes, filename).await
    }

    /// Run one document through extraction, parsing and price inference.
    pub async fn process_document(
        &self,
        identity: DocumentIdentity,
        bytes: &[u8],
    ) -> Result<ProcessedCirculaire, CirculaireError> {
        let extraction = self.extractor.extract(bytes, &identity.filename).await?;
        let usable = extraction.usable_chars();
        let required = self.config().min_document_chars.max(1);
        if usable < required {
            return Err(CirculaireError::UnreadableDocument {
                filename: identity.filename,
                reason: format!(
                    "only {} usable characters extracted, {} required",
                    usable, required
                ),
            });
        }

        let parse = parse_records(&extraction.text);
        let skip_veterinary = self.config().skip_veterinary;
        let medications: Vec<MedicationRecord> = parse
            .records
            .into_iter()
            .filter(|r| !(skip_veterinary && r.specialty == Specialty::Veterinary))
            .map(pricing::apply)
            .collect();
        let laboratories = parse
            .laboratories
            .into_iter()
            .filter(|lab| medications.iter().any(|m| m.laboratory.as_ref() == Some(lab)))
            .collect();
        let sections_found = parse
            .sections
            .into_iter()
            .filter(|s| !(skip_veterinary && s.specialty == Specialty::Veterinary))
            .collect();

        let parsed = ParsedCirculaire {
            filename: identity.filename.clone(),
            date: parse.date,
            circulaire_number: parse.circulaire_number,
            medications,
            laboratories,
            sections_found,
        };
        let simplified = simplify(&parsed, &identity);
        info!(
            "{}: {} records, {} laboratories, ocr={}",
            identity.filename,
            parsed.medications.len(),
            parsed.laboratories.len(),
            extraction.ocr_used
        );

        Ok(ProcessedCirculaire {
            document: identity,
            extraction: ExtractionSummary {
                ocr_used: extraction.ocr_used,
                page_count: extraction.page_count,
                page_errors: extraction.page_errors,
                diagnostics: parse.diagnostics,
            },
            parsed,
            simplified,
        })
    }

    /// Resolve a local path or URL, then [`process_document`](Self::process_document).
    pub async fn process_input(&self, input: &str) -> Result<ProcessedCirculaire, CirculaireError> {
        let config = self.config();
        let doc = input::resolve_input(
            input,
            config.download_timeout_secs,
            config.max_file_size_bytes,
        )
        .await?;
        self.process_document(doc.identity, &doc.bytes).await
    }

    /// Fetch circular `index` of `year` and process it.
    pub async fn fetch_and_process(
        &self,
        fetcher: &dyn DocumentFetcher,
        year: u32,
        index: u32,
    ) -> Result<ProcessedCirculaire, CirculaireError> {
        let FetchedDocument { identity, bytes } = fetcher
            .fetch(year, index)
            .await?
            .ok_or(CirculaireError::DocumentNotFound { year, index })?;
        self.process_document(identity, &bytes).await
    }

    /// Match every record against the catalog, in order.
    pub fn match_records(
        &self,
        records: &[MedicationRecord],
        source: &dyn CandidateSource,
    ) -> Result<Vec<MatchResult>, CirculaireError> {
        records
            .iter()
            .map(|r| self.matcher.match_record(r, source))
            .collect()
    }

    /// Process circulars `start..=end` of `year`. See the module docs.
    ///
    /// Returns `Err` only for failures that are not about one document
    /// (configuration, pdfium binding, cursor store).
    pub async fn process_range(
        &self,
        fetcher: &dyn DocumentFetcher,
        cursor: &dyn ProcessingCursor,
        year: u32,
        start: u32,
        end: u32,
    ) -> Result<BatchOutcome, CirculaireError> {
        let mut run = RangeRun::new(year, start, end);
        let mut outcome = BatchOutcome::default();
        while let Some(item) = run.step(self, fetcher, cursor).await {
            match item? {
                RangeItem::Document(doc) => {
                    match doc.status {
                        DocumentStatus::Processed(_) => outcome.successes += 1,
                        DocumentStatus::Skipped => outcome.skipped += 1,
                        DocumentStatus::Failed { .. } => outcome.failures += 1,
                    }
                    outcome.outcomes.push(doc);
                }
                RangeItem::Halted(halt) => outcome.halted = Some(halt),
            }
        }
        Ok(outcome)
    }

    /// [`process_range`](Self::process_range) for each year in turn.
    ///
    /// The failure count starts at zero for every year, and a halt only ends
    /// that year's run.
    pub async fn process_years(
        &self,
        fetcher: &dyn DocumentFetcher,
        cursor: &dyn ProcessingCursor,
        years: &[u32],
        start: u32,
        end: u32,
    ) -> Result<Vec<(u32, BatchOutcome)>, CirculaireError> {
        let mut outcomes = Vec::with_capacity(years.len());
        for &year in years {
            let outcome = self.process_range(fetcher, cursor, year, start, end).await?;
            outcomes.push((year, outcome));
        }
        Ok(outcomes)
    }
}

/// Extract text with the default pdfium + Tesseract stack and configuration.
pub async fn extract_text(bytes: &[u8]) -> Result<ExtractionResult, CirculaireError> {
    CirculairePipeline::with_defaults(PipelineConfig::default())
        .extract_text(bytes, "document.pdf")
        .await
}

// ── Simplified view ──────────────────────────────────────────────────────

/// Group records by (laboratory, type) in first-seen order.
pub fn simplify(parsed: &ParsedCirculaire, identity: &DocumentIdentity) -> Vec<SimplifiedEntry> {
    let circulaire = parsed
        .circulaire_number
        .clone()
        .unwrap_or_else(|| identity.stem().to_string());
    let mut entries: Vec<SimplifiedEntry> = Vec::new();
    for record in &parsed.medications {
        let laboratory = record.laboratory.as_deref().unwrap_or(UNKNOWN_LABORATORY);
        let position = entries
            .iter()
            .position(|e| e.laboratory == laboratory && e.record_type == record.record_type);
        let entry = match position {
            Some(i) => &mut entries[i],
            None => {
                entries.push(SimplifiedEntry {
                    date: parsed.date.clone(),
                    circulaire: circulaire.clone(),
                    laboratory: laboratory.to_string(),
                    record_type: record.record_type,
                    medications: Vec::new(),
                });
                let last = entries.len() - 1;
                &mut entries[last]
            }
        };
        entry.medications.push(SimplifiedMedication::from(record));
    }
    entries
}

// ── Output files ─────────────────────────────────────────────────────────

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CirculaireError> {
    let failed = |e| CirculaireError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await.map_err(failed)?;
    tokio::fs::rename(&tmp, path).await.map_err(failed)
}

fn to_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<Vec<u8>, CirculaireError> {
    serde_json::to_vec_pretty(value).map_err(|e| CirculaireError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}

/// Write `<stem>.json` (parsed view) and `<stem>_simplified.json` into `dir`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_outputs(
    doc: &ProcessedCirculaire,
    dir: &Path,
) -> Result<(PathBuf, PathBuf), CirculaireError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CirculaireError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;
    let stem = doc.document.stem();
    let parsed_path = dir.join(format!("{stem}.json"));
    let simplified_path = dir.join(format!("{stem}_simplified.json"));

    write_atomic(&parsed_path, &to_json(&doc.parsed, &parsed_path)?).await?;
    write_atomic(&simplified_path, &to_json(&doc.simplified, &simplified_path)?).await?;
    info!("Wrote {} and {}", parsed_path.display(), simplified_path.display());
    Ok((parsed_path, simplified_path))
}

// ── Range processing ─────────────────────────────────────────────────────

/// What happened to one index of a range.
#[derive(Debug, Clone)]
pub enum DocumentStatus {
    Processed(Box<ProcessedCirculaire>),
    /// At or below the cursor.
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub year: u32,
    pub index: u32,
    pub status: DocumentStatus,
}

/// Where and why a range run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchHalt {
    /// Index of the failure that reached the ceiling.
    pub index: u32,
    pub consecutive_failures: u32,
    pub successes: usize,
}

/// Item of a range run.
#[derive(Debug, Clone)]
pub enum RangeItem {
    Document(DocumentOutcome),
    /// Always the last item when present.
    Halted(BatchHalt),
}

/// Summary of a whole range run.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub outcomes: Vec<DocumentOutcome>,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub halted: Option<BatchHalt>,
}

/// Range-run state, advanced one index per [`step`](RangeRun::step).
#[derive(Debug)]
pub(crate) struct RangeRun {
    year: u32,
    /// `None` once the index space is exhausted.
    next: Option<u32>,
    end: u32,
    started: bool,
    fetched_any: bool,
    consecutive_failures: u32,
    successes: usize,
    failures: usize,
    pending_halt: Option<BatchHalt>,
    done: bool,
}

impl RangeRun {
    pub(crate) fn new(year: u32, start: u32, end: u32) -> Self {
        Self {
            year,
            next: Some(start),
            end,
            started: false,
            fetched_any: false,
            consecutive_failures: 0,
            successes: 0,
            failures: 0,
            pending_halt: None,
            done: false,
        }
    }

    fn finish(&mut self, pipeline: &CirculairePipeline) {
        self.done = true;
        info!(
            "Range {:02}: {} processed, {} failed",
            self.year, self.successes, self.failures
        );
        if let Some(cb) = pipeline.progress() {
            cb.on_range_complete(self.successes, self.failures);
        }
    }

    /// Next item, or `None` when the range is exhausted.
    pub(crate) async fn step(
        &mut self,
        pipeline: &CirculairePipeline,
        fetcher: &dyn DocumentFetcher,
        cursor: &dyn ProcessingCursor,
    ) -> Option<Result<RangeItem, CirculaireError>> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            let start = self.next.unwrap_or(self.end);
            info!("Range {:02}: circulars {}..={}", self.year, start, self.end);
            if let Some(cb) = pipeline.progress() {
                cb.on_range_start(self.year, start, self.end);
            }
        }
        if let Some(halt) = self.pending_halt.take() {
            if let Some(cb) = pipeline.progress() {
                cb.on_range_halted(&halt);
            }
            self.finish(pipeline);
            return Some(Ok(RangeItem::Halted(halt)));
        }
        let Some(index) = self.next.filter(|&i| i <= self.end) else {
            self.finish(pipeline);
            return None;
        };
        let year = self.year;
        self.next = index.checked_add(1);

        match cursor.last_processed(year) {
            Ok(Some(last)) if index <= last => {
                if let Some(cb) = pipeline.progress() {
                    cb.on_document_skipped(year, index);
                }
                return Some(Ok(RangeItem::Document(DocumentOutcome {
                    year,
                    index,
                    status: DocumentStatus::Skipped,
                })));
            }
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }

        let delay = pipeline.config().request_delay_ms;
        if self.fetched_any && delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.fetched_any = true;
        if let Some(cb) = pipeline.progress() {
            cb.on_document_start(year, index);
        }

        let status = match pipeline.fetch_and_process(fetcher, year, index).await {
            Ok(doc) => {
                if let Err(e) = cursor.advance(year, index) {
                    self.done = true;
                    return Some(Err(e));
                }
                self.consecutive_failures = 0;
                self.successes += 1;
                if let Some(cb) = pipeline.progress() {
                    cb.on_document_complete(year, index, doc.parsed.medications.len());
                }
                DocumentStatus::Processed(Box::new(doc))
            }
            Err(e) if e.is_document_failure() => {
                self.consecutive_failures += 1;
                self.failures += 1;
                warn!(
                    "Circular {:02}/{:02} failed ({} in a row): {}",
                    index, year, self.consecutive_failures, e
                );
                let error = e.to_string();
                if let Some(cb) = pipeline.progress() {
                    cb.on_document_failed(year, index, &error);
                }
                let ceiling = pipeline.config().max_consecutive_failures;
                if ceiling > 0 && self.consecutive_failures >= ceiling {
                    warn!(
                        "Halting range at {:02}/{:02} after {} consecutive failures ({} processed)",
                        index, year, self.consecutive_failures, self.successes
                    );
                    self.pending_halt = Some(BatchHalt {
                        index,
                        consecutive_failures: self.consecutive_failures,
                        successes: self.successes,
                    });
                }
                DocumentStatus::Failed { error }
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };
        Some(Ok(RangeItem::Document(DocumentOutcome { year, index, status })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{RecordType, SectionSummary};

    fn record(name: &str, lab: Option<&str>, record_type: RecordType) -> MedicationRecord {
        MedicationRecord {
            laboratory: lab.map(str::to_string),
            record_type,
            price_pharmacy: Some(1.526),
            ..MedicationRecord::named(name)
        }
    }

    fn parsed(medications: Vec<MedicationRecord>, number: Option<&str>) -> ParsedCirculaire {
        ParsedCirculaire {
            filename: "circ0425.pdf".into(),
            date: Some("2025-02-10".into()),
            circulaire_number: number.map(str::to_string),
            medications,
            laboratories: vec![],
            sections_found: Vec::<SectionSummary>::new(),
        }
    }

    #[test]
    fn simplify_groups_by_laboratory_and_type() {
        let p = parsed(
            vec![
                record("A", Some("SAIPH"), RecordType::New),
                record("B", None, RecordType::New),
                record("C", Some("SAIPH"), RecordType::Revised),
                record("D", Some("SAIPH"), RecordType::New),
            ],
            Some("2025/04"),
        );
        let entries = simplify(&p, &DocumentIdentity::from_filename("circ0425.pdf"));
        let keys: Vec<_> = entries
            .iter()
            .map(|e| (e.laboratory.as_str(), e.record_type, e.medications.len()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("SAIPH", RecordType::New, 2),
                (UNKNOWN_LABORATORY, RecordType::New, 1),
                ("SAIPH", RecordType::Revised, 1),
            ]
        );
        assert!(entries.iter().all(|e| e.circulaire == "2025/04"));
    }

    #[test]
    fn simplify_falls_back_to_filename_stem() {
        let p = parsed(vec![record("A", None, RecordType::New)], None);
        let entries = simplify(&p, &DocumentIdentity::from_filename("circ0425.pdf"));
        assert_eq!(entries[0].circulaire, "circ0425");
    }

    #[tokio::test]
    async fn write_outputs_creates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let identity = DocumentIdentity::from_filename("circ0425.pdf");
        let p = parsed(vec![record("A", None, RecordType::New)], Some("2025/04"));
        let doc = ProcessedCirculaire {
            simplified: simplify(&p, &identity),
            document: identity,
            extraction: ExtractionSummary {
                ocr_used: false,
                page_count: 1,
                page_errors: vec![],
                diagnostics: Default::default(),
            },
            parsed: p,
        };
        let (parsed_path, simplified_path) = write_outputs(&doc, dir.path()).await.unwrap();
        assert!(parsed_path.ends_with("circ0425.json"));
        assert!(simplified_path.ends_with("circ0425_simplified.json"));

        let back: ParsedCirculaire =
            serde_json::from_slice(&std::fs::read(&parsed_path).unwrap()).unwrap();
        assert_eq!(back, doc.parsed);
        let simple: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&simplified_path).unwrap()).unwrap();
        assert_eq!(simple[0]["laboratory"], "Unknown");
        assert_eq!(simple[0]["type"], "new");
    }
}
