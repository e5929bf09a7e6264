//! # circulaire-extract
//!
//! Extract medication price records from Tunisian pharmaceutical price
//! circulars (PDF, born-digital or scanned) and reconcile them against a
//! product catalog.
//!
//! ## Why this crate?
//!
//! The circulars mix Arabic section headers, French product designations
//! and three-decimal dinar prices in one table layout. Some are born
//! digital with a usable text layer, some carry a text layer whose
//! embedded fonts turn Arabic into garbage, many are faxed scans. This
//! crate picks the text layer or OCR per document, parses the tables with
//! line-local rules, fills missing public prices from the regulated markup
//! tiers, and matches each record to a catalog product with a brand-gated
//! weighted score, without ever scanning the whole catalog.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input     local file, URL, or (year, index) from the publisher
//!  ├─ 2. Extract   pdfium text layer, or render + OCR (Tesseract / vision LLM)
//!  ├─ 3. Normalize Arabic presentation forms, diacritics, whitespace
//!  ├─ 4. Parse     header, sections, laboratories, medication lines
//!  ├─ 5. Price     infer missing public prices from the markup tiers
//!  ├─ 6. Match     exact code → brand prefix → laboratory, scored 0–100
//!  └─ 7. Output    parsed + simplified JSON views
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use circulaire_extract::{CirculairePipeline, InMemoryCatalog, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = CirculairePipeline::with_defaults(PipelineConfig::default());
//!     let doc = pipeline.process_input("circ0425.pdf").await?;
//!     println!("{} records", doc.parsed.medications.len());
//!
//!     let catalog = InMemoryCatalog::load(Path::new("catalog.json"))?;
//!     for m in pipeline.match_records(&doc.parsed.medications, &catalog)? {
//!         println!("{} → {:?} ({:.0})", m.record.name, m.status, m.confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `circulaire` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! circulaire-extract = { version = "0.3", default-features = false }
//! ```
//!
//! ## Native requirements
//!
//! pdfium must be loadable (`PDFIUM_LIB_PATH`, the working directory, or a
//! system install). OCR needs the `tesseract` binary with the `ara`, `fra`
//! and `eng` language packs, or an LLM provider for the vision recognizer.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod cursor;
pub mod error;
pub mod lexicon;
pub mod matcher;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod pricing;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use cursor::{InMemoryCursor, JsonFileCursor, ProcessingCursor};
pub use error::{CirculaireError, PageError};
pub use matcher::source::{Candidate, CandidateFilter, CandidateSource, InMemoryCatalog};
pub use matcher::{match_record, MatchResult, MatchStage, MatchStatus, ProductMatcher};
pub use normalize::normalize;
pub use output::{
    Category, DocumentIdentity, ExtractionResult, MedicationRecord, Origin, ParseResult,
    ParsedCirculaire, ProcessedCirculaire, RecordType, SimplifiedEntry, SimplifiedMedication,
    Specialty,
};
pub use parser::parse_records;
pub use pipeline::extract::Extractor;
pub use pipeline::fetch::{DocumentFetcher, HttpFetcher};
pub use pipeline::input::{resolve_input, FetchedDocument};
pub use pipeline::ocr::{TesseractRecognizer, TextRecognizer};
pub use pipeline::pdf::{PageRenderer, PdfiumBackend, TextLayerSource};
pub use pipeline::vision::VisionRecognizer;
pub use pricing::infer_public_price;
pub use process::{
    extract_text, write_outputs, BatchHalt, BatchOutcome, CirculairePipeline, DocumentOutcome,
    DocumentStatus, RangeItem,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback};
pub use stream::{process_range_stream, RangeStream};
