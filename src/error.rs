//! Error types for the circulaire-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CirculaireError`]: **Fatal** for the current unit of work: the
//!   document cannot be opened at all, the catalog capability broke its
//!   contract, the configuration is invalid. In a batch run a fatal document
//!   error only skips that document; the range continues.
//!
//! * [`PageError`]: **Non-fatal**: one page could not be rendered or
//!   recognized (or ran out of its OCR time budget). Stored inside
//!   [`crate::output::ExtractionResult`] so callers can see which pages
//!   contributed partial text without losing the rest of the document.
//!
//! "Header not found" and "line not recognized" are not errors at all. They
//! are counters in [`crate::output::ParseDiagnostics`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the circulaire-extract library.
#[derive(Debug, Error)]
pub enum CirculaireError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The bytes cannot be opened as a PDF document.
    #[error("Cannot read '{filename}' as a PDF document: {reason}")]
    UnreadableDocument { filename: String, reason: String },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file or download does not start with the `%PDF` magic bytes.
    #[error("'{source_name}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    /// The document exceeds the configured size limit.
    #[error("'{source_name}' is {size} bytes, above the {limit}-byte limit\nRaise --max-file-size if this is expected.")]
    DocumentTooLarge {
        source_name: String,
        size: u64,
        limit: u64,
    },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The fetcher has no document for the requested circular.
    #[error("Circular {index:02}/{year:02} was not found")]
    DocumentNotFound { year: u32, index: u32 },

    // ── Matching errors ───────────────────────────────────────────────────
    /// The candidate source broke its contract (wrong code, too many rows, ...).
    #[error("Candidate source violated its contract: {0}")]
    InvalidCandidateSource(String),

    /// The candidate source could not be queried at all.
    #[error("Candidate source unavailable: {0}")]
    CandidateSourceUnavailable(String),

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The selected OCR engine cannot be used (binary missing, no provider).
    #[error("OCR engine '{engine}' is not configured.\n{hint}")]
    RecognizerNotConfigured { engine: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The processing cursor could not be loaded or saved.
    #[error("Processing cursor at '{path}' is unusable: {reason}")]
    CursorStoreFailed { path: PathBuf, reason: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium.\n\
  • Place libpdfium next to the working directory.\n\
  • Install pdfium system-wide so the dynamic loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CirculaireError {
    /// Whether this failure counts toward the batch stop condition.
    ///
    /// Missing documents and unreadable documents count; a broken
    /// configuration or pdfium binding is not a per-document failure and is
    /// propagated instead.
    pub fn is_document_failure(&self) -> bool {
        !matches!(
            self,
            CirculaireError::InvalidConfig(_)
                | CirculaireError::PdfiumBindingFailed(_)
                | CirculaireError::RecognizerNotConfigured { .. }
                | CirculaireError::CursorStoreFailed { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::ExtractionResult::page_errors`]. The page's
/// contribution to the document text becomes empty (or its text layer).
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// OCR for the page exceeded its time budget.
    #[error("Page {page}: OCR timed out after {secs}s")]
    OcrTimeout { page: usize, secs: u64 },

    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The recognizer returned an error.
    #[error("Page {page}: text recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::OcrTimeout { page, .. }
            | PageError::RenderFailed { page, .. }
            | PageError::RecognitionFailed { page, .. } => *page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_document_display() {
        let e = CirculaireError::UnreadableDocument {
            filename: "circ0125.pdf".into(),
            reason: "empty input".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("circ0125.pdf"), "got: {msg}");
        assert!(msg.contains("empty input"), "got: {msg}");
    }

    #[test]
    fn document_not_found_pads_index() {
        let e = CirculaireError::DocumentNotFound {
            year: 25,
            index: 3,
        };
        assert!(e.to_string().contains("03/25"), "got: {e}");
    }

    #[test]
    fn document_failures_are_classified() {
        assert!(CirculaireError::UnreadableDocument {
            filename: "x".into(),
            reason: "y".into()
        }
        .is_document_failure());
        assert!(CirculaireError::DocumentNotFound {
            year: 25,
            index: 1
        }
        .is_document_failure());
        assert!(!CirculaireError::InvalidConfig("dpi".into()).is_document_failure());
        assert!(!CirculaireError::PdfiumBindingFailed("missing".into()).is_document_failure());
    }

    #[test]
    fn page_error_reports_page() {
        let e = PageError::OcrTimeout { page: 4, secs: 60 };
        assert_eq!(e.page(), 4);
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::RenderFailed {
            page: 2,
            detail: "bitmap".into(),
        };
        let json = serde_json::to_string(&e).expect("serialise");
        let back: PageError = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, e);
    }
}
