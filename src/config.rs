//! Configuration for the extraction-and-matching pipeline.
//!
//! Every threshold the pipeline consults lives in [`PipelineConfig`], built
//! via [`PipelineConfigBuilder`]. The orchestrator receives it once at
//! construction and never looks anything up at runtime, so two runs with the
//! same config and the same bytes produce the same records.
//!
//! # Design choice: builder over constructor
//! The config has close to twenty knobs. The builder lets callers set only
//! what they care about and rely on documented defaults for the rest, and
//! `build()` is the single place where values are validated.

use crate::error::CirculaireError;
use serde::{Deserialize, Serialize};

/// Immutable pipeline configuration.
///
/// # Example
/// ```rust
/// use circulaire_extract::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(300)
///     .ocr_page_timeout_secs(45)
///     .match_threshold(65.0)
///     .build()
///     .unwrap();
/// assert_eq!(config.brand_candidate_limit, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    // ── Extraction ────────────────────────────────────────────────────────
    /// Rendering DPI for OCR. Range: 72–600. Default: 300.
    ///
    /// Tesseract's Arabic model degrades quickly below 300 DPI: dots on
    /// ب/ت/ث merge and the shaping becomes unreadable.
    pub dpi: u32,

    /// Cap on the rendered width/height in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Language set handed to the recognizer. Default: `"ara+fra+eng"`.
    pub ocr_languages: String,

    /// Time budget for recognizing one page, in seconds. Default: 60.
    pub ocr_page_timeout_secs: u64,

    /// Minimum average text-layer characters per page. Default: 50.
    ///
    /// Below this the text layer is treated as absent and the whole
    /// document is OCR'd.
    pub min_chars_per_page: usize,

    /// Minimum Arabic letters in the whole text layer. Default: 3. `0` disables.
    ///
    /// Circulars always carry Arabic section headers. PDFs with broken
    /// embedded fonts yield plenty of characters but none of them Arabic.
    pub min_arabic_letters: usize,

    /// Run the medication-line check on the text layer. Default: true.
    pub check_medication_lines: bool,

    /// Force OCR regardless of the text layer. Default: false.
    pub force_ocr: bool,

    /// Binarise pages before OCR (grayscale, 2x upscale, Otsu). Default: true.
    pub preprocess_for_ocr: bool,

    /// Below this many non-whitespace characters a document is unreadable
    /// and never reaches the parser. Default: 50.
    pub min_document_chars: usize,

    // ── Parsing ───────────────────────────────────────────────────────────
    /// Drop veterinary sections from the output. Default: false.
    pub skip_veterinary: bool,

    // ── Matching ──────────────────────────────────────────────────────────
    /// Minimum confidence for a match to be accepted. Default: 60.
    pub match_threshold: f64,

    /// Result bound for the brand-prefix query. Default: 100.
    pub brand_candidate_limit: usize,

    /// Result bound for the laboratory-only query. Default: 200.
    pub laboratory_candidate_limit: usize,

    // ── Batch ─────────────────────────────────────────────────────────────
    /// Consecutive failures after which a range run halts. Default: 5. `0` never halts.
    pub max_consecutive_failures: u32,

    /// Pause between two fetches in a range run, in ms. Default: 1000.
    pub request_delay_ms: u64,

    /// Directory URL the circulars are published under.
    pub base_url: String,

    /// Download timeout in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Largest accepted document in bytes. Default: 20 MiB.
    pub max_file_size_bytes: u64,
}

/// Where the regulator publishes price circulars.
pub const DEFAULT_BASE_URL: &str = "http://www.phct.com.tn/images/DocumentsPCT/Circulaires/";

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 4000,
            ocr_languages: "ara+fra+eng".to_string(),
            ocr_page_timeout_secs: 60,
            min_chars_per_page: 50,
            min_arabic_letters: 3,
            check_medication_lines: true,
            force_ocr: false,
            preprocess_for_ocr: true,
            min_document_chars: 50,
            skip_veterinary: false,
            match_threshold: 60.0,
            brand_candidate_limit: 100,
            laboratory_candidate_limit: 200,
            max_consecutive_failures: 5,
            request_delay_ms: 1000,
            base_url: DEFAULT_BASE_URL.to_string(),
            download_timeout_secs: 60,
            max_file_size_bytes: 20 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr_languages(mut self, langs: impl Into<String>) -> Self {
        self.config.ocr_languages = langs.into();
        self
    }

    pub fn ocr_page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_page_timeout_secs = secs;
        self
    }

    pub fn min_chars_per_page(mut self, n: usize) -> Self {
        self.config.min_chars_per_page = n;
        self
    }

    pub fn min_arabic_letters(mut self, n: usize) -> Self {
        self.config.min_arabic_letters = n;
        self
    }

    pub fn check_medication_lines(mut self, v: bool) -> Self {
        self.config.check_medication_lines = v;
        self
    }

    pub fn force_ocr(mut self, v: bool) -> Self {
        self.config.force_ocr = v;
        self
    }

    pub fn preprocess_for_ocr(mut self, v: bool) -> Self {
        self.config.preprocess_for_ocr = v;
        self
    }

    pub fn min_document_chars(mut self, n: usize) -> Self {
        self.config.min_document_chars = n;
        self
    }

    pub fn skip_veterinary(mut self, v: bool) -> Self {
        self.config.skip_veterinary = v;
        self
    }

    pub fn match_threshold(mut self, t: f64) -> Self {
        self.config.match_threshold = t;
        self
    }

    pub fn brand_candidate_limit(mut self, n: usize) -> Self {
        self.config.brand_candidate_limit = n;
        self
    }

    pub fn laboratory_candidate_limit(mut self, n: usize) -> Self {
        self.config.laboratory_candidate_limit = n;
        self
    }

    pub fn max_consecutive_failures(mut self, n: u32) -> Self {
        self.config.max_consecutive_failures = n;
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.config.base_url = url;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_size_bytes = bytes;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, CirculaireError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(CirculaireError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.ocr_page_timeout_secs == 0 {
            return Err(CirculaireError::InvalidConfig(
                "OCR page timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr_languages.trim().is_empty() {
            return Err(CirculaireError::InvalidConfig(
                "OCR language set must not be empty".into(),
            ));
        }
        if !(0.0..=100.0).contains(&c.match_threshold) {
            return Err(CirculaireError::InvalidConfig(format!(
                "Match threshold must be within 0–100, got {}",
                c.match_threshold
            )));
        }
        if c.brand_candidate_limit == 0 || c.laboratory_candidate_limit == 0 {
            return Err(CirculaireError::InvalidConfig(
                "Candidate limits must be ≥ 1".into(),
            ));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(CirculaireError::InvalidConfig(format!(
                "Base URL must be http(s), got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::builder().build().expect("defaults build");
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.ocr_languages, "ara+fra+eng");
        assert_eq!(config.match_threshold, 60.0);
        assert_eq!(config.laboratory_candidate_limit, 200);
    }

    #[test]
    fn rejects_out_of_range_dpi() {
        let err = PipelineConfig::builder().dpi(1200).build().unwrap_err();
        assert!(err.to_string().contains("DPI"), "got: {err}");
    }

    #[test]
    fn rejects_threshold_above_100() {
        let err = PipelineConfig::builder()
            .match_threshold(120.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("threshold"), "got: {err}");
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(PipelineConfig::builder()
            .ocr_page_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let config = PipelineConfig::builder()
            .base_url("https://mirror.example/circ")
            .build()
            .expect("valid");
        assert_eq!(config.base_url, "https://mirror.example/circ/");
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(PipelineConfig::builder()
            .base_url("ftp://example/")
            .build()
            .is_err());
    }
}
