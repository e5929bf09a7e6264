//! Extraction: PDF bytes → normalized text, with OCR fallback.
//!
//! ## The fallback decision
//!
//! The decision is made once per document, not per page. Circulars are
//! either born digital (every page has a good text layer) or scanned
//! (none has), and mixing sources page by page produced inconsistent
//! line orders for the parser. OCR runs for the whole document when any of
//! these hold:
//!
//! * OCR is forced by configuration;
//! * the text layer averages fewer than `min_chars_per_page` characters;
//! * it holds fewer than `min_arabic_letters` Arabic letters (broken
//!   embedded fonts turn the Arabic headers into Latin garbage);
//! * the medication-line check finds no price row at all.
//!
//! ## Time budget
//!
//! Each page's render + recognize is wrapped in `tokio::time::timeout`.
//! On expiry the future is dropped (the Tesseract child is killed and its
//! temp dir removed) and the page is recorded as a [`PageError`]; the
//! document carries on with the remaining pages.

use super::ocr::TextRecognizer;
use super::pdf::{PageRenderer, TextLayerSource};
use super::preprocess::prepare_for_ocr;
use crate::config::PipelineConfig;
use crate::error::{CirculaireError, PageError};
use crate::normalize::{arabic_letter_count, normalize_lines};
use crate::output::{ExtractionResult, PageExtraction, PageSource};
use crate::parser::count_medication_lines;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why the text layer was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrReason {
    Forced,
    LowDensity { chars: usize, required: usize },
    NoArabic { letters: usize, required: usize },
    NoMedicationLines,
}

impl fmt::Display for OcrReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OcrReason::Forced => write!(f, "OCR forced"),
            OcrReason::LowDensity { chars, required } => {
                write!(f, "text layer has {chars} chars, {required} required")
            }
            OcrReason::NoArabic { letters, required } => {
                write!(f, "text layer has {letters} Arabic letters, {required} required")
            }
            OcrReason::NoMedicationLines => write!(f, "no medication line in text layer"),
        }
    }
}

fn non_whitespace(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Judge normalized per-page text-layer output. `None` means it suffices.
pub fn assess_text_layer(pages: &[String], config: &PipelineConfig) -> Option<OcrReason> {
    if config.force_ocr {
        return Some(OcrReason::Forced);
    }
    let chars: usize = pages.iter().map(|p| non_whitespace(p)).sum();
    let required = config.min_chars_per_page * pages.len();
    if chars < required {
        return Some(OcrReason::LowDensity { chars, required });
    }
    if config.min_arabic_letters > 0 {
        let letters: usize = pages.iter().map(|p| arabic_letter_count(p)).sum();
        if letters < config.min_arabic_letters {
            return Some(OcrReason::NoArabic {
                letters,
                required: config.min_arabic_letters,
            });
        }
    }
    if config.check_medication_lines && pages.iter().all(|p| count_medication_lines(p) == 0) {
        return Some(OcrReason::NoMedicationLines);
    }
    None
}

/// Text-layer-first extractor with per-page OCR fallback.
#[derive(Clone)]
pub struct Extractor {
    text_layer: Arc<dyn TextLayerSource>,
    renderer: Arc<dyn PageRenderer>,
    recognizer: Arc<dyn TextRecognizer>,
    config: PipelineConfig,
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("recognizer", &self.recognizer.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    pub fn new(
        text_layer: Arc<dyn TextLayerSource>,
        renderer: Arc<dyn PageRenderer>,
        recognizer: Arc<dyn TextRecognizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            text_layer,
            renderer,
            recognizer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract normalized text from `bytes`.
    ///
    /// Fails only when the bytes cannot be opened as a PDF.
    pub async fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<ExtractionResult, CirculaireError> {
        if bytes.is_empty() {
            return Err(CirculaireError::UnreadableDocument {
                filename: filename.to_string(),
                reason: "document is empty".to_string(),
            });
        }

        let start = Instant::now();
        let layer: Vec<String> = self
            .text_layer
            .page_texts(bytes, filename)
            .await?
            .iter()
            .map(|t| normalize_lines(t))
            .collect();
        let page_count = layer.len();
        if page_count == 0 {
            return Err(CirculaireError::UnreadableDocument {
                filename: filename.to_string(),
                reason: "document has no pages".to_string(),
            });
        }
        let layer_ms = start.elapsed().as_millis() as u64;

        let Some(reason) = assess_text_layer(&layer, &self.config) else {
            info!("{}: text layer used ({} pages)", filename, page_count);
            let pages = layer
                .iter()
                .enumerate()
                .map(|(i, text)| PageExtraction {
                    page_num: i + 1,
                    source: PageSource::TextLayer,
                    chars: non_whitespace(text),
                    duration_ms: layer_ms / page_count as u64,
                })
                .collect();
            return Ok(ExtractionResult {
                text: layer.join("\n"),
                ocr_used: false,
                page_count,
                pages,
                page_errors: Vec::new(),
            });
        };

        info!(
            "{}: running {} OCR on {} pages ({})",
            filename,
            self.recognizer.name(),
            page_count,
            reason
        );
        let mut texts = Vec::with_capacity(page_count);
        let mut pages = Vec::with_capacity(page_count);
        let mut page_errors = Vec::new();

        for (idx, layer_text) in layer.iter().enumerate() {
            let page_start = Instant::now();
            let (text, source) = match self.ocr_page(bytes, idx).await {
                Ok(text) => (normalize_lines(&text), PageSource::Ocr),
                Err(e) => {
                    warn!("{}: {}", filename, e);
                    page_errors.push(e);
                    // Keep whatever the text layer had for this page.
                    if layer_text.is_empty() {
                        (String::new(), PageSource::Empty)
                    } else {
                        (layer_text.clone(), PageSource::TextLayer)
                    }
                }
            };
            debug!("Page {}: {:?}, {} chars", idx + 1, source, non_whitespace(&text));
            pages.push(PageExtraction {
                page_num: idx + 1,
                source,
                chars: non_whitespace(&text),
                duration_ms: page_start.elapsed().as_millis() as u64,
            });
            texts.push(text);
        }

        Ok(ExtractionResult {
            text: texts.join("\n"),
            ocr_used: true,
            page_count,
            pages,
            page_errors,
        })
    }

    /// Render and recognize one page within the time budget.
    async fn ocr_page(&self, bytes: &[u8], idx: usize) -> Result<String, PageError> {
        let page = idx + 1;
        let secs = self.config.ocr_page_timeout_secs;
        let work = async {
            let image = self
                .renderer
                .render_page(bytes, idx, self.config.dpi, self.config.max_rendered_pixels)
                .await
                .map_err(|detail| PageError::RenderFailed { page, detail })?;
            let image = if self.config.preprocess_for_ocr {
                tokio::task::spawn_blocking(move || prepare_for_ocr(&image))
                    .await
                    .map_err(|e| PageError::RenderFailed {
                        page,
                        detail: format!("preprocess task panicked: {}", e),
                    })?
            } else {
                image
            };
            self.recognizer
                .recognize(&image, &self.config.ocr_languages)
                .await
                .map_err(|detail| PageError::RecognitionFailed { page, detail })
        };
        match tokio::time::timeout(Duration::from_secs(secs), work).await {
            Ok(result) => result,
            Err(_) => Err(PageError::OcrTimeout { page, secs }),
        }
    }
}
