//! PDF capabilities: text layer and page rasterisation.
//!
//! The extractor only sees the two traits below. [`PdfiumBackend`] is the
//! production implementation; tests substitute fakes so the OCR fallback
//! decision can be exercised without native libraries.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole parse. Every call is moved onto Tokio's
//! blocking pool so the worker threads never stall on a large scan.

use crate::error::CirculaireError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::debug;

/// Reads the embedded text layer, one string per page.
#[async_trait]
pub trait TextLayerSource: Send + Sync {
    /// Fails with [`CirculaireError::UnreadableDocument`] when the bytes are
    /// not a PDF. A page without a text layer yields an empty string.
    async fn page_texts(&self, bytes: &[u8], filename: &str)
        -> Result<Vec<String>, CirculaireError>;
}

/// Renders one page to a bitmap.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// `page_index` is 0-based. Errors are per page and reported as text.
    async fn render_page(
        &self,
        bytes: &[u8],
        page_index: usize,
        dpi: u32,
        max_pixels: u32,
    ) -> Result<DynamicImage, String>;
}

/// pdfium-backed [`TextLayerSource`] and [`PageRenderer`].
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    /// Directory holding the pdfium shared library. `None` uses
    /// `PDFIUM_LIB_PATH`, then the working directory, then the system loader.
    pub library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    /// Bind once up front so a missing library is reported before any
    /// document is touched.
    pub async fn check(&self) -> Result<(), CirculaireError> {
        let dir = self.library_dir.clone();
        tokio::task::spawn_blocking(move || bind_pdfium(dir.as_ref()).map(|_| ()))
            .await
            .map_err(|e| CirculaireError::Internal(format!("Pdfium bind task panicked: {}", e)))?
    }
}

/// Bind to pdfium: explicit dir, `PDFIUM_LIB_PATH`, `./`, then the system library.
pub fn bind_pdfium(library_dir: Option<&PathBuf>) -> Result<Pdfium, CirculaireError> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(dir) = library_dir {
        dirs.push(dir.clone());
    }
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        dirs.push(PathBuf::from(dir));
    }
    dirs.push(PathBuf::from("./"));

    let mut tried = Vec::new();
    for dir in &dirs {
        let lib = Pdfium::pdfium_platform_library_name_at_path(dir);
        match Pdfium::bind_to_library(&lib) {
            Ok(bindings) => {
                debug!("Bound pdfium from {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
            Err(e) => tried.push(format!("{}: {:?}", lib.display(), e)),
        }
    }
    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            tried.push(format!("system library: {:?}", e));
            Err(CirculaireError::PdfiumBindingFailed(tried.join("; ")))
        }
    }
}

fn unreadable(filename: &str, e: PdfiumError) -> CirculaireError {
    CirculaireError::UnreadableDocument {
        filename: filename.to_string(),
        reason: format!("{:?}", e),
    }
}

fn page_texts_blocking(
    library_dir: Option<&PathBuf>,
    bytes: &[u8],
    filename: &str,
) -> Result<Vec<String>, CirculaireError> {
    let pdfium = bind_pdfium(library_dir)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| unreadable(filename, e))?;

    let mut texts = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        // A page whose text layer cannot be read counts as having none.
        let text = page.text().map(|t| t.all()).unwrap_or_default();
        debug!("Page {}: {} text-layer chars", idx + 1, text.chars().count());
        texts.push(text);
    }
    Ok(texts)
}

#[async_trait]
impl TextLayerSource for PdfiumBackend {
    async fn page_texts(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<Vec<String>, CirculaireError> {
        let dir = self.library_dir.clone();
        let bytes = bytes.to_vec();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || page_texts_blocking(dir.as_ref(), &bytes, &filename))
            .await
            .map_err(|e| CirculaireError::Internal(format!("Text layer task panicked: {}", e)))?
    }
}

#[async_trait]
impl PageRenderer for PdfiumBackend {
    async fn render_page(
        &self,
        bytes: &[u8],
        page_index: usize,
        dpi: u32,
        max_pixels: u32,
    ) -> Result<DynamicImage, String> {
        let dir = self.library_dir.clone();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(dir.as_ref()).map_err(|e| e.to_string())?;
            super::render::render_page_blocking(&pdfium, &bytes, page_index, dpi, max_pixels)
        })
        .await
        .map_err(|e| format!("Render task panicked: {}", e))?
    }
}
