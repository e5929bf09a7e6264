//! Extraction stages: PDF bytes → normalized text.
//!
//! Each submodule implements exactly one step, and the two native
//! capabilities (pdfium, the OCR engine) sit behind traits so the fallback
//! logic in [`extract`] can be tested with fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input/fetch ──▶ pdf (text layer) ──▶ extract ──sufficient──▶ text
//!  (bytes)                               │
//!                                        └─OCR─▶ render ─▶ preprocess ─▶ ocr | vision
//! ```
//!
//! 1. [`input`] / [`fetch`]: resolve a path, URL or (year, index) to
//!    validated bytes
//! 2. [`pdf`]   : text layer and rasterisation capabilities, pdfium-backed
//! 3. [`extract`]: the per-document OCR decision and per-page time budget
//! 4. [`render`]: DPI-derived page size, capped in pixels
//! 5. [`preprocess`]: grayscale, upscale, Otsu binarisation
//! 6. [`ocr`] / [`vision`]: Tesseract subprocess or vision LLM

pub mod extract;
pub mod fetch;
pub mod input;
pub mod ocr;
pub mod pdf;
pub mod preprocess;
pub mod render;
pub mod vision;
