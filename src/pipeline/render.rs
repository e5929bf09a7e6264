//! Page rasterisation for OCR.
//!
//! ## Why DPI first, then a pixel cap?
//!
//! Tesseract is tuned for ~300 DPI input, so the target width is derived
//! from the page's physical width. Circulars are A4, but the odd A3 annex
//! or poster-sized scan would blow up memory at 300 DPI; `max_pixels`
//! caps the longest edge regardless of physical size.

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Target pixel width for a page `width_points` wide.
pub fn target_width(width_points: f32, dpi: u32, max_pixels: u32) -> i32 {
    let px = (width_points / POINTS_PER_INCH * dpi as f32).round();
    let px = if px.is_finite() && px >= 1.0 { px as u32 } else { 1 };
    px.min(max_pixels).max(1) as i32
}

/// Render page `page_index` (0-based) of `bytes`. Runs on a blocking thread.
pub fn render_page_blocking(
    pdfium: &Pdfium,
    bytes: &[u8],
    page_index: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, String> {
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| format!("{:?}", e))?;
    let pages = document.pages();
    let total = pages.len() as usize;
    if page_index >= total {
        return Err(format!("page {} out of range (total={})", page_index + 1, total));
    }
    let page = pages
        .get(page_index as u16)
        .map_err(|e| format!("{:?}", e))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width(page.width().value, dpi, max_pixels))
        .set_maximum_height(max_pixels as i32);

    let image = page
        .render_with_config(&render_config)
        .map_err(|e| format!("{:?}", e))?
        .as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}
