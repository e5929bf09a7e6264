//! Bitmap clean-up before Tesseract.
//!
//! Scanned circulars are faxed, photocopied and rescanned. Tesseract's
//! Arabic model reads them far better once the page is grayscale, enlarged
//! 2x and binarised with a global Otsu threshold, then lightly sharpened.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

const UPSCALE: u32 = 2;

/// Sharpening kernel applied after binarisation.
const SHARPEN: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Grayscale, 2x upscale, Otsu binarisation, sharpen.
pub fn prepare_for_ocr(img: &DynamicImage) -> DynamicImage {
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    let mut big = imageops::resize(&gray, w * UPSCALE, h * UPSCALE, FilterType::Triangle);
    let t = otsu_threshold(&big);
    binarize(&mut big, t);
    DynamicImage::ImageLuma8(imageops::filter3x3(&big, &SHARPEN))
}

/// Otsu's threshold: the level maximising between-class variance.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &n)| level as f64 * n as f64)
        .sum();

    let (mut weight_bg, mut sum_bg) = (0u64, 0.0f64);
    let (mut best_level, mut best_variance) = (0u8, -1.0f64);
    for (level, &n) in histogram.iter().enumerate() {
        weight_bg += n;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += level as f64 * n as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let variance = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }
    best_level
}

/// Pixels above `threshold` become white, the rest black.
fn binarize(img: &mut GrayImage, threshold: u8) {
    for p in img.pixels_mut() {
        *p = Luma([if p[0] > threshold { 255 } else { 0 }]);
    }
}
