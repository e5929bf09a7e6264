//! Text recognition capability and the Tesseract implementation.
//!
//! ## Why a subprocess?
//!
//! Tesseract's C API is large and its Rust bindings pull in a C++ build.
//! The `tesseract` binary is present on every system that has the language
//! packs installed, so the page is written as a PNG into a scoped temp
//! directory and recognized with `--psm 6` (uniform block of text), which
//! suits the table rows of a price circular.
//!
//! The child is spawned with `kill_on_drop`: when the extractor's per-page
//! timeout drops the future, the process is killed and the [`TempDir`] is
//! removed on the same path.

use crate::error::CirculaireError;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::PathBuf;
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Recognizes text in a bitmap.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// `languages` uses Tesseract's `+`-joined codes, e.g. `"ara+fra+eng"`.
    async fn recognize(&self, image: &DynamicImage, languages: &str) -> Result<String, String>;

    /// Short engine name for logs and errors.
    fn name(&self) -> &str;
}

/// Runs the `tesseract` binary.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    pub binary: PathBuf,
    /// Page segmentation mode. Default: 6.
    pub psm: u8,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            psm: 6,
        }
    }
}

impl TesseractRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Verify the binary runs.
    pub async fn check(&self) -> Result<(), CirculaireError> {
        let status = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => Err(self.not_configured(format!(
                "`{} --version` exited with {}",
                self.binary.display(),
                s
            ))),
            Err(e) => Err(self.not_configured(format!(
                "cannot run `{}`: {}",
                self.binary.display(),
                e
            ))),
        }
    }

    fn not_configured(&self, detail: String) -> CirculaireError {
        CirculaireError::RecognizerNotConfigured {
            engine: "tesseract".to_string(),
            hint: format!(
                "{detail}\nInstall tesseract with the ara, fra and eng language packs, \
                 or pass --ocr-engine vision."
            ),
        }
    }
}

/// PNG-encode `image` to `path` on the blocking pool.
async fn write_png(image: DynamicImage, path: PathBuf) -> Result<(), String> {
    tokio::task::spawn_blocking(move || {
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| format!("writing page image: {}", e))
    })
    .await
    .map_err(|e| format!("png encode task panicked: {}", e))?
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &DynamicImage, languages: &str) -> Result<String, String> {
        let dir = TempDir::new().map_err(|e| format!("temp dir: {}", e))?;
        let png = dir.path().join("page.png");
        write_png(image.clone(), png.clone()).await?;

        let psm = self.psm.to_string();
        let output = Command::new(&self.binary)
            .arg(&png)
            .arg("stdout")
            .args(["-l", languages, "--psm", psm.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("cannot run {}: {}", self.binary.display(), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract returned {} chars", text.chars().count());
        Ok(text)
    }

    fn name(&self) -> &str {
        "tesseract"
    }
}
