//! Vision-LLM recognizer: a page bitmap → transcription via `edgequake-llm`.
//!
//! An alternative to Tesseract for hosts without the Arabic language pack,
//! or for scans too degraded for classic OCR. The page travels as a
//! lossless base64 PNG with `detail: "high"`, since small printed prices are
//! exactly what a low-detail tile loses.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with a 500 ms base and 3 retries waits
//! 500 ms → 1 s → 2 s. The extractor's per-page timeout still bounds the
//! whole exchange.

use super::ocr::TextRecognizer;
use crate::error::CirculaireError;
use crate::prompts::{page_instruction, TRANSCRIPTION_PROMPT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// [`TextRecognizer`] backed by a multimodal LLM.
#[derive(Clone)]
pub struct VisionRecognizer {
    provider: Arc<dyn LLMProvider>,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_tokens: usize,
}

impl std::fmt::Debug for VisionRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionRecognizer")
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish_non_exhaustive()
    }
}

impl VisionRecognizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_retries: 3,
            retry_backoff_ms: 500,
            max_tokens: 4096,
        }
    }

    /// Named provider (`"openai"`, `"anthropic"`, ...) with an optional model.
    pub fn from_provider(name: &str, model: Option<&str>) -> Result<Self, CirculaireError> {
        let model = model.unwrap_or(DEFAULT_VISION_MODEL);
        let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            CirculaireError::RecognizerNotConfigured {
                engine: format!("vision:{name}"),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider))
    }

    /// `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set,
    /// otherwise whatever provider the factory detects from API keys.
    pub fn from_env() -> Result<Self, CirculaireError> {
        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                return Self::from_provider(&prov, Some(&model));
            }
        }
        let (provider, _embedding) =
            ProviderFactory::from_env().map_err(|e| CirculaireError::RecognizerNotConfigured {
                engine: "vision".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment.\n\
                     Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or EDGEQUAKE_LLM_PROVIDER.\n\
                     Error: {}",
                    e
                ),
            })?;
        Ok(Self::new(provider))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

/// Encode a page as a base64 PNG attachment.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    async fn recognize(&self, image: &DynamicImage, languages: &str) -> Result<String, String> {
        let image_data = encode_page(image).map_err(|e| format!("encoding page: {}", e))?;
        let messages = vec![
            ChatMessage::system(TRANSCRIPTION_PROMPT),
            ChatMessage::user_with_images(&page_instruction(languages), vec![image_data]),
        ];
        let options = self.options();

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Vision OCR: retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        "Vision OCR: {} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    warn!("Vision OCR: attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e.to_string());
                }
            }
        }
        Err(last_err.unwrap_or_else(|| "unknown error".to_string()))
    }

    fn name(&self) -> &str {
        "vision"
    }
}
