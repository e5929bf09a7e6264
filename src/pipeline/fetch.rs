//! Fetching circulars by (year, index).
//!
//! The regulator publishes circular N of year YY as `circNNYY.pdf`, but the
//! capitalisation of the prefix changed over the years. [`HttpFetcher`]
//! tries each variant in turn; a 404 on all of them means the circular does
//! not exist (yet), which a range run counts as a failure.

use super::input::{check_pdf, http_client, transport_error, FetchedDocument};
use crate::config::PipelineConfig;
use crate::error::CirculaireError;
use crate::output::DocumentIdentity;
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

/// Filename prefixes seen on the publication server, most common first.
pub const FILENAME_PREFIXES: [&str; 3] = ["circ", "Circ", "CIRC"];

/// Candidate filenames for circular `index` of two-digit `year`.
pub fn candidate_filenames(year: u32, index: u32) -> Vec<String> {
    FILENAME_PREFIXES
        .iter()
        .map(|prefix| format!("{prefix}{index:02}{year:02}.pdf"))
        .collect()
}

/// Source of circular documents by number.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// `Ok(None)` when the circular does not exist.
    async fn fetch(&self, year: u32, index: u32) -> Result<Option<FetchedDocument>, CirculaireError>;
}

/// Downloads circulars from the publication server.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    max_size: u64,
}

impl HttpFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, CirculaireError> {
        Ok(Self {
            client: http_client(config.download_timeout_secs)?,
            base_url: config.base_url.clone(),
            timeout_secs: config.download_timeout_secs,
            max_size: config.max_file_size_bytes,
        })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, year: u32, index: u32) -> Result<Option<FetchedDocument>, CirculaireError> {
        for filename in candidate_filenames(year, index) {
            let url = format!("{}{}", self.base_url, filename);
            debug!("Trying {}", url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| transport_error(&url, self.timeout_secs, e))?;

            if response.status() == StatusCode::NOT_FOUND {
                continue;
            }
            if !response.status().is_success() {
                return Err(CirculaireError::DownloadFailed {
                    url,
                    reason: format!("HTTP {}", response.status()),
                });
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| transport_error(&url, self.timeout_secs, e))?;
            check_pdf(&bytes, &filename, self.max_size)?;
            info!("Fetched {} ({} bytes)", filename, bytes.len());
            return Ok(Some(FetchedDocument {
                identity: DocumentIdentity {
                    index: Some(index),
                    year: Some(year),
                    filename,
                },
                bytes: bytes.to_vec(),
            }));
        }
        Ok(None)
    }
}
