//! Input resolution: a local path or a URL → validated PDF bytes.
//!
//! The extractor takes bytes whose length and type were already checked,
//! so every way into the pipeline goes through [`check_pdf`]: the `%PDF`
//! magic bytes and the configured size limit are enforced here, before
//! pdfium ever sees the buffer.

use crate::error::CirculaireError;
use crate::output::DocumentIdentity;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// A document ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub identity: DocumentIdentity,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Enforce the `%PDF` magic and the size limit.
pub fn check_pdf(bytes: &[u8], source_name: &str, max_size: u64) -> Result<(), CirculaireError> {
    if bytes.len() as u64 > max_size {
        return Err(CirculaireError::DocumentTooLarge {
            source_name: source_name.to_string(),
            size: bytes.len() as u64,
            limit: max_size,
        });
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(CirculaireError::NotAPdf {
            source_name: source_name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Resolve a path or URL to validated bytes.
pub async fn resolve_input(
    input: &str,
    timeout_secs: u64,
    max_size: u64,
) -> Result<FetchedDocument, CirculaireError> {
    if is_url(input) {
        download_url(input, timeout_secs, max_size).await
    } else {
        read_local(Path::new(input), max_size).await
    }
}

async fn read_local(path: &Path, max_size: u64) -> Result<FetchedDocument, CirculaireError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| CirculaireError::FileNotFound {
            path: path.to_path_buf(),
        })?;
    let name = filename_of(path);
    if meta.len() > max_size {
        return Err(CirculaireError::DocumentTooLarge {
            source_name: name,
            size: meta.len(),
            limit: max_size,
        });
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| CirculaireError::UnreadableDocument {
            filename: name.clone(),
            reason: e.to_string(),
        })?;
    check_pdf(&bytes, &name, max_size)?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(FetchedDocument {
        identity: DocumentIdentity::from_filename(name),
        bytes,
    })
}

fn filename_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// HTTP client with the download timeout applied to every request.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, CirculaireError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CirculaireError::Internal(format!("HTTP client: {}", e)))
}

/// Map a transport error, distinguishing timeouts.
pub(crate) fn transport_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> CirculaireError {
    if e.is_timeout() {
        CirculaireError::DownloadTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        CirculaireError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

async fn download_url(
    url: &str,
    timeout_secs: u64,
    max_size: u64,
) -> Result<FetchedDocument, CirculaireError> {
    info!("Downloading PDF from: {}", url);
    let client = http_client(timeout_secs)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(url, timeout_secs, e))?;

    if !response.status().is_success() {
        return Err(CirculaireError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    let filename = extract_filename(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(url, timeout_secs, e))?;
    check_pdf(&bytes, &filename, max_size)?;
    info!("Downloaded {} ({} bytes)", filename, bytes.len());

    Ok(FetchedDocument {
        identity: DocumentIdentity::from_filename(filename),
        bytes: bytes.to_vec(),
    })
}

/// Last path segment of the URL when it looks like a filename.
pub fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(
            extract_filename("http://www.phct.com.tn/images/DocumentsPCT/Circulaires/circ0425.pdf"),
            "circ0425.pdf"
        );
        assert_eq!(extract_filename("https://example.com/"), "downloaded.pdf");
    }

    #[test]
    fn magic_and_size_are_enforced() {
        assert!(check_pdf(b"%PDF-1.7 ...", "a.pdf", 100).is_ok());
        assert!(matches!(
            check_pdf(b"<html>", "a.pdf", 100),
            Err(CirculaireError::NotAPdf { .. })
        ));
        assert!(matches!(
            check_pdf(b"%PDF-1.7 ...", "a.pdf", 4),
            Err(CirculaireError::DocumentTooLarge { size: 12, limit: 4, .. })
        ));
    }

    #[tokio::test]
    async fn local_file_is_read_and_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("circ0425.pdf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"%PDF-1.4\n%fake")
            .unwrap();
        let doc = resolve_input(path.to_str().unwrap(), 5, 1024).await.unwrap();
        assert_eq!(doc.identity.filename, "circ0425.pdf");
        assert_eq!(doc.bytes.len(), 14);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/nonexistent/circ0125.pdf", 5, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, CirculaireError::FileNotFound { .. }), "got {err}");
    }
}
