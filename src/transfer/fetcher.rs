//! Resource fetching: metadata resolution and body streams.

use super::filename::{extension_for_media_type, filename_from_locator};
use crate::config::TransferSettings;
use crate::models::ResourceMetadata;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Body stream of a resource.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// An opened resource body.
pub struct ResourceBody {
    /// Response status code.
    pub status: u16,
    /// Advertised body length.
    pub content_length: Option<u64>,
    /// Body bytes.
    pub stream: ByteStream,
}

impl ResourceBody {
    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

impl std::fmt::Debug for ResourceBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBody")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Resolves and streams remote resources.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Resolves metadata without downloading the body.
    ///
    /// # Errors
    ///
    /// Returns `Extraction` if the resource cannot be resolved.
    async fn resolve(&self, locator: &str) -> Result<ResourceMetadata>;

    /// Opens the body stream.
    ///
    /// Non-2xx statuses are returned, not treated as errors here.
    ///
    /// # Errors
    ///
    /// Returns `Transfer` if the request cannot be sent.
    async fn open(&self, locator: &str) -> Result<ResourceBody>;
}

/// HTTP(S) fetcher built on `reqwest`.
///
/// Metadata comes from a `HEAD` request; servers that refuse `HEAD` yield
/// metadata derived from the URL alone.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher from transfer settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &TransferSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| Error::operation("build_http_client", e))?;
        Ok(Self {
            client,
            request_timeout: settings.request_timeout,
        })
    }

    fn parse(locator: &str) -> Result<Url> {
        let url = Url::parse(locator).map_err(|e| Error::Extraction {
            locator: locator.to_string(),
            cause: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::Extraction {
                locator: locator.to_string(),
                cause: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn resolve(&self, locator: &str) -> Result<ResourceMetadata> {
        let url = Self::parse(locator)?;
        let extraction = |cause: String| Error::Extraction {
            locator: locator.to_string(),
            cause,
        };

        let response = self
            .client
            .head(url.clone())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| extraction(e.to_string()))?;

        let status = response.status();
        let mut metadata = metadata_from_url(&url);
        if status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            debug!("HEAD not allowed, using URL-derived metadata");
            return Ok(metadata);
        }
        if !status.is_success() {
            return Err(extraction(format!("HEAD returned {status}")));
        }

        let headers = response.headers();
        metadata.estimated_size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        metadata.media_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(name) = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
        {
            let path = std::path::Path::new(&name);
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                metadata.extension = Some(ext.to_lowercase());
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                metadata.title = stem.to_string();
            }
        }
        if metadata.extension.is_none() {
            metadata.extension = metadata
                .media_type
                .as_deref()
                .and_then(extension_for_media_type)
                .map(str::to_string);
        }

        debug!(size = ?metadata.estimated_size, ext = ?metadata.extension, "Resolved metadata");
        Ok(metadata)
    }

    #[instrument(skip(self))]
    async fn open(&self, locator: &str) -> Result<ResourceBody> {
        let url = Self::parse(locator)?;
        let owned_locator = locator.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transfer {
                locator: owned_locator.clone(),
                cause: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|e| Error::Transfer {
                locator: owned_locator.clone(),
                cause: e.to_string(),
            })
        });

        Ok(ResourceBody {
            status,
            content_length,
            stream: Box::pin(stream),
        })
    }
}

/// Title and extension from the URL path.
fn metadata_from_url(url: &Url) -> ResourceMetadata {
    let name = filename_from_locator(url.as_str());
    let path = std::path::Path::new(&name);
    ResourceMetadata {
        title: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string(),
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase),
        ..ResourceMetadata::default()
    }
}

/// Extracts `filename=` from a `Content-Disposition` header value.
fn disposition_filename(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_url() {
        let url = Url::parse("https://example.com/media/clip.MP4?sig=abc").unwrap();
        let metadata = metadata_from_url(&url);
        assert_eq!(metadata.title, "clip");
        assert_eq!(metadata.extension.as_deref(), Some("mp4"));
        assert_eq!(metadata.estimated_size, None);
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename("attachment; filename=\"report.pdf\"").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(disposition_filename("inline"), None);
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let err = HttpFetcher::parse("ftp://example.com/a.bin").unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
    }
}
