//! HTTP content fetcher.
//!
//! Retrieves documents, question feeds and media assets, returning raw bytes
//! together with the declared `Content-Type` so callers can validate the
//! asset kind before using it.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;

use mediaqa_shared::{MediaQaError, Result};

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("mediaqa/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 5;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// FetchedResource
// ---------------------------------------------------------------------------

/// A successfully fetched resource.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Declared content type, as sent by the server (parameters included).
    pub content_type: Option<String>,
    /// Response body.
    pub bytes: Vec<u8>,
}

impl FetchedResource {
    /// The media type without parameters, lowercased (`"image/png; q=1"` → `"image/png"`).
    pub fn mime_type(&self) -> Option<String> {
        self.content_type.as_deref().map(essence)
    }

    /// Whether the declared content type starts with `prefix` (e.g. `"image/"`).
    pub fn has_type_prefix(&self, prefix: &str) -> bool {
        self.mime_type()
            .is_some_and(|mime| mime.starts_with(&prefix.to_ascii_lowercase()))
    }
}

/// Strip parameters from a content type and lowercase it.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher with a shared connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| MediaQaError::Fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// The underlying client, for collaborators that post to the same hosts.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch `url` and return its body and declared content type.
    ///
    /// Fails with [`MediaQaError::Fetch`] on an unparsable URL, a transport
    /// error, or a non-success status.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchedResource> {
        let parsed =
            Url::parse(url).map_err(|e| MediaQaError::Fetch(format!("invalid URL '{url}': {e}")))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| MediaQaError::Fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaQaError::Fetch(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaQaError::Fetch(format!("{url}: body read failed: {e}")))?
            .to_vec();

        debug!(
            status = status.as_u16(),
            content_type = content_type.as_deref().unwrap_or("-"),
            len = bytes.len(),
            "fetched"
        );

        Ok(FetchedResource {
            url: final_url,
            status: status.as_u16(),
            content_type,
            bytes,
        })
    }

    /// Fetch `url` and decode the body as text (lossy UTF-8).
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let resource = self.fetch(url).await?;
        Ok(String::from_utf8_lossy(&resource.bytes).into_owned())
    }
}
