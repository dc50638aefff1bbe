//! PDF download with retry, content validation and atomic writes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use litrag_common::http::{build_session_client, content_type, origin, BROWSER_USER_AGENT};
use litrag_common::LitragError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::retry::{retry_with_backoff, RetryPolicy, Sleeper, TokioSleeper};

/// Leading bytes of every PDF file.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("download failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("expected PDF content but received '{0}'")]
    ContentType(String),

    #[error("downloaded content is not a valid PDF file")]
    Signature,

    #[error("invalid download URL: {0}")]
    InvalidUrl(String),

    #[error("I/O error writing PDF: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// True for failures of the content itself rather than the transport.
    pub fn is_validation(&self) -> bool {
        matches!(self, FetchError::ContentType(_) | FetchError::Signature)
    }
}

fn default_timeout_secs() -> u64 { 30 }
fn default_warmup_timeout_secs() -> u64 { 10 }
fn default_max_attempts() -> u32 { 3 }

/// `[fetcher]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_warmup_timeout_secs")]
    pub warmup_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            warmup_timeout_secs: default_warmup_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

pub struct PdfFetcher {
    client: Client,
    config: FetcherConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl PdfFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, LitragError> {
        let client = build_session_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { client, config, sleeper: Arc::new(TokioSleeper) })
    }

    /// Replace the backoff sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn headers(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/pdf,*/*"));
        if let Ok(referer) = HeaderValue::from_str(origin) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    /// Download `url` to `dest`. The file is written only when the response
    /// is a real PDF; transport failures are retried, validation failures are not.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf, FetchError> {
        let origin = origin(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let headers = Self::headers(&origin);

        self.warm_up(&origin, &headers).await;

        let policy = RetryPolicy { max_attempts: self.config.max_attempts };
        let (content_type, body) = retry_with_backoff(policy, self.sleeper.as_ref(), |_| {
            self.fetch_once(url, headers.clone())
        })
        .await
        .map_err(|e| FetchError::Transport { attempts: e.attempts, source: e.last_error })?;

        validate_pdf(&content_type, &body)?;
        write_atomically(dest, &body)?;

        info!(url, bytes = body.len(), "Successfully downloaded PDF");
        Ok(dest.to_path_buf())
    }

    /// Visit the site origin first so the session carries its cookies.
    async fn warm_up(&self, origin: &str, headers: &HeaderMap) {
        let result = self
            .client
            .get(origin)
            .headers(headers.clone())
            .timeout(Duration::from_secs(self.config.warmup_timeout_secs))
            .send()
            .await;
        if let Err(e) = result {
            warn!(origin, error = %e, "Failed to establish session");
        }
    }

    async fn fetch_once(&self, url: &str, headers: HeaderMap) -> Result<(String, Vec<u8>), reqwest::Error> {
        let resp = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await?
            .error_for_status()?;
        let content_type = content_type(resp.headers());
        let body = resp.bytes().await?.to_vec();
        Ok((content_type, body))
    }
}

/// Declared type must mention `pdf` and the body must carry the PDF signature.
pub fn validate_pdf(content_type: &str, body: &[u8]) -> Result<(), FetchError> {
    if !content_type.to_lowercase().contains("pdf") {
        return Err(FetchError::ContentType(content_type.to_string()));
    }
    if !body.starts_with(PDF_SIGNATURE) {
        return Err(FetchError::Signature);
    }
    Ok(())
}

/// Write through a temp file in the destination directory, then rename.
pub fn write_atomically(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
