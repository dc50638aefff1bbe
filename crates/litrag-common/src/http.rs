//! Shared HTTP client construction.
//!
//! Every network-facing component builds its `reqwest::Client` through here so
//! timeouts and identification headers stay consistent across the workspace.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use url::Url;

use crate::error::LitragError;

/// Identification header sent to publisher sites, which often reject bare clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

/// Identification header for API calls (NCBI, Unpaywall).
pub const API_USER_AGENT: &str = concat!("litrag/", env!("CARGO_PKG_VERSION"));

/// Default request timeout for full downloads and metadata calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for lightweight existence probes and warm-up requests.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client builder with the workspace defaults applied.
pub fn client_builder(timeout: Duration) -> ClientBuilder {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(API_USER_AGENT)
}

/// Build a stateless client with the given request timeout.
pub fn build_client(timeout: Duration) -> Result<Client, LitragError> {
    client_builder(timeout)
        .build()
        .map_err(|e| LitragError::Pipeline(format!("Failed to build HTTP client: {}", e)))
}

/// Build a client that keeps cookies between requests, so a warm-up request
/// to a site's origin carries over to the download that follows.
pub fn build_session_client(timeout: Duration) -> Result<Client, LitragError> {
    client_builder(timeout)
        .cookie_store(true)
        .build()
        .map_err(|e| LitragError::Pipeline(format!("Failed to build HTTP session client: {}", e)))
}

/// `scheme://host[:port]` of a URL.
pub fn origin(url: &str) -> Result<String, LitragError> {
    let parsed = Url::parse(url)?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(LitragError::Pipeline(format!("URL has no usable origin: {}", url)));
    }
    Ok(origin.ascii_serialization())
}

/// Declared content type of a response, lowercased; empty when absent.
pub fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase()
}

/// Whether a response declares a PDF body.
pub fn is_pdf_content_type(headers: &HeaderMap) -> bool {
    content_type(headers).contains("pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_origin_strips_path_and_query() {
        let o = origin("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123/pdf?x=1").unwrap();
        assert_eq!(o, "https://www.ncbi.nlm.nih.gov");
    }

    #[test]
    fn test_origin_keeps_explicit_port() {
        let o = origin("http://127.0.0.1:8080/file.pdf").unwrap();
        assert_eq!(o, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_origin_rejects_garbage() {
        assert!(origin("not a url").is_err());
    }

    #[test]
    fn test_pdf_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_pdf_content_type(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("Application/PDF; charset=binary"));
        assert!(is_pdf_content_type(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!is_pdf_content_type(&headers));
    }
}
