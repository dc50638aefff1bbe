//! Unpaywall open-access lookup.
//! API: https://api.unpaywall.org/v2/{doi}?email={contact}

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<OaLocation>,
}

/// One open-access copy of an article.
#[derive(Debug, Clone, Deserialize)]
pub struct OaLocation {
    pub url_for_pdf: Option<String>,
    pub pdf_url: Option<String>,
    pub url: Option<String>,
}

impl OaLocation {
    /// Most specific URL the location offers.
    pub fn preferred_url(&self) -> Option<&str> {
        [&self.url_for_pdf, &self.pdf_url, &self.url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|u| !u.is_empty())
    }
}

pub struct UnpaywallClient {
    client: Client,
    base_url: String,
    email: String,
}

impl UnpaywallClient {
    pub fn new(client: Client, base_url: &str, email: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.into(),
        }
    }

    /// Best open-access location for a DOI, `None` when Unpaywall knows no free copy.
    #[instrument(skip(self))]
    pub async fn best_location(&self, doi: &str) -> anyhow::Result<Option<OaLocation>> {
        let resp = self.client
            .get(format!("{}/v2/{}", self.base_url, doi))
            .query(&[("email", self.email.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            debug!(status = %resp.status(), "Unpaywall returned no record");
            return Ok(None);
        }

        let body: UnpaywallResponse = resp.json().await?;
        Ok(body.best_oa_location)
    }
}
