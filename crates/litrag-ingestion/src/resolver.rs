//! Full-text PDF link resolution.
//!
//! Strategies run in priority order and the first hit wins:
//!   1. PMC mirror id among the article's cross-references
//!   2. DOI based: publisher URL template, then Unpaywall, then doi.org redirect
//!   3. Inline `ELocationID` / `Link` values that look like full text
//!
//! Every strategy fails soft. Errors are logged at debug level and the next
//! strategy runs; "no link" is a normal outcome.

use litrag_common::http::{build_client, is_pdf_content_type, BROWSER_USER_AGENT, PROBE_TIMEOUT};
use litrag_common::LitragError;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::landing_page;
use crate::models::{CrossRef, RawArticle};
use crate::sources::unpaywall::UnpaywallClient;

fn default_pmc_base() -> String { "https://www.ncbi.nlm.nih.gov/pmc/articles".to_string() }
fn default_sciencedirect_base() -> String { "https://www.sciencedirect.com".to_string() }
fn default_unpaywall_base() -> String { "https://api.unpaywall.org".to_string() }
fn default_doi_base() -> String { "https://doi.org".to_string() }

/// `[resolver]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_pmc_base")]
    pub pmc_base_url: String,
    #[serde(default = "default_sciencedirect_base")]
    pub sciencedirect_base_url: String,
    #[serde(default = "default_unpaywall_base")]
    pub unpaywall_base_url: String,
    #[serde(default = "default_doi_base")]
    pub doi_base_url: String,
    /// Contact address for Unpaywall; the lookup is skipped without one.
    #[serde(default)]
    pub unpaywall_email: Option<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pmc_base_url: default_pmc_base(),
            sciencedirect_base_url: default_sciencedirect_base(),
            unpaywall_base_url: default_unpaywall_base(),
            doi_base_url: default_doi_base(),
            unpaywall_email: None,
        }
    }
}

/// Publishers recognised by DOI prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publisher {
    Elsevier,
    Nature,
    Oxford,
    Springer,
    Wiley,
    Plos,
}

const PUBLISHER_PREFIXES: &[(&str, Publisher)] = &[
    ("10.1016", Publisher::Elsevier),
    ("10.1038", Publisher::Nature),
    ("10.1093", Publisher::Oxford),
    ("10.1007", Publisher::Springer),
    ("10.1111", Publisher::Wiley),
    ("10.1371", Publisher::Plos),
];

impl Publisher {
    pub fn from_doi(doi: &str) -> Option<Self> {
        PUBLISHER_PREFIXES
            .iter()
            .find(|(prefix, _)| doi.starts_with(prefix))
            .map(|(_, publisher)| *publisher)
    }
}

pub struct LinkResolver {
    config: ResolverConfig,
    client: Client,
    unpaywall: Option<UnpaywallClient>,
}

impl LinkResolver {
    pub fn new(config: ResolverConfig) -> Result<Self, LitragError> {
        let client = build_client(PROBE_TIMEOUT)?;
        let unpaywall = config
            .unpaywall_email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(|email| UnpaywallClient::new(client.clone(), &config.unpaywall_base_url, email));
        Ok(Self { config, client, unpaywall })
    }

    /// Best-effort PDF URL for an article, or `None` if no strategy finds one.
    #[instrument(skip(self, article), fields(pmid = %article.record.pubmed_id))]
    pub async fn resolve(&self, article: &RawArticle) -> Option<String> {
        if let Some(url) = self.mirror_pdf_url(&article.cross_refs) {
            debug!(url = %url, "Resolved via PMC mirror");
            return Some(url);
        }

        if let Some(doi) = article.record.doi.as_deref() {
            if let Some(url) = self.resolve_doi(doi).await {
                return Some(url);
            }
        }

        if let Some(url) = inline_full_text_link(&article.inline_links) {
            debug!(url = %url, "Resolved via inline link");
            return Some(url);
        }

        debug!("No full text link found through any method");
        None
    }

    /// PMC PDF URL when a cross-reference names a PMC id.
    pub fn mirror_pdf_url(&self, refs: &[CrossRef]) -> Option<String> {
        let pmc = refs.iter().find(|r| r.is_pmc())?;
        let digits = pmc.value.trim().trim_start_matches("PMC").trim_start_matches("pmc");
        if digits.is_empty() {
            return None;
        }
        Some(format!(
            "{}/PMC{}/pdf",
            self.config.pmc_base_url.trim_end_matches('/'),
            digits
        ))
    }

    /// DOI strategies: publisher template, open-access lookup, DOI redirect.
    pub async fn resolve_doi(&self, doi: &str) -> Option<String> {
        if let Some(url) = self.publisher_pdf_url(doi).await {
            debug!(url = %url, "Resolved via publisher template");
            return Some(url);
        }

        if let Some(url) = self.open_access_pdf_url(doi).await {
            debug!(url = %url, "Resolved via Unpaywall");
            return Some(url);
        }

        if let Some(url) = self.doi_redirect_pdf_url(doi).await {
            debug!(url = %url, "Resolved via DOI redirect");
            return Some(url);
        }

        None
    }

    /// Templated direct-download URL for publishers that have one, confirmed
    /// with a HEAD probe.
    async fn publisher_pdf_url(&self, doi: &str) -> Option<String> {
        let url = match Publisher::from_doi(doi)? {
            Publisher::Elsevier => {
                let pii = doi.rsplit('/').next().filter(|s| !s.is_empty())?;
                format!(
                    "{}/science/article/pii/{}/pdfft",
                    self.config.sciencedirect_base_url.trim_end_matches('/'),
                    pii
                )
            }
            _ => return None,
        };

        match self
            .client
            .head(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() && is_pdf_content_type(resp.headers()) => Some(url),
            Ok(resp) => {
                debug!(url = %url, status = %resp.status(), "Publisher template is not a PDF");
                None
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Error trying publisher URL");
                None
            }
        }
    }

    async fn open_access_pdf_url(&self, doi: &str) -> Option<String> {
        let unpaywall = self.unpaywall.as_ref()?;
        let location = match unpaywall.best_location(doi).await {
            Ok(location) => location?,
            Err(e) => {
                debug!(doi, error = %e, "Error checking Unpaywall");
                return None;
            }
        };
        let url = location.preferred_url()?;
        let lower = url.to_lowercase();
        if lower.ends_with(".pdf") || lower.contains("pdf") {
            Some(url.to_string())
        } else {
            None
        }
    }

    async fn doi_redirect_pdf_url(&self, doi: &str) -> Option<String> {
        let url = format!("{}/{}", self.config.doi_base_url.trim_end_matches('/'), doi);
        match self
            .client
            .get(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html,application/pdf")
            .send()
            .await
        {
            Ok(resp) => {
                let final_url = resp.url().as_str();
                if resp.status().is_success() && final_url.to_lowercase().ends_with(".pdf") {
                    Some(final_url.to_string())
                } else {
                    None
                }
            }
            Err(e) => {
                debug!(doi, error = %e, "Error resolving DOI");
                None
            }
        }
    }

    /// Scan a publisher landing page for a probe-confirmed PDF link.
    pub async fn find_pdf_link_in_html(&self, html: &str, page_url: &str) -> Option<String> {
        landing_page::find_pdf_link_in_html(&self.client, html, page_url).await
    }
}

/// First inline link that looks like full text (`.pdf` or `fulltext`).
pub fn inline_full_text_link(links: &[String]) -> Option<String> {
    links
        .iter()
        .find(|l| {
            let lower = l.to_lowercase();
            lower.contains(".pdf") || lower.contains("fulltext")
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleRecord;

    fn raw(doi: Option<&str>, refs: Vec<CrossRef>, links: Vec<&str>) -> RawArticle {
        let mut record = ArticleRecord::new("1", "Title");
        record.doi = doi.map(String::from);
        RawArticle {
            record,
            cross_refs: refs,
            inline_links: links.into_iter().map(String::from).collect(),
        }
    }

    fn pmc_ref(value: &str) -> CrossRef {
        CrossRef { id_type: Some("pmc".into()), source: None, value: value.into() }
    }

    #[test]
    fn test_mirror_url_strips_prefix() {
        let resolver = LinkResolver::new(ResolverConfig::default()).unwrap();
        assert_eq!(
            resolver.mirror_pdf_url(&[pmc_ref("PMC7654321")]).as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC7654321/pdf")
        );
        let by_source = CrossRef { id_type: None, source: Some("PMC".into()), value: "123".into() };
        assert_eq!(
            resolver.mirror_pdf_url(&[by_source]).as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC123/pdf")
        );
    }

    #[tokio::test]
    async fn test_pmc_wins_over_doi() {
        // Unroutable bases: any DOI lookup would fail, so a hit must come from PMC.
        let config = ResolverConfig {
            sciencedirect_base_url: "http://127.0.0.1:1".into(),
            doi_base_url: "http://127.0.0.1:1".into(),
            ..ResolverConfig::default()
        };
        let resolver = LinkResolver::new(config).unwrap();
        let article = raw(Some("10.1016/j.cell.2020.01.001"), vec![pmc_ref("PMC42")], vec![]);
        assert_eq!(
            resolver.resolve(&article).await.as_deref(),
            Some("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC42/pdf")
        );
    }

    #[tokio::test]
    async fn test_inline_link_fallback_when_doi_fails() {
        let config = ResolverConfig {
            doi_base_url: "http://127.0.0.1:1".into(),
            ..ResolverConfig::default()
        };
        let resolver = LinkResolver::new(config).unwrap();
        let article = raw(
            Some("10.9999/unknown"),
            vec![],
            vec!["10.9999/unknown", "https://example.org/FullText/9"],
        );
        assert_eq!(resolver.resolve(&article).await.as_deref(), Some("https://example.org/FullText/9"));
    }

    #[tokio::test]
    async fn test_nothing_found_is_none() {
        let resolver = LinkResolver::new(ResolverConfig::default()).unwrap();
        assert_eq!(resolver.resolve(&raw(None, vec![], vec!["10.1/abc"])).await, None);
    }

    #[test]
    fn test_publisher_prefixes() {
        assert_eq!(Publisher::from_doi("10.1016/j.x"), Some(Publisher::Elsevier));
        assert_eq!(Publisher::from_doi("10.1371/journal.pone.1"), Some(Publisher::Plos));
        assert_eq!(Publisher::from_doi("10.9999/x"), None);
    }
}
