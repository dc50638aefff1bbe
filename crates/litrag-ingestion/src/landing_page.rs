//! PDF link discovery on publisher landing pages.
//!
//! Anchors are matched on their `href`, then `class`, then `id` against
//! keywords that publishers use for full-text download links. Each candidate
//! is made absolute against the page URL and confirmed with a HEAD probe.

use lazy_static::lazy_static;
use litrag_common::http::{is_pdf_content_type, BROWSER_USER_AGENT, PROBE_TIMEOUT};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

/// Keywords that mark an anchor as a likely PDF link.
pub const PDF_LINK_KEYWORDS: &[&str] = &[
    ".pdf", "pdf", "full-text", "fulltext", "download", "article", "view", "access",
    "pdf-link", "download-pdf", "article-pdf", "full-text-pdf",
];

lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").unwrap();
}

fn matches_keyword(value: &str) -> bool {
    let value = value.to_lowercase();
    PDF_LINK_KEYWORDS.iter().any(|kw| value.contains(kw))
}

/// Candidate PDF URLs on a page, absolute, deduplicated, in match order
/// (href matches first, then class matches, then id matches).
pub fn pdf_link_candidates(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        debug!(page_url, "Landing page URL is not absolute; skipping scan");
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let anchors: Vec<ElementRef> = document.select(&ANCHOR).collect();

    let mut candidates: Vec<String> = Vec::new();
    for attr in ["href", "class", "id"] {
        for anchor in &anchors {
            let element = anchor.value();
            let Some(value) = element.attr(attr) else { continue };
            if !matches_keyword(value) {
                continue;
            }
            let Some(href) = element.attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
                continue;
            };
            let Ok(absolute) = base.join(href) else { continue };
            if !matches!(absolute.scheme(), "http" | "https") {
                continue;
            }
            let absolute = absolute.to_string();
            if !candidates.contains(&absolute) {
                candidates.push(absolute);
            }
        }
    }
    candidates
}

/// HEAD-probe a URL; true when the response is PDF-typed or the final URL is
/// PDF-named. Probe failures count as "not a PDF".
pub async fn probe_is_pdf(client: &Client, url: &str) -> bool {
    match client
        .head(url)
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => {
            is_pdf_content_type(resp.headers())
                || resp.url().path().to_lowercase().ends_with(".pdf")
                || url.to_lowercase().ends_with(".pdf")
        }
        Err(e) => {
            debug!(url, error = %e, "PDF probe failed");
            false
        }
    }
}

/// First candidate on the page that the probe confirms as a PDF.
#[instrument(skip(client, html))]
pub async fn find_pdf_link_in_html(client: &Client, html: &str, page_url: &str) -> Option<String> {
    // `Html` is not `Send`; collect candidates before any await.
    let candidates = pdf_link_candidates(html, page_url);
    debug!(count = candidates.len(), "PDF link candidates on landing page");

    for candidate in candidates {
        if probe_is_pdf(client, &candidate).await {
            debug!(url = %candidate, "Found PDF link on landing page");
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <a href="/about">About us</a>
        <a href="/content/123" class="btn pdf-link">Get it</a>
        <a href="files/paper.PDF">Paper</a>
        <a href="/x" id="download-button">Download</a>
        <a href="mailto:editor@journal.org">Contact</a>
        <a href="files/paper.PDF" class="pdf">Duplicate</a>
    </body></html>"#;

    #[test]
    fn test_candidates_in_attribute_order() {
        let c = pdf_link_candidates(PAGE, "https://journal.org/articles/1");
        assert_eq!(
            c,
            vec![
                "https://journal.org/articles/files/paper.PDF".to_string(),
                "https://journal.org/content/123".to_string(),
                "https://journal.org/x".to_string(),
            ]
        );
    }

    #[test]
    fn test_relative_base_yields_nothing() {
        assert!(pdf_link_candidates(PAGE, "/articles/1").is_empty());
    }

    #[test]
    fn test_page_without_links() {
        assert!(pdf_link_candidates("<p>No links</p>", "https://journal.org/").is_empty());
    }
}
