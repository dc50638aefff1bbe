//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi

use std::time::Duration;

use async_trait::async_trait;
use litrag_common::http::{build_client, DEFAULT_TIMEOUT};
use litrag_common::LitragError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{MetadataSource, SearchParams, SortOrder};
use crate::models::{ArticleRecord, Author, CrossRef, JournalInfo, RawArticle};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const MAX_RETMAX: usize = 100_000;

fn default_base_url() -> String { EUTILS_BASE.to_string() }
fn default_assistant_delay() -> f64 { 0.1 }
fn default_scrape_delay() -> f64 { 0.5 }

/// `[pubmed]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubMedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// NCBI API key; raises the server-side rate limit when present.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Seconds to wait before each detail fetch during `search`.
    #[serde(default = "default_assistant_delay")]
    pub request_delay_secs: f64,
    /// Seconds to wait before each detail fetch during `scrape`.
    #[serde(default = "default_scrape_delay")]
    pub scrape_delay_secs: f64,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            request_delay_secs: default_assistant_delay(),
            scrape_delay_secs: default_scrape_delay(),
        }
    }
}

impl PubMedConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs.max(0.0))
    }

    pub fn scrape_delay(&self) -> Duration {
        Duration::from_secs_f64(self.scrape_delay_secs.max(0.0))
    }
}

pub struct PubMedClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PubMedClient {
    pub fn new(config: &PubMedConfig) -> Result<Self, LitragError> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn with_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Search PubMed and return a list of PMIDs.
    #[instrument(skip(self, params))]
    async fn esearch(&self, query: &str, params: &SearchParams) -> anyhow::Result<Vec<String>> {
        let term = match &params.date_range {
            Some(range) => format!("{} AND {}[PDAT] : {}[PDAT]", query, range.start, range.end),
            None => query.to_string(),
        };
        let sort = match params.sort {
            SortOrder::Relevance => "relevance",
            SortOrder::Date => "pub_date",
        };
        let retmax = params.max_results.saturating_mul(2).min(MAX_RETMAX);

        let query_params = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("term", term),
            ("retmax", retmax.to_string()),
            ("retstart", params.offset.to_string()),
            ("sort", sort.to_string()),
            ("retmode", "json".to_string()),
        ]);

        let resp: serde_json::Value = self.client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&query_params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp.get("error") {
            anyhow::bail!("PubMed API error: {}", err);
        }

        let ids: Vec<String> = resp["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        if ids.is_empty() {
            warn!(query = %query, "No results found for query");
        }
        debug!(count = ids.len(), "PubMed esearch returned PMIDs");
        Ok(ids)
    }

    /// Fetch the full PubMed XML record for one PMID.
    #[instrument(skip(self))]
    async fn efetch(&self, pmid: &str) -> anyhow::Result<String> {
        let query_params = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("id", pmid.to_string()),
            ("rettype", "full".to_string()),
            ("retmode", "xml".to_string()),
        ]);

        let xml = self.client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&query_params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(xml)
    }
}

#[async_trait]
impl MetadataSource for PubMedClient {
    fn database(&self) -> &'static str {
        "pubmed"
    }

    async fn search(&self, query: &str, params: &SearchParams) -> anyhow::Result<Vec<String>> {
        self.esearch(query, params).await
    }

    async fn fetch_details(&self, id: &str) -> anyhow::Result<Option<RawArticle>> {
        let xml = self.efetch(id).await?;
        let mut articles = parse_pubmed_xml(&xml)?;
        if articles.is_empty() {
            return Ok(None);
        }
        let mut article = articles.swap_remove(0);
        if article.record.pubmed_id.is_empty() {
            article.record.pubmed_id = id.to_string();
        }
        Ok(Some(article))
    }
}

// ── XML parsing ────────────────────────────────────────────────────────────

/// Elements whose text content is collected.
const CAPTURED: &[&str] = &[
    "PMID", "ArticleTitle", "AbstractText",
    "LastName", "ForeName", "Affiliation", "CollectiveName",
    "Title", "ISOAbbreviation", "ISSN", "Volume", "Issue",
    "Year", "Month", "Day", "MedlineDate",
    "ArticleId", "OtherID", "ELocationID", "Link",
];

fn is_captured(name: &str) -> bool {
    CAPTURED.contains(&name)
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

fn normalise_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Default)]
struct DateParts {
    seen: bool,
    year: String,
    month: String,
    day: String,
    medline: String,
}

impl DateParts {
    fn set(&mut self, field: &str, text: String) {
        match field {
            "Year" => self.year = text,
            "Month" => self.month = text,
            "Day" => self.day = text,
            "MedlineDate" => self.medline = text,
            _ => {}
        }
    }

    fn format(&self) -> Option<String> {
        if !self.medline.is_empty() {
            return Some(self.medline.clone());
        }
        if self.year.is_empty() {
            return None;
        }
        let mut out = self.year.clone();
        for part in [&self.month, &self.day] {
            if part.is_empty() {
                break;
            }
            out.push('-');
            out.push_str(&format!("{:0>2}", part));
        }
        Some(out)
    }
}

#[derive(Default)]
struct AuthorParts {
    lastname: String,
    firstname: String,
    affiliation: String,
    collective: String,
}

impl AuthorParts {
    fn build(self) -> Option<Author> {
        if !self.collective.is_empty() {
            return Some(Author::Collective { collective_name: self.collective });
        }
        if self.lastname.is_empty() && self.firstname.is_empty() {
            return None;
        }
        Some(Author::Person {
            lastname: self.lastname,
            firstname: self.firstname,
            affiliation: self.affiliation,
        })
    }
}

/// Accumulates one `PubmedArticle` while the event loop walks it.
#[derive(Default)]
struct ArticleBuilder {
    pmid: String,
    title: String,
    abstract_sections: Vec<(Option<String>, String)>,
    pending_label: Option<String>,
    authors: Vec<Author>,
    author: Option<AuthorParts>,
    journal: JournalInfo,
    iso_abbreviation: String,
    pub_date: DateParts,
    date_completed: DateParts,
    date_revised: DateParts,
    doi: Option<String>,
    cross_refs: Vec<CrossRef>,
    pending_ref: Option<(Option<String>, Option<String>)>,
    inline_links: Vec<String>,
    pending_link_url: Option<String>,
}

fn parent(path: &[String]) -> &str {
    path.last().map(String::as_str).unwrap_or("")
}

fn within(path: &[String], name: &str) -> bool {
    path.iter().any(|p| p == name)
}

/// The article's own id list sits directly under `PubmedData`; id lists
/// inside `ReferenceList` belong to cited works.
fn in_own_id_list(path: &[String]) -> bool {
    let n = path.len();
    n >= 2 && path[n - 1] == "ArticleIdList" && path[n - 2] == "PubmedData"
}

impl ArticleBuilder {
    /// Called on a start tag, with `path` holding the ancestors.
    fn open(&mut self, name: &str, e: &BytesStart, path: &[String]) {
        match name {
            "AbstractText" => self.pending_label = attribute(e, "Label"),
            "Author" if parent(path) == "AuthorList" && within(path, "Article") => {
                self.author = Some(AuthorParts::default());
            }
            "ArticleId" if in_own_id_list(path) => {
                self.pending_ref = Some((attribute(e, "IdType"), attribute(e, "Source")));
            }
            "OtherID" if parent(path) == "MedlineCitation" => {
                self.pending_ref = Some((attribute(e, "IdType"), attribute(e, "Source")));
            }
            "ELocationID" | "Link" if within(path, "Article") => {
                self.pending_link_url = attribute(e, "URL");
            }
            "PubDate" => self.pub_date.seen = true,
            "DateCompleted" => self.date_completed.seen = true,
            "DateRevised" => self.date_revised.seen = true,
            _ => {}
        }
    }

    /// Called on an end tag, with `path` holding the ancestors.
    fn close(&mut self, name: &str, raw_text: String, path: &[String]) {
        let text = normalise_ws(&raw_text);
        let parent = parent(path);

        match name {
            "PMID" if parent == "MedlineCitation" && self.pmid.is_empty() => self.pmid = text,
            "ArticleTitle" if parent == "Article" => self.title = text,
            "AbstractText" if parent == "Abstract" => {
                let label = self.pending_label.take();
                if !text.is_empty() {
                    self.abstract_sections.push((label, text));
                }
            }
            "LastName" | "ForeName" | "CollectiveName" | "Affiliation" => {
                if let Some(author) = self.author.as_mut() {
                    match name {
                        "LastName" => author.lastname = text,
                        "ForeName" => author.firstname = text,
                        "CollectiveName" => author.collective = text,
                        _ if author.affiliation.is_empty() => author.affiliation = text,
                        _ => {}
                    }
                }
            }
            "Author" if parent == "AuthorList" => {
                if let Some(author) = self.author.take().and_then(AuthorParts::build) {
                    self.authors.push(author);
                }
            }
            "Title" if parent == "Journal" => self.journal.name = text,
            "ISOAbbreviation" if parent == "Journal" => self.iso_abbreviation = text,
            "ISSN" if parent == "Journal" => self.journal.issn = text,
            "Volume" if parent == "JournalIssue" => self.journal.volume = text,
            "Issue" if parent == "JournalIssue" => self.journal.issue = text,
            "Year" | "Month" | "Day" | "MedlineDate" => match parent {
                "PubDate" => self.pub_date.set(name, text),
                "DateCompleted" => self.date_completed.set(name, text),
                "DateRevised" => self.date_revised.set(name, text),
                _ => {}
            },
            "ArticleId" | "OtherID" => {
                if let Some((id_type, source)) = self.pending_ref.take() {
                    if text.is_empty() {
                        return;
                    }
                    if name == "ArticleId"
                        && self.doi.is_none()
                        && id_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("doi"))
                    {
                        self.doi = Some(text.clone());
                    }
                    self.cross_refs.push(CrossRef { id_type, source, value: text });
                }
            }
            "ELocationID" | "Link" if within(path, "Article") => {
                let url = self.pending_link_url.take().unwrap_or(text);
                if !url.is_empty() {
                    self.inline_links.push(url);
                }
            }
            _ => {}
        }
    }

    fn finish(self) -> RawArticle {
        let structured = self.abstract_sections.iter().any(|(label, _)| label.is_some());
        let abstract_text = if structured {
            self.abstract_sections
                .iter()
                .map(|(label, text)| format!("{}: {}", label.as_deref().unwrap_or("Abstract"), text))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            self.abstract_sections
                .iter()
                .map(|(_, text)| text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut journal = self.journal;
        if journal.name.is_empty() {
            journal.name = self.iso_abbreviation;
        }

        let publication_date = [&self.pub_date, &self.date_completed, &self.date_revised]
            .into_iter()
            .find(|d| d.seen)
            .and_then(DateParts::format);

        RawArticle {
            record: ArticleRecord {
                pubmed_id: self.pmid,
                doi: self.doi,
                title: self.title,
                abstract_text,
                authors: self.authors,
                journal,
                publication_date,
                full_text_link: None,
            },
            cross_refs: self.cross_refs,
            inline_links: self.inline_links,
        }
    }
}

/// Parse PubMed efetch XML into raw articles.
/// Handles the `<PubmedArticleSet><PubmedArticle>` structure.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<RawArticle>, LitragError> {
    let mut articles = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut path: Vec<String> = Vec::new();
    let mut current: Option<ArticleBuilder> = None;
    let mut capture: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e);
                if name == "PubmedArticle" {
                    current = Some(ArticleBuilder::default());
                }
                if let Some(ref mut article) = current {
                    article.open(&name, e, &path);
                    if is_captured(&name) {
                        capture = Some(String::new());
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = element_name(e);
                if let Some(ref mut article) = current {
                    article.open(&name, e, &path);
                    article.close(&name, String::new(), &path);
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(ref mut text) = capture {
                    let chunk = e
                        .unescape()
                        .map_err(|err| LitragError::Xml(format!("bad text content: {}", err)))?;
                    text.push_str(&chunk);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(ref mut text) = capture {
                    text.push_str(&String::from_utf8_lossy(&e.clone().into_inner()));
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                path.pop();
                if name == "PubmedArticle" {
                    if let Some(article) = current.take() {
                        articles.push(article.finish());
                    }
                } else if let Some(ref mut article) = current {
                    let text = if is_captured(&name) {
                        capture.take().unwrap_or_default()
                    } else {
                        String::new()
                    };
                    article.close(&name, text, &path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(LitragError::Xml(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(articles)
}
