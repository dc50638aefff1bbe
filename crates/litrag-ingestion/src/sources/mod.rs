//! Metadata source clients.

pub mod pubmed;
pub mod unpaywall;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::{ArticleRecord, RawArticle};
use crate::resolver::LinkResolver;

/// Result ordering requested from the metadata database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Relevance,
    Date,
}

/// Inclusive publication date window, dates as the database accepts them
/// (e.g. `2020/01/01`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub max_results: usize,
    /// Number of leading results to skip, for paging through a query.
    pub offset: usize,
    pub date_range: Option<DateRange>,
    pub sort: SortOrder,
}

impl SearchParams {
    pub fn new(max_results: usize) -> Self {
        Self { max_results, offset: 0, date_range: None, sort: SortOrder::Relevance }
    }
}

/// Common interface for bibliographic metadata databases.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Short database name, used as the top-level output directory.
    fn database(&self) -> &'static str;

    /// Ordered record ids matching a query.
    async fn search(&self, query: &str, params: &SearchParams) -> anyhow::Result<Vec<String>>;

    /// Full metadata for one id, or `None` when the database has no article for it.
    async fn fetch_details(&self, id: &str) -> anyhow::Result<Option<RawArticle>>;
}

/// Fetch details for each id in order, waiting `delay` before every request,
/// and attach the resolved full-text link. Records that fail to fetch or parse
/// are logged and skipped.
pub async fn fetch_records(
    source: &dyn MetadataSource,
    resolver: &LinkResolver,
    ids: &[String],
    delay: Duration,
) -> Vec<ArticleRecord> {
    let mut records = Vec::with_capacity(ids.len());

    for id in ids {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let raw = match source.fetch_details(id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!(id = %id, "No article data returned");
                continue;
            }
            Err(e) => {
                error!(id = %id, error = %e, "Error processing record");
                continue;
            }
        };

        let link = resolver.resolve(&raw).await;
        let record = raw.record.with_full_text_link(link);
        info!(
            id = %id,
            title = %truncate_title(&record.title),
            has_link = record.full_text_link.is_some(),
            "Fetched record"
        );
        records.push(record);
    }

    records
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= 60 {
        title.to_string()
    } else {
        format!("{}...", title.chars().take(60).collect::<String>())
    }
}
