//! Standalone literature scrape run.
//!
//! Pages through a query's results, fetching details (and optionally PDFs)
//! until enough papers are collected or the attempt budget is spent, then
//! writes the metadata snapshot.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use litrag_common::LitragError;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::fetcher::PdfFetcher;
use crate::layout::OutputLayout;
use crate::resolver::LinkResolver;
use crate::sources::{fetch_records, DateRange, MetadataSource, SearchParams, SortOrder};

/// Search batch ceiling per round.
const MAX_BATCH: usize = 100;
/// Attempts allowed per requested paper.
const ATTEMPTS_PER_RESULT: usize = 5;

// ── Job config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScrapeJob {
    pub query: String,
    pub max_results: usize,
    pub date_range: Option<DateRange>,
    pub sort: SortOrder,
    /// Only papers whose PDF downloaded count towards `max_results`.
    pub download_pdfs: bool,
    /// Wait before each detail fetch.
    pub request_delay: Duration,
}

/// Network and storage collaborators for a run.
pub struct ScrapeContext<'a> {
    pub source: &'a dyn MetadataSource,
    pub resolver: &'a LinkResolver,
    pub fetcher: &'a PdfFetcher,
    pub layout: &'a OutputLayout,
}

// ── Result summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub query: String,
    pub papers_saved: usize,
    pub pdfs_downloaded: usize,
    pub attempts: usize,
    pub metadata_file: Option<PathBuf>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Run one scrape job. Per-paper failures are collected in `errors`; only
/// output-directory and snapshot failures abort the run.
#[instrument(skip(ctx), fields(query = %job.query))]
pub async fn run_scrape(job: &ScrapeJob, ctx: &ScrapeContext<'_>) -> Result<ScrapeResult, LitragError> {
    let t0 = Instant::now();
    let dirs = ctx.layout.query_dirs(ctx.source.database(), &job.query)?;

    let max_attempts = job.max_results.saturating_mul(ATTEMPTS_PER_RESULT);
    let batch = MAX_BATCH.min(job.max_results.saturating_mul(2));

    let mut saved = Vec::new();
    let mut errors = Vec::new();
    let mut pdfs_downloaded = 0;
    let mut attempts = 0;
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset = 0;

    info!(max_results = job.max_results, "Starting scrape");

    'rounds: while saved.len() < job.max_results && attempts < max_attempts {
        let params = SearchParams {
            max_results: batch,
            offset,
            date_range: job.date_range.clone(),
            sort: job.sort,
        };
        let ids = match ctx.source.search(&job.query, &params).await {
            Ok(ids) => ids,
            Err(e) => {
                let msg = format!("search failed: {e}");
                warn!("{}", &msg);
                errors.push(msg);
                break;
            }
        };
        offset += ids.len();

        let fresh: Vec<String> = ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        if fresh.is_empty() {
            info!("No further results for query");
            break;
        }

        for id in fresh {
            if saved.len() >= job.max_results || attempts >= max_attempts {
                break 'rounds;
            }
            attempts += 1;

            let Some(record) = fetch_records(ctx.source, ctx.resolver, std::slice::from_ref(&id), job.request_delay)
                .await
                .pop()
            else {
                continue;
            };

            if !job.download_pdfs {
                saved.push(record);
                continue;
            }

            let Some(link) = record.full_text_link.clone() else {
                continue;
            };
            let dest = dirs.pdf_path_for(&record);
            match ctx.fetcher.download(&link, &dest).await {
                Ok(path) => {
                    info!(path = %path.display(), "Downloaded PDF");
                    pdfs_downloaded += 1;
                    saved.push(record);
                }
                Err(e) => {
                    let msg = format!("PDF download failed for {}: {e}", record.pubmed_id);
                    warn!("{}", &msg);
                    errors.push(msg);
                }
            }
        }
    }

    let metadata_file = if saved.is_empty() {
        warn!("No papers collected; no metadata snapshot written");
        None
    } else {
        Some(dirs.save_metadata_snapshot(&saved)?)
    };

    let result = ScrapeResult {
        query: job.query.clone(),
        papers_saved: saved.len(),
        pdfs_downloaded,
        attempts,
        metadata_file,
        errors,
        duration_ms: t0.elapsed().as_millis() as u64,
    };

    info!(
        papers_saved = result.papers_saved,
        pdfs        = result.pdfs_downloaded,
        attempts    = result.attempts,
        errors      = result.errors.len(),
        duration_ms = result.duration_ms,
        "Scrape complete"
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetcherConfig;
    use crate::models::{ArticleRecord, RawArticle};
    use crate::resolver::ResolverConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves `total` sequential ids, honouring offset/limit paging.
    struct PagedSource {
        total: usize,
        searches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl MetadataSource for PagedSource {
        fn database(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, _query: &str, params: &SearchParams) -> anyhow::Result<Vec<String>> {
            self.searches.lock().unwrap().push(params.offset);
            let end = (params.offset + params.max_results * 2).min(self.total);
            Ok((params.offset..end).map(|i| i.to_string()).collect())
        }

        async fn fetch_details(&self, id: &str) -> anyhow::Result<Option<RawArticle>> {
            if id == "1" {
                anyhow::bail!("malformed record");
            }
            Ok(Some(RawArticle {
                record: ArticleRecord::new(id, format!("Paper {id}")),
                cross_refs: vec![],
                inline_links: vec![],
            }))
        }
    }

    fn job(max_results: usize) -> ScrapeJob {
        ScrapeJob {
            query: "kras".into(),
            max_results,
            date_range: None,
            sort: SortOrder::Relevance,
            download_pdfs: false,
            request_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_collects_requested_count_and_skips_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let source = PagedSource { total: 50, searches: Mutex::new(vec![]) };
        let resolver = LinkResolver::new(ResolverConfig::default()).unwrap();
        let fetcher = PdfFetcher::new(FetcherConfig::default()).unwrap();
        let layout = OutputLayout::new(tmp.path());
        let ctx = ScrapeContext { source: &source, resolver: &resolver, fetcher: &fetcher, layout: &layout };

        let result = run_scrape(&job(3), &ctx).await.unwrap();
        assert_eq!(result.papers_saved, 3);
        // id "1" failed and was skipped, so four attempts were needed
        assert_eq!(result.attempts, 4);

        let snapshot = result.metadata_file.unwrap();
        assert!(snapshot.starts_with(tmp.path().join("fake/metadata/kras")));
        let saved: Vec<ArticleRecord> =
            serde_json::from_str(&std::fs::read_to_string(snapshot).unwrap()).unwrap();
        let ids: Vec<_> = saved.iter().map(|r| r.pubmed_id.as_str()).collect();
        assert_eq!(ids, vec!["0", "2", "3"]);
    }

    #[tokio::test]
    async fn test_stops_when_results_run_out() {
        let tmp = tempfile::tempdir().unwrap();
        let source = PagedSource { total: 2, searches: Mutex::new(vec![]) };
        let resolver = LinkResolver::new(ResolverConfig::default()).unwrap();
        let fetcher = PdfFetcher::new(FetcherConfig::default()).unwrap();
        let layout = OutputLayout::new(tmp.path());
        let ctx = ScrapeContext { source: &source, resolver: &resolver, fetcher: &fetcher, layout: &layout };

        let result = run_scrape(&job(10), &ctx).await.unwrap();
        assert_eq!(result.papers_saved, 1);
        assert_eq!(*source.searches.lock().unwrap(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_pdf_mode_skips_papers_without_links() {
        let tmp = tempfile::tempdir().unwrap();
        let source = PagedSource { total: 5, searches: Mutex::new(vec![]) };
        let resolver = LinkResolver::new(ResolverConfig::default()).unwrap();
        let fetcher = PdfFetcher::new(FetcherConfig::default()).unwrap();
        let layout = OutputLayout::new(tmp.path());
        let ctx = ScrapeContext { source: &source, resolver: &resolver, fetcher: &fetcher, layout: &layout };

        let mut j = job(2);
        j.download_pdfs = true;
        let result = run_scrape(&j, &ctx).await.unwrap();
        assert_eq!(result.papers_saved, 0);
        assert!(result.metadata_file.is_none());
    }
}
