//! Subcommand handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use litrag_ingestion::layout::OutputLayout;
use litrag_ingestion::scrape::{run_scrape, ScrapeContext, ScrapeJob};
use litrag_ingestion::sources::pubmed::PubMedClient;
use litrag_ingestion::sources::{DateRange, SortOrder};
use litrag_ingestion::{LinkResolver, PdfFetcher};
use litrag_rag::llm::build_generator;
use litrag_rag::{Acquisition, AssistantSettings, EmbeddingClient, ResearchAssistant};
use tracing::info;

use crate::config::Config;

/// How a command finished, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Nothing was indexed or there was nothing to answer from.
    NothingToWorkWith,
}

fn build_assistant(config: &Config) -> anyhow::Result<ResearchAssistant> {
    let acquisition = Acquisition {
        source: Box::new(PubMedClient::new(&config.pubmed)?),
        resolver: LinkResolver::new(config.resolver.clone())?,
        fetcher: PdfFetcher::new(config.fetcher.clone())?,
        layout: OutputLayout::new(&config.output.dir),
    };
    let embedder = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
    let generator = build_generator(&config.llm)?;
    let settings = AssistantSettings {
        chunking: config.chunking.clone(),
        retrieval: config.retrieval.clone(),
        generation: config.llm.generation.clone(),
        request_delay: config.pubmed.request_delay(),
    };
    Ok(ResearchAssistant::new(acquisition, embedder, generator, settings)?)
}

// ── search ────────────────────────────────────────────────────────────────────

pub async fn search(config: &Config, query: &str, max_results: usize) -> anyhow::Result<Outcome> {
    let mut assistant = build_assistant(config)?;
    info!(query, max_results, "Searching for papers");

    let summary = assistant.search_papers(query, max_results).await.context("paper search failed")?;
    let session = assistant.session_dir();
    assistant.save_session(&session).context("could not save the session")?;

    println!(
        "Found {} papers, downloaded {} PDFs, indexed {} chunks from {} papers.",
        summary.records_found, summary.pdfs_downloaded, summary.indexed.chunks, summary.indexed.papers
    );
    if let Some(path) = &summary.metadata_file {
        println!("Metadata saved to {}", path.display());
    }

    if summary.indexed.chunks == 0 {
        println!("No papers could be indexed for this query.");
        return Ok(Outcome::NothingToWorkWith);
    }
    for paper in &assistant.corpus().papers {
        println!("  - {} ({})", paper.title, paper.pubmed_id);
    }
    Ok(Outcome::Done)
}

// ── ask ───────────────────────────────────────────────────────────────────────

pub async fn ask(config: &Config, question: &str, top_k: Option<usize>) -> anyhow::Result<Outcome> {
    let mut assistant = build_assistant(config)?;
    let session = assistant.session_dir();
    if !assistant.load_session(&session).context("could not restore the session")? {
        info!(dir = %session.display(), "No saved session");
    }

    let k = top_k.unwrap_or(config.retrieval.top_k);
    let answer = assistant.answer_question(question, k).await.context("question answering failed")?;

    println!("{}", answer.text.trim());
    if !answer.grounded {
        return Ok(Outcome::NothingToWorkWith);
    }
    if !answer.sources.is_empty() {
        println!("\nSources:");
        for source in &answer.sources {
            println!("  - {} (PMID {})", source.title, source.pubmed_id);
        }
    }
    Ok(Outcome::Done)
}

// ── scrape ────────────────────────────────────────────────────────────────────

pub struct ScrapeArgs {
    pub query: String,
    pub max_results: usize,
    pub output_dir: Option<PathBuf>,
    pub rate_limit: Option<f64>,
    pub date_range: Option<Vec<String>>,
    pub sort: SortOrder,
    pub download_pdfs: bool,
}

pub async fn scrape(config: &Config, args: ScrapeArgs) -> anyhow::Result<Outcome> {
    let request_delay = match args.rate_limit {
        Some(secs) => Duration::try_from_secs_f64(secs).context("--rate-limit must be a non-negative number")?,
        None => config.pubmed.scrape_delay(),
    };
    let date_range = match args.date_range.as_deref() {
        Some([start, end]) => Some(DateRange { start: start.clone(), end: end.clone() }),
        Some(_) => anyhow::bail!("--date-range takes exactly two values"),
        None => None,
    };

    let source = PubMedClient::new(&config.pubmed)?;
    let resolver = LinkResolver::new(config.resolver.clone())?;
    let fetcher = PdfFetcher::new(config.fetcher.clone())?;
    let layout = OutputLayout::new(args.output_dir.as_ref().unwrap_or(&config.output.dir));
    let ctx = ScrapeContext { source: &source, resolver: &resolver, fetcher: &fetcher, layout: &layout };

    let job = ScrapeJob {
        query: args.query,
        max_results: args.max_results,
        date_range,
        sort: args.sort,
        download_pdfs: args.download_pdfs,
        request_delay,
    };
    let result = run_scrape(&job, &ctx).await.context("scrape failed")?;

    println!(
        "Saved {} papers ({} PDFs) after {} attempts in {:.1}s.",
        result.papers_saved,
        result.pdfs_downloaded,
        result.attempts,
        result.duration_ms as f64 / 1000.0
    );
    if let Some(path) = &result.metadata_file {
        println!("Metadata saved to {}", path.display());
    }
    if !result.errors.is_empty() {
        println!("{} papers failed; rerun with --verbose for details.", result.errors.len());
    }

    Ok(if result.papers_saved == 0 { Outcome::NothingToWorkWith } else { Outcome::Done })
}
