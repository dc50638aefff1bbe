//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use litrag_ingestion::sources::SortOrder;

#[derive(Debug, Parser)]
#[command(name = "litrag", version, about = "Research paper assistant over PubMed full texts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Generation model, overriding llm.model
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Embedding model, overriding embedding.model
    #[arg(short, long, global = true)]
    pub embedding_model: Option<String>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: $LITRAG_CONFIG or ./litrag.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search PubMed, download full texts and index them for questions
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        max_results: usize,
    },
    /// Answer a question from the papers indexed by the last search
    Ask {
        question: String,
        /// Excerpts to retrieve (default: retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Collect paper metadata (and optionally PDFs) for a query
    Scrape {
        #[arg(short, long)]
        query: String,
        #[arg(short = 'n', long, default_value_t = 100)]
        max_results: usize,
        /// Output root (default: output.dir)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Seconds between detail requests (default: pubmed.scrape_delay_secs)
        #[arg(short, long)]
        rate_limit: Option<f64>,
        /// Publication date window, e.g. 2020/01/01 2023/12/31
        #[arg(long, num_args = 2, value_names = ["START", "END"])]
        date_range: Option<Vec<String>>,
        #[arg(short, long, value_enum, default_value_t = SortArg::Relevance)]
        sort: SortArg,
        /// Only count papers whose PDF downloads
        #[arg(short = 'p', long)]
        download_pdfs: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Relevance,
    Date,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Relevance => SortOrder::Relevance,
            SortArg::Date => SortOrder::Date,
        }
    }
}
