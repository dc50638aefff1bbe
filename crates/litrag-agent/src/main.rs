//! litrag: PubMed literature assistant.
//! Entry point for the `litrag` binary.

mod cli;
mod commands;
mod config;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use commands::{Outcome, ScrapeArgs};

fn init_logging(verbose: bool) {
    let default = if verbose {
        "litrag_agent=debug,litrag_ingestion=debug,litrag_rag=debug,litrag_common=debug,info"
    } else {
        "info"
    };
    let filter = if verbose {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        // Printing help to stdout only fails on a closed pipe
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    let mut config = match config::Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Could not load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(model) = cli.embedding_model {
        config.embedding.model = model;
    }
    info!(llm = %config.llm.model, embedding = %config.embedding.model, "Configuration loaded");

    let result = match command {
        Command::Search { query, max_results } => commands::search(&config, &query, max_results).await,
        Command::Ask { question, top_k } => commands::ask(&config, &question, top_k).await,
        Command::Scrape { query, max_results, output_dir, rate_limit, date_range, sort, download_pdfs } => {
            let args = ScrapeArgs {
                query,
                max_results,
                output_dir,
                rate_limit,
                date_range,
                sort: sort.into(),
                download_pdfs,
            };
            commands::scrape(&config, args).await
        }
    };

    match result {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::NothingToWorkWith) => ExitCode::from(2),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
