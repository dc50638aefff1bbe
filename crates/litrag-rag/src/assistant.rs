//! Research assistant: paper acquisition, indexing and question answering.
//!
//! Search flow:   search → fetch details → resolve link → download PDF →
//!                extract → clean → chunk → embed → index
//! Question flow: embed question → k-NN → assemble context → prompt → generate
//!
//! The assistant owns the corpus and the index; both are replaced wholesale
//! on every search.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use litrag_common::LitragError;
use litrag_ingestion::chunker::{chunk_text, clean_text, word_count, ChunkerConfig};
use litrag_ingestion::fetcher::PdfFetcher;
use litrag_ingestion::layout::OutputLayout;
use litrag_ingestion::pdf_text::extract_text_from_pdf;
use litrag_ingestion::resolver::LinkResolver;
use litrag_ingestion::sources::{fetch_records, MetadataSource, SearchParams};
use litrag_ingestion::ArticleRecord;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::assembler::{assemble_context, RetrievalConfig};
use crate::corpus::{Chunk, Corpus};
use crate::embedding::{EmbedError, Embedder};
use crate::index::{IndexError, VectorIndex};
use crate::llm::{GenerationParams, Generator, LlmError};
use crate::prompts::{build_answer_prompt, NO_CORPUS_MESSAGE};

/// Chunks shorter than this are not worth indexing.
const MIN_INDEXED_WORDS: usize = 30;

const CORPUS_FILE: &str = "corpus.json";
const INDEX_FILE: &str = "index.lrvi";

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("metadata search failed: {0}")]
    Search(String),
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Pipeline(#[from] LitragError),
}

/// Network and storage collaborators used by `search_papers`.
pub struct Acquisition {
    pub source: Box<dyn MetadataSource>,
    pub resolver: LinkResolver,
    pub fetcher: PdfFetcher,
    pub layout: OutputLayout,
}

#[derive(Debug, Clone, Default)]
pub struct AssistantSettings {
    pub chunking: ChunkerConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationParams,
    /// Wait before each metadata detail fetch.
    pub request_delay: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    pub papers: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchSummary {
    pub records_found: usize,
    pub pdfs_downloaded: usize,
    pub indexed: IndexSummary,
    pub metadata_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub pubmed_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Citation>,
    /// False when there was no indexed corpus to answer from.
    pub grounded: bool,
}

pub struct ResearchAssistant {
    acquisition: Acquisition,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    settings: AssistantSettings,
    corpus: Corpus,
    index: Option<VectorIndex>,
}

impl ResearchAssistant {
    pub fn new(
        acquisition: Acquisition,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: AssistantSettings,
    ) -> Result<Self, AssistantError> {
        settings.chunking.validate()?;
        info!(model = %generator.model_id(), "Research assistant initialised");
        Ok(Self {
            acquisition,
            embedder,
            generator,
            settings,
            corpus: Corpus::default(),
            index: None,
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn session_dir(&self) -> PathBuf {
        self.acquisition.layout.session_dir()
    }

    // ── Search ────────────────────────────────────────────────────────────────

    /// Find papers for `query`, download and index every one with a readable PDF.
    /// Papers that cannot be fetched or read are logged and skipped.
    #[instrument(skip(self))]
    pub async fn search_papers(&mut self, query: &str, max_results: usize) -> Result<SearchSummary, AssistantError> {
        let acq = &self.acquisition;
        let ids = acq
            .source
            .search(query, &SearchParams::new(max_results))
            .await
            .map_err(|e| AssistantError::Search(e.to_string()))?;

        let records = fetch_records(acq.source.as_ref(), &acq.resolver, &ids, self.settings.request_delay).await;
        let dirs = acq.layout.query_dirs(acq.source.database(), query)?;

        let mut documents = Vec::new();
        let mut pdfs_downloaded = 0;
        for record in records.iter() {
            let Some(url) = record.full_text_link.as_deref() else {
                warn!(pmid = %record.pubmed_id, "No PDF available for paper");
                continue;
            };

            let dest = dirs.pdf_path_for(record);
            if let Err(e) = acq.fetcher.download(url, &dest).await {
                error!(pmid = %record.pubmed_id, error = %e, "Error processing paper");
                continue;
            }
            pdfs_downloaded += 1;

            let text = clean_text(&extract_text_from_pdf(&dest).await);
            if text.is_empty() {
                warn!(title = %record.title, "Failed to extract text from paper");
                continue;
            }
            info!(title = %record.title, "Successfully processed paper");
            documents.push((record.clone(), text));
        }

        let processed: Vec<ArticleRecord> = documents.iter().map(|(r, _)| r.clone()).collect();
        let metadata_file = if processed.is_empty() {
            None
        } else {
            Some(dirs.save_metadata_snapshot(&processed)?)
        };

        let indexed = self.index_documents(documents).await?;
        info!(papers = indexed.papers, chunks = indexed.chunks, "Search complete");

        Ok(SearchSummary { records_found: records.len(), pdfs_downloaded, indexed, metadata_file })
    }

    /// Replace the corpus with `documents` (record plus cleaned full text)
    /// and rebuild the index from scratch.
    pub async fn index_documents(
        &mut self,
        documents: Vec<(ArticleRecord, String)>,
    ) -> Result<IndexSummary, AssistantError> {
        let mut corpus = Corpus::default();
        for (record, text) in documents {
            let paper = corpus.papers.len();
            let chunks: Vec<Chunk> = chunk_text(&text, &self.settings.chunking)
                .into_iter()
                .filter(|c| word_count(c) >= MIN_INDEXED_WORDS)
                .map(|text| Chunk { paper, text })
                .collect();
            corpus.papers.push(record);
            corpus.chunks.extend(chunks);
        }
        info!(chunks = corpus.chunks.len(), papers = corpus.papers.len(), "Created chunks");

        self.index = None;
        if corpus.chunks.is_empty() {
            warn!("No chunks to index");
            self.corpus = corpus;
            return Ok(IndexSummary { papers: self.corpus.papers.len(), chunks: 0 });
        }

        let texts: Vec<String> = corpus.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.encode(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::Shape(format!("{} chunks produced {} vectors", texts.len(), vectors.len())).into());
        }

        let dim = vectors[0].len();
        let mut index = VectorIndex::new(dim)?;
        index.add(&vectors)?;
        info!(vectors = index.len(), dim, "Added vectors to search index");

        let summary = IndexSummary { papers: corpus.papers.len(), chunks: corpus.chunks.len() };
        self.corpus = corpus;
        self.index = Some(index);
        Ok(summary)
    }

    // ── Question answering ────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn answer_question(&self, question: &str, k: usize) -> Result<Answer, AssistantError> {
        let Some(index) = self.index.as_ref().filter(|_| !self.corpus.is_empty()) else {
            error!("No papers indexed. Search for papers first.");
            return Ok(Answer { text: NO_CORPUS_MESSAGE.to_string(), sources: vec![], grounded: false });
        };

        let query = self
            .embedder
            .encode(&[question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Shape("no vector for the question".into()))?;

        let hits = index.search(&query, k)?;
        let retrieval = &self.settings.retrieval;
        let context = assemble_context(&hits, &self.corpus, retrieval.max_context_tokens, retrieval.budget_policy);

        let prompt = build_answer_prompt(&context.text, question, self.generator.max_input_tokens());
        let text = self.generator.generate(&prompt, &self.settings.generation).await?;
        info!("Generated answer successfully");

        let sources = context
            .sources
            .iter()
            .filter_map(|id| self.corpus.papers.iter().find(|p| &p.pubmed_id == id))
            .map(|p| Citation { pubmed_id: p.pubmed_id.clone(), title: p.title.clone() })
            .collect();

        Ok(Answer { text, sources, grounded: true })
    }

    // ── Session persistence ───────────────────────────────────────────────────

    /// Write the corpus and index under `dir`.
    pub fn save_session(&self, dir: &Path) -> Result<(), AssistantError> {
        self.corpus.save(&dir.join(CORPUS_FILE))?;
        let index_path = dir.join(INDEX_FILE);
        match &self.index {
            Some(index) => index.save(&index_path)?,
            None if index_path.exists() => std::fs::remove_file(&index_path).map_err(LitragError::from)?,
            None => {}
        }
        info!(dir = %dir.display(), chunks = self.corpus.chunks.len(), "Saved session");
        Ok(())
    }

    /// Restore a session saved by [`save_session`](Self::save_session).
    /// Returns false when `dir` holds no session.
    pub fn load_session(&mut self, dir: &Path) -> Result<bool, AssistantError> {
        let corpus_path = dir.join(CORPUS_FILE);
        if !corpus_path.exists() {
            return Ok(false);
        }
        let corpus = Corpus::load(&corpus_path)?;

        let index_path = dir.join(INDEX_FILE);
        let index = if index_path.exists() { Some(VectorIndex::load(&index_path)?) } else { None };

        let indexed = index.as_ref().map_or(0, VectorIndex::len);
        if indexed != corpus.chunks.len() {
            return Err(IndexError::Corrupt(format!(
                "session index holds {} vectors for {} chunks",
                indexed,
                corpus.chunks.len()
            ))
            .into());
        }

        self.corpus = corpus;
        self.index = index;
        info!(papers = self.corpus.papers.len(), chunks = indexed, "Restored session");
        Ok(true)
    }
}
