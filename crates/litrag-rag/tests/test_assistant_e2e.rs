//! End-to-end question answering with in-process embedding and generation
//! backends. No network access.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use litrag_ingestion::chunker::ChunkerConfig;
use litrag_ingestion::layout::OutputLayout;
use litrag_ingestion::sources::{MetadataSource, SearchParams};
use litrag_ingestion::{ArticleRecord, FetcherConfig, LinkResolver, PdfFetcher, RawArticle, ResolverConfig};
use litrag_rag::assembler::RetrievalConfig;
use litrag_rag::embedding::EmbedError;
use litrag_rag::llm::LlmError;
use litrag_rag::prompts::NO_CORPUS_MESSAGE;
use litrag_rag::{Acquisition, AssistantSettings, Embedder, GenerationParams, Generator, ResearchAssistant};

// ── Fakes ─────────────────────────────────────────────────────────────────────

/// Places each chunk on the x axis by its leading marker word, so distances
/// to the question (at the origin) are fixed.
struct MarkerEmbedder;

#[async_trait]
impl Embedder for MarkerEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| {
                let x = match t.split_whitespace().next().unwrap_or_default() {
                    "p1c0" => 1.0,
                    "p1c1" => 1.1,
                    "p2c0" => 2.0,
                    "p2c1" => 2.1,
                    "p0c0" => 3.0,
                    "p0c1" => 3.1,
                    _ => 0.0,
                };
                vec![x, 0.0]
            })
            .collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(2)
    }
}

#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
    limit: Option<usize>,
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("KRAS is a GTPase.".to_string())
    }

    fn model_id(&self) -> &str {
        "recording"
    }

    fn max_input_tokens(&self) -> Option<usize> {
        self.limit
    }
}

/// Finds records that never carry a full-text link.
struct LinklessSource;

#[async_trait]
impl MetadataSource for LinklessSource {
    fn database(&self) -> &'static str {
        "pubmed"
    }

    async fn search(&self, _query: &str, _params: &SearchParams) -> anyhow::Result<Vec<String>> {
        Ok(vec!["100".into(), "101".into()])
    }

    async fn fetch_details(&self, id: &str) -> anyhow::Result<Option<RawArticle>> {
        Ok(Some(RawArticle {
            record: ArticleRecord::new(id, format!("Paper {id}")),
            cross_refs: vec![],
            inline_links: vec![],
        }))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Two 40-word paragraphs, each becoming its own chunk.
fn paper_text(paper: usize) -> String {
    let para = |chunk: usize| {
        let mut words = vec![format!("p{paper}c{chunk}")];
        words.extend(std::iter::repeat("evidence".to_string()).take(39));
        words.join(" ")
    };
    format!("{}\n\n{}", para(0), para(1))
}

fn documents() -> Vec<(ArticleRecord, String)> {
    (0..3)
        .map(|i| (ArticleRecord::new(format!("PMID{i}"), format!("Paper {i}")), paper_text(i)))
        .collect()
}

fn assistant(root: &std::path::Path, generator: Arc<RecordingGenerator>) -> ResearchAssistant {
    let acquisition = Acquisition {
        source: Box::new(LinklessSource),
        resolver: LinkResolver::new(ResolverConfig::default()).unwrap(),
        fetcher: PdfFetcher::new(FetcherConfig::default()).unwrap(),
        layout: OutputLayout::new(root),
    };
    let settings = AssistantSettings {
        chunking: ChunkerConfig { chunk_size: 40, overlap: 0, min_chunk_words: 30 },
        // 40 words estimate at 52 tokens: two chunks fit, a third does not
        retrieval: RetrievalConfig { max_context_tokens: 120.0, ..Default::default() },
        ..Default::default()
    };
    ResearchAssistant::new(acquisition, Arc::new(MarkerEmbedder), generator, settings).unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_answer_uses_nearest_distinct_papers_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let mut assistant = assistant(dir.path(), generator.clone());

    let summary = assistant.index_documents(documents()).await.unwrap();
    assert_eq!(summary.papers, 3);
    assert_eq!(summary.chunks, 6);

    let answer = assistant.answer_question("What does KRAS do?", 6).await.unwrap();
    assert!(answer.grounded);
    assert_eq!(answer.text, "KRAS is a GTPase.");
    let ids: Vec<&str> = answer.sources.iter().map(|c| c.pubmed_id.as_str()).collect();
    assert_eq!(ids, vec!["PMID1", "PMID2"]);

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    let first = prompt.find("From paper 'Paper 1' (Journal):\np1c0").unwrap();
    let second = prompt.find("From paper 'Paper 2' (Journal):\np2c0").unwrap();
    assert!(first < second);
    assert!(!prompt.contains("Paper 0"));
    assert!(!prompt.contains("p1c1"));
    assert!(prompt.ends_with("Question: What does KRAS do?\n\nAnswer: "));
}

#[tokio::test]
async fn test_prompt_cap_shortens_excerpts_not_question() {
    let dir = tempfile::tempdir().unwrap();
    // 60 tokens leave room for 46 words, 28 of them instructions and question
    let generator = Arc::new(RecordingGenerator { limit: Some(60), ..Default::default() });
    let mut assistant = assistant(dir.path(), generator.clone());
    assistant.index_documents(documents()).await.unwrap();

    assistant.answer_question("What does KRAS do?", 6).await.unwrap();

    let prompts = generator.prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.ends_with("Question: What does KRAS do?\n\nAnswer: "));
    assert!(prompt.contains("p1c0"));
    assert!(!prompt.contains("p2c0"));
    assert!(prompt.split_whitespace().count() <= 46);
}

#[tokio::test]
async fn test_question_before_search_returns_guidance() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let assistant = assistant(dir.path(), generator.clone());

    let answer = assistant.answer_question("anything?", 5).await.unwrap();
    assert_eq!(answer.text, NO_CORPUS_MESSAGE);
    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_search_without_pdfs_leaves_corpus_empty() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(RecordingGenerator::default());
    let mut assistant = assistant(dir.path(), generator.clone());
    assistant.index_documents(documents()).await.unwrap();

    let summary = assistant.search_papers("kras", 2).await.unwrap();
    assert_eq!(summary.records_found, 2);
    assert_eq!(summary.pdfs_downloaded, 0);
    assert_eq!(summary.indexed.chunks, 0);
    assert!(summary.metadata_file.is_none());

    // The previous corpus is replaced, not merged
    assert!(assistant.corpus().is_empty());
    let answer = assistant.answer_question("anything?", 5).await.unwrap();
    assert_eq!(answer.text, NO_CORPUS_MESSAGE);
}

#[tokio::test]
async fn test_short_chunks_are_not_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let mut assistant = assistant(dir.path(), Arc::new(RecordingGenerator::default()));

    let short = vec![(ArticleRecord::new("S", "Short"), "p0c0 only a handful of words".to_string())];
    let summary = assistant.index_documents(short).await.unwrap();
    assert_eq!(summary.papers, 1);
    assert_eq!(summary.chunks, 0);
    assert!(assistant.corpus().is_empty());
}

#[tokio::test]
async fn test_session_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = assistant(dir.path(), Arc::new(RecordingGenerator::default()));
    first.index_documents(documents()).await.unwrap();
    let session = first.session_dir();
    first.save_session(&session).unwrap();

    let generator = Arc::new(RecordingGenerator::default());
    let mut second = assistant(dir.path(), generator.clone());
    assert!(second.load_session(&session).unwrap());
    assert_eq!(second.corpus(), first.corpus());

    let answer = second.answer_question("What does KRAS do?", 6).await.unwrap();
    let ids: Vec<&str> = answer.sources.iter().map(|c| c.pubmed_id.as_str()).collect();
    assert_eq!(ids, vec!["PMID1", "PMID2"]);
}

#[tokio::test]
async fn test_load_session_from_empty_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut assistant = assistant(dir.path(), Arc::new(RecordingGenerator::default()));
    assert!(!assistant.load_session(&dir.path().join("nothing-here")).unwrap());
    assert!(assistant.corpus().is_empty());
}
