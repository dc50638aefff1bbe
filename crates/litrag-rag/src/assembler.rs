//! Retrieval context assembly.
//!
//! Walks search hits nearest first, keeps at most one chunk per paper and
//! stops (or skips, per [`BudgetPolicy`]) once the token estimate would pass
//! the budget.

use std::collections::HashSet;

use litrag_ingestion::chunker::estimate_tokens;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::Corpus;
use crate::index::SearchHit;

/// What to do with a chunk that does not fit the remaining budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetPolicy {
    /// End assembly at the first chunk that does not fit.
    #[default]
    Stop,
    /// Leave it out and keep trying smaller chunks further down the list.
    SkipAndContinue,
}

fn default_top_k() -> usize { 5 }
fn default_max_context_tokens() -> f64 { 2048.0 }

/// `[retrieval]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: f64,
    #[serde(default)]
    pub budget_policy: BudgetPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_tokens: default_max_context_tokens(),
            budget_policy: BudgetPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalContext {
    pub text: String,
    /// PubMed ids of the papers quoted, in context order.
    pub sources: Vec<String>,
    pub estimated_tokens: f64,
}

impl RetrievalContext {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

pub fn assemble_context(
    hits: &[SearchHit],
    corpus: &Corpus,
    max_tokens: f64,
    policy: BudgetPolicy,
) -> RetrievalContext {
    let mut ctx = RetrievalContext::default();
    let mut used: HashSet<&str> = HashSet::new();

    for hit in hits {
        let (Some(chunk), Some(paper)) = (corpus.chunks.get(hit.position), corpus.paper_of(hit.position)) else {
            warn!(position = hit.position, "Search hit has no chunk in the corpus");
            continue;
        };
        if used.contains(paper.pubmed_id.as_str()) {
            continue;
        }

        let tokens = estimate_tokens(&chunk.text);
        if ctx.estimated_tokens + tokens > max_tokens {
            match policy {
                BudgetPolicy::Stop => break,
                BudgetPolicy::SkipAndContinue => continue,
            }
        }

        used.insert(paper.pubmed_id.as_str());
        ctx.text.push_str(&format!(
            "\n\nFrom paper '{}' ({}):\n{}\n",
            paper.title,
            paper.journal_display_name(),
            chunk.text
        ));
        ctx.sources.push(paper.pubmed_id.clone());
        ctx.estimated_tokens += tokens;
    }

    debug!(papers = ctx.sources.len(), tokens = ctx.estimated_tokens, "Assembled context");
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Chunk;
    use litrag_ingestion::ArticleRecord;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn corpus() -> Corpus {
        let mut nature = ArticleRecord::new("A", "Paper A");
        nature.journal.name = "Nature".into();
        Corpus {
            papers: vec![nature, ArticleRecord::new("B", "Paper B"), ArticleRecord::new("C", "Paper C")],
            chunks: vec![
                Chunk { paper: 0, text: words(10) },
                Chunk { paper: 0, text: words(10) },
                Chunk { paper: 1, text: words(100) },
                Chunk { paper: 2, text: words(10) },
            ],
        }
    }

    fn hits(positions: &[usize]) -> Vec<SearchHit> {
        positions
            .iter()
            .enumerate()
            .map(|(i, &position)| SearchHit { position, distance: i as f32 })
            .collect()
    }

    #[test]
    fn test_one_chunk_per_paper() {
        let ctx = assemble_context(&hits(&[0, 1, 3]), &corpus(), 2048.0, BudgetPolicy::Stop);
        assert_eq!(ctx.sources, vec!["A", "C"]);
        assert!((ctx.estimated_tokens - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_citation_format() {
        let ctx = assemble_context(&hits(&[0, 3]), &corpus(), 2048.0, BudgetPolicy::Stop);
        assert!(ctx.text.starts_with(&format!("\n\nFrom paper 'Paper A' (Nature):\n{}\n", words(10))));
        assert!(ctx.text.contains("From paper 'Paper C' (Journal):"));
    }

    #[test]
    fn test_stop_at_first_over_budget_chunk() {
        // 13 + 130 > 100, so the large chunk ends assembly even though C would fit
        let ctx = assemble_context(&hits(&[0, 2, 3]), &corpus(), 100.0, BudgetPolicy::Stop);
        assert_eq!(ctx.sources, vec!["A"]);
    }

    #[test]
    fn test_skip_and_continue() {
        let ctx = assemble_context(&hits(&[0, 2, 3]), &corpus(), 100.0, BudgetPolicy::SkipAndContinue);
        assert_eq!(ctx.sources, vec!["A", "C"]);
    }

    #[test]
    fn test_empty_hits_and_stale_positions() {
        let c = corpus();
        assert!(assemble_context(&[], &c, 2048.0, BudgetPolicy::Stop).is_empty());
        let ctx = assemble_context(&hits(&[42, 3]), &c, 2048.0, BudgetPolicy::Stop);
        assert_eq!(ctx.sources, vec!["C"]);
    }
}
