//! Session corpus: the papers and the chunks cut from them.

use std::io::Write;
use std::path::Path;

use litrag_common::LitragError;
use litrag_ingestion::ArticleRecord;
use serde::{Deserialize, Serialize};

/// A piece of one paper's text. `paper` is a position in [`Corpus::papers`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub paper: usize,
    pub text: String,
}

/// Chunk positions line up with vector index positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub papers: Vec<ArticleRecord>,
    pub chunks: Vec<Chunk>,
}

impl Corpus {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Owning paper of a chunk position.
    pub fn paper_of(&self, chunk: usize) -> Option<&ArticleRecord> {
        self.chunks.get(chunk).and_then(|c| self.papers.get(c.paper))
    }

    /// Write atomically: a temp file beside `path`, then rename.
    pub fn save(&self, path: &Path) -> Result<(), LitragError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        tmp.persist(path).map_err(|e| LitragError::Io(e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LitragError> {
        let corpus: Corpus = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if let Some(bad) = corpus.chunks.iter().find(|c| c.paper >= corpus.papers.len()) {
            return Err(LitragError::Pipeline(format!(
                "corpus chunk refers to paper {} but only {} papers are stored",
                bad.paper,
                corpus.papers.len()
            )));
        }
        Ok(corpus)
    }
}
