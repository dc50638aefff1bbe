//! On-disk output layout.
//!
//! ```text
//! <root>/<database>/metadata/<query_folder>/metadata_<YYYYmmdd_HHMMSS>.json
//! <root>/<database>/pdf/<query_folder>/<title>.pdf
//! <root>/session/
//! ```

use std::path::{Path, PathBuf};

use chrono::Local;
use litrag_common::LitragError;
use tracing::info;

use crate::models::ArticleRecord;

const QUERY_FOLDER_MAX: usize = 20;
const PDF_NAME_MAX: usize = 100;

/// Directory name for a query: lowercased, spaces and slashes replaced, 20 chars max.
pub fn query_folder_name(query: &str) -> String {
    query
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .take(QUERY_FOLDER_MAX)
        .collect()
}

/// File name for a paper's PDF, derived from its title; falls back to the record id.
pub fn pdf_file_name(record: &ArticleRecord) -> String {
    let stem: String = record
        .title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .take(PDF_NAME_MAX)
        .collect();

    if stem.trim_matches('_').is_empty() {
        format!("{}.pdf", record.pubmed_id)
    } else {
        format!("{}.pdf", stem)
    }
}

#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create and return the directories for one query.
    pub fn query_dirs(&self, database: &str, query: &str) -> Result<QueryDirs, LitragError> {
        let folder = query_folder_name(query);
        let dirs = QueryDirs {
            metadata: self.root.join(database).join("metadata").join(&folder),
            pdf: self.root.join(database).join("pdf").join(&folder),
        };
        std::fs::create_dir_all(&dirs.metadata)?;
        std::fs::create_dir_all(&dirs.pdf)?;
        Ok(dirs)
    }

    /// Where the assistant keeps its corpus and index between invocations.
    pub fn session_dir(&self) -> PathBuf {
        self.root.join("session")
    }
}

#[derive(Debug, Clone)]
pub struct QueryDirs {
    pub metadata: PathBuf,
    pub pdf: PathBuf,
}

impl QueryDirs {
    pub fn pdf_path_for(&self, record: &ArticleRecord) -> PathBuf {
        self.pdf.join(pdf_file_name(record))
    }

    /// Write the records as a timestamped, pretty-printed JSON array.
    pub fn save_metadata_snapshot(&self, records: &[ArticleRecord]) -> Result<PathBuf, LitragError> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self.metadata.join(format!("metadata_{}.json", timestamp));
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), records = records.len(), "Saved metadata snapshot");
        Ok(path)
    }
}
