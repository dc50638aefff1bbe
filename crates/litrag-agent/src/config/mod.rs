//! Configuration loading for litrag.
//! Reads litrag.toml from the path given on the command line, the LITRAG_CONFIG
//! env var, or the current directory; falls back to built-in defaults.

use std::path::{Path, PathBuf};

use litrag_ingestion::sources::pubmed::PubMedConfig;
use litrag_ingestion::{ChunkerConfig, FetcherConfig, ResolverConfig};
use litrag_rag::assembler::RetrievalConfig;
use litrag_rag::{EmbeddingConfig, LlmConfig};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "litrag.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub pubmed: PubMedConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub chunking: ChunkerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: default_output_dir() }
    }
}

fn default_output_dir() -> PathBuf { PathBuf::from("research_output") }


impl Config {
    /// Load configuration.
    /// An explicit path wins, then LITRAG_CONFIG, then ./litrag.toml; with none
    /// of those present the defaults are used. Secrets left out of the file are
    /// taken from the environment.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let requested = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("LITRAG_CONFIG").map(PathBuf::from));

        let mut config = match requested {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Config file not found: {}\n\
                         Copy litrag.example.toml to litrag.toml and edit it.",
                        path.display()
                    );
                }
                Self::from_file(&path)?
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Fill unset secrets from environment variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if self.resolver.unpaywall_email.is_none() {
            self.resolver.unpaywall_email = non_empty("UNPAYWALL_EMAIL");
        }
        if self.pubmed.api_key.is_none() {
            self.pubmed.api_key = non_empty("NCBI_API_KEY");
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = non_empty("LITRAG_LLM_API_KEY");
        }
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = non_empty("LITRAG_EMBEDDING_API_KEY");
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.chunking.validate()?;
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be greater than zero");
        }
        if !(self.retrieval.max_context_tokens > 0.0) {
            anyhow::bail!("retrieval.max_context_tokens must be positive");
        }
        if self.fetcher.max_attempts == 0 {
            anyhow::bail!("fetcher.max_attempts must be at least 1");
        }
        Ok(())
    }
}
