//! litrag-rag: Retrieval-augmented question answering over a paper corpus.
//! - Embedding and generation backends behind narrow async traits
//! - Exact L2 vector index with binary persistence
//! - Per-paper, token-budgeted context assembly
//! - `ResearchAssistant`, which drives search → fetch → chunk → embed → index
//!   and question → retrieve → generate

pub mod embedding;
pub mod llm;
pub mod index;
pub mod corpus;
pub mod assembler;
pub mod prompts;
pub mod assistant;

pub use assistant::{Acquisition, Answer, AssistantError, AssistantSettings, Citation, ResearchAssistant};
pub use embedding::{Embedder, EmbeddingClient, EmbeddingConfig};
pub use index::{IndexError, SearchHit, VectorIndex};
pub use llm::{GenerationParams, Generator, LlmConfig};
