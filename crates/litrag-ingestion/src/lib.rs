//! litrag-ingestion: Literature acquisition pipeline.
//! - Paper discovery and metadata parsing (PubMed E-utilities)
//! - Full-text PDF link resolution (PMC mirror, publisher templates, Unpaywall, DOI redirects)
//! - PDF download with retry/backoff and content validation
//! - PDF text extraction, cleaning and paragraph-aware chunking
//! - Output layout and metadata snapshots

pub mod sources;
pub mod models;
pub mod resolver;
pub mod landing_page;
pub mod retry;
pub mod fetcher;
pub mod pdf_text;
pub mod chunker;
pub mod layout;
pub mod scrape;

pub use models::{ArticleRecord, Author, CrossRef, JournalInfo, RawArticle};
pub use resolver::{LinkResolver, ResolverConfig};
pub use fetcher::{FetchError, FetcherConfig, PdfFetcher};
pub use chunker::{chunk_text, clean_text, ChunkerConfig};
