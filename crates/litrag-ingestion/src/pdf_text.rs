//! Plain-text extraction from downloaded PDFs.

use std::path::{Path, PathBuf};

use litrag_common::LitragError;
use tracing::{debug, error};

/// Extract all page text from a PDF file.
pub fn extract_text_blocking(pdf_path: &Path) -> Result<String, LitragError> {
    pdf_extract::extract_text(pdf_path).map_err(|e| {
        LitragError::Pipeline(format!("PDF text extraction failed for {}: {}", pdf_path.display(), e))
    })
}

/// Extract text off the async runtime. Unreadable PDFs (including ones that
/// make the extractor panic) yield an empty string so the caller skips them.
pub async fn extract_text_from_pdf(pdf_path: &Path) -> String {
    let path: PathBuf = pdf_path.to_path_buf();
    match tokio::task::spawn_blocking(move || extract_text_blocking(&path)).await {
        Ok(Ok(text)) => {
            debug!(path = %pdf_path.display(), chars = text.len(), "Extracted PDF text");
            text
        }
        Ok(Err(e)) => {
            error!(error = %e, "Error extracting text from PDF");
            String::new()
        }
        Err(e) => {
            error!(path = %pdf_path.display(), error = %e, "PDF extraction task aborted");
            String::new()
        }
    }
}
