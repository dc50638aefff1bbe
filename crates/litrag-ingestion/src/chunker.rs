//! Paragraph-aware text chunker.
//!
//! Paragraphs are packed greedily into chunks of at most `chunk_size` words.
//! Paragraphs far larger than a chunk are cut into overlapping word windows.

use lazy_static::lazy_static;
use litrag_common::LitragError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Rough tokens-per-word ratio for English scientific prose.
pub const TOKENS_PER_WORD: f64 = 1.3;

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n\s*\n").unwrap();
    static ref HORIZONTAL_WS: Regex = Regex::new(r"[ \t\u{00A0}\u{2009}\u{202F}]+").unwrap();
    static ref PAGE_NUMBER_LINE: Regex = Regex::new(r"^\d+$").unwrap();
}

fn default_chunk_size() -> usize { 500 }
fn default_overlap() -> usize { 50 }
fn default_min_chunk_words() -> usize { 50 }

/// `[chunking]` configuration section. Sizes are in words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_words")]
    pub min_chunk_words: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_words: default_min_chunk_words(),
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<(), LitragError> {
        if self.chunk_size == 0 {
            return Err(LitragError::Config("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(LitragError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size.saturating_sub(self.overlap).max(1)
    }

    /// Paragraphs above this many words are windowed instead of kept whole.
    fn window_threshold(&self) -> f64 {
        self.chunk_size as f64 * 1.5
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated model tokens for a piece of text.
pub fn estimate_tokens(text: &str) -> f64 {
    word_count(text) as f64 * TOKENS_PER_WORD
}

/// Normalise extracted PDF text: ASCII quotes, no page-number lines,
/// single spaces within lines, at most one blank line between paragraphs.
pub fn clean_text(text: &str) -> String {
    let normalised: String = text
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(normalised.len());
    let mut pending_blank = false;
    for line in normalised.lines() {
        let line = HORIZONTAL_WS.replace_all(line, " ");
        let line = line.trim();
        if PAGE_NUMBER_LINE.is_match(line) {
            continue;
        }
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        pending_blank = false;
    }
    out
}

/// Split text into ordered chunks of whole words.
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for paragraph in PARAGRAPH_BREAK.split(text) {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        if words.len() as f64 > config.window_threshold() {
            // A pending run too short to stand alone joins the paragraphs after the windows
            if current.len() >= config.min_chunk_words {
                flush(&mut current, &mut chunks, config.min_chunk_words);
            }
            for window in windows(&words, config) {
                chunks.push(window.join(" "));
            }
            continue;
        }

        if current.len() + words.len() <= config.chunk_size {
            current.extend(words);
        } else {
            flush(&mut current, &mut chunks, config.min_chunk_words);
            current = words;
        }
    }
    flush(&mut current, &mut chunks, config.min_chunk_words);

    chunks
}

fn flush(current: &mut Vec<&str>, chunks: &mut Vec<String>, min_words: usize) {
    if !current.is_empty() && current.len() >= min_words {
        chunks.push(current.join(" "));
    }
    current.clear();
}

/// Fixed-size overlapping windows that meet the minimum size.
fn windows<'a>(words: &'a [&'a str], config: &ChunkerConfig) -> impl Iterator<Item = &'a [&'a str]> {
    let size = config.chunk_size.max(1);
    let min = config.min_chunk_words;
    (0..words.len())
        .step_by(config.stride())
        .map(move |start| &words[start..(start + size).min(words.len())])
        .filter(move |w| w.len() >= min)
}
