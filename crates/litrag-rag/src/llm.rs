//! Text generation backends.
//!
//! Backends:
//!   OllamaBackend           local Ollama, `/api/generate`
//!   OpenAiBackend           OpenAI chat completions (gpt-4o, gpt-4o-mini, …)
//!   OpenAiCompatibleBackend raw-prompt `/v1/completions` on vLLM, TGI,
//!                           llama.cpp server, LM Studio, …

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use litrag_common::http::build_client;
use litrag_common::LitragError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use litrag_ingestion::chunker::TOKENS_PER_WORD;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Backend returned no text")]
    EmptyResponse,
}

// ── Request parameters ────────────────────────────────────────────────────────

fn default_max_new_tokens() -> u32 { 512 }
fn default_temperature() -> f32 { 0.7 }
fn default_top_p() -> f32 { 0.9 }
fn default_do_sample() -> bool { true }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Greedy decoding when false.
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            do_sample: default_do_sample(),
        }
    }
}

impl GenerationParams {
    /// `(temperature, top_p)` as sent to the backend.
    fn sampling(&self) -> (f32, f32) {
        if self.do_sample {
            (self.temperature, self.top_p)
        } else {
            (0.0, 1.0)
        }
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;
    fn model_id(&self) -> &str;

    /// Estimated-token cap the backend applies to prompts, if any.
    fn max_input_tokens(&self) -> Option<usize> {
        None
    }
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmBackendKind {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

fn default_backend() -> LlmBackendKind { LlmBackendKind::OpenAiCompatible }
fn default_model() -> String { "mistralai/Mistral-7B-Instruct-v0.1".to_string() }
fn default_max_input_tokens() -> usize { 2048 }
fn default_timeout_secs() -> u64 { 120 }

/// `[llm]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_backend")]
    pub backend: LlmBackendKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Prompts longer than this (estimated) are cut from the end.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub generation: GenerationParams,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            base_url: None,
            api_key: None,
            max_input_tokens: default_max_input_tokens(),
            timeout_secs: default_timeout_secs(),
            generation: GenerationParams::default(),
        }
    }
}

/// Instantiate the configured backend.
pub fn build_generator(cfg: &LlmConfig) -> Result<Arc<dyn Generator>, LitragError> {
    let client = build_client(Duration::from_secs(cfg.timeout_secs))?;
    let base = |default: &str| {
        cfg.base_url.as_deref().unwrap_or(default).trim_end_matches('/').to_string()
    };
    let backend: Arc<dyn Generator> = match cfg.backend {
        LlmBackendKind::Ollama => Arc::new(OllamaBackend {
            base_url: base("http://localhost:11434"),
            model: cfg.model.clone(),
            max_input_tokens: cfg.max_input_tokens,
            client,
        }),
        LlmBackendKind::OpenAi => Arc::new(OpenAiBackend {
            base_url: base("https://api.openai.com"),
            api_key: cfg.api_key.clone().unwrap_or_default(),
            model: cfg.model.clone(),
            max_input_tokens: cfg.max_input_tokens,
            client,
        }),
        LlmBackendKind::OpenAiCompatible => Arc::new(OpenAiCompatibleBackend {
            base_url: base("http://localhost:8000"),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_input_tokens: cfg.max_input_tokens,
            client,
        }),
    };
    Ok(backend)
}

/// Whole words that fit in `max_tokens` estimated tokens.
pub fn word_limit(max_tokens: usize) -> usize {
    (max_tokens as f64 / TOKENS_PER_WORD).floor() as usize
}

/// Keep the leading words of `prompt` that fit `max_tokens`, preserving its
/// original whitespace.
pub fn truncate_prompt(prompt: &str, max_tokens: usize) -> &str {
    truncate_words(prompt, word_limit(max_tokens))
}

/// The first `max_words` words of `text`, whitespace between them untouched.
pub fn truncate_words(text: &str, max_words: usize) -> &str {
    let mut words = 0;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            words += 1;
            if words > max_words {
                return text[..i].trim_end();
            }
        }
    }
    text
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["error"].as_str())
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(body)
}

fn non_empty(text: Option<&str>) -> Result<String, LlmError> {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(LlmError::EmptyResponse),
    }
}

// ── 1. Ollama (local) ─────────────────────────────────────────────────────────

pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub max_input_tokens: usize,
    client: reqwest::Client,
}

#[async_trait]
impl Generator for OllamaBackend {
    #[instrument(skip(self, prompt, params), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let (temperature, top_p) = params.sampling();
        let body = serde_json::json!({
            "model":  &self.model,
            "prompt": truncate_prompt(prompt, self.max_input_tokens),
            "stream": false,
            "options": {
                "num_predict": params.max_new_tokens,
                "temperature": temperature,
                "top_p":       top_p,
            },
        });
        let url = format!("{}/api/generate", self.base_url);
        let json = check_response_status(self.client.post(&url).json(&body).send().await?).await?;
        debug!(done = ?json["done"], "Ollama generation finished");
        non_empty(json["response"].as_str())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_input_tokens(&self) -> Option<usize> {
        Some(self.max_input_tokens)
    }
}

// ── 2. OpenAI ─────────────────────────────────────────────────────────────────

pub struct OpenAiBackend {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_input_tokens: usize,
    client: reqwest::Client,
}

#[async_trait]
impl Generator for OpenAiBackend {
    #[instrument(skip(self, prompt, params), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let (temperature, top_p) = params.sampling();
        let body = serde_json::json!({
            "model":       &self.model,
            "messages":    [{"role": "user", "content": truncate_prompt(prompt, self.max_input_tokens)}],
            "max_tokens":  params.max_new_tokens,
            "temperature": temperature,
            "top_p":       top_p,
        });
        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self.client.post(&url).bearer_auth(&self.api_key).json(&body).send().await?;
        let json = check_response_status(resp).await?;
        non_empty(json["choices"][0]["message"]["content"].as_str())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_input_tokens(&self) -> Option<usize> {
        Some(self.max_input_tokens)
    }
}

// ── 3. OpenAI-compatible completions ──────────────────────────────────────────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_input_tokens: usize,
    client: reqwest::Client,
}

#[async_trait]
impl Generator for OpenAiCompatibleBackend {
    #[instrument(skip(self, prompt, params), fields(model = %self.model))]
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let (temperature, top_p) = params.sampling();
        let body = serde_json::json!({
            "model":       &self.model,
            "prompt":      truncate_prompt(prompt, self.max_input_tokens),
            "max_tokens":  params.max_new_tokens,
            "temperature": temperature,
            "top_p":       top_p,
        });
        let url = format!("{}/v1/completions", self.base_url);
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref k) = self.api_key {
            req = req.bearer_auth(k);
        }
        let json = check_response_status(req.send().await?).await?;
        non_empty(json["choices"][0]["text"].as_str())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn max_input_tokens(&self) -> Option<usize> {
        Some(self.max_input_tokens)
    }
}
