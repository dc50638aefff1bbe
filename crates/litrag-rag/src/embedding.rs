//! Embedding client: calls the configured embedding backend to turn chunk
//! and question text into vectors.
//!
//! Supports multiple backends:
//!   - OpenAI         (text-embedding-3-small / text-embedding-3-large)
//!   - OpenAI-compat  (any /v1/embeddings endpoint: text-embeddings-inference, vLLM, LM Studio)
//!   - Ollama         (bge-large, nomic-embed-text or any ollama embedding model)

use std::sync::OnceLock;

use async_trait::async_trait;
use litrag_common::http::{build_client, DEFAULT_TIMEOUT};
use litrag_common::LitragError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("malformed embedding response: {0}")]
    Shape(String),
}

/// Text-to-vector model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Vector dimension, once known.
    fn dimension(&self) -> Option<usize>;
}

// ── Backend config ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    Ollama,
}

fn default_backend() -> EmbeddingBackend { EmbeddingBackend::OpenAiCompatible }
fn default_model() -> String { "BAAI/bge-large-en-v1.5".to_string() }
fn default_batch_size() -> usize { 8 }
fn default_normalize() -> bool { true }

/// `[embedding]` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_backend")]
    pub backend: EmbeddingBackend,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// L2-normalise every vector before returning it.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model: default_model(),
            base_url: None,
            api_key: None,
            batch_size: default_batch_size(),
            normalize: default_normalize(),
        }
    }
}

impl EmbeddingConfig {
    fn base_url(&self) -> String {
        let default = match self.backend {
            EmbeddingBackend::OpenAi => "https://api.openai.com",
            EmbeddingBackend::OpenAiCompatible => "http://localhost:8080",
            EmbeddingBackend::Ollama => "http://localhost:11434",
        };
        self.base_url.as_deref().unwrap_or(default).trim_end_matches('/').to_string()
    }
}

// ── Embedding client ──────────────────────────────────────────────────────────

pub struct EmbeddingClient {
    cfg: EmbeddingConfig,
    client: Client,
    dim: OnceLock<usize>,
}

impl EmbeddingClient {
    pub fn new(cfg: EmbeddingConfig) -> Result<Self, LitragError> {
        Ok(Self { cfg, client: build_client(DEFAULT_TIMEOUT)?, dim: OnceLock::new() })
    }

    /// Embed one backend batch.
    #[instrument(skip(self, texts), fields(n = texts.len(), backend = ?self.cfg.backend))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        match self.cfg.backend {
            EmbeddingBackend::OpenAi | EmbeddingBackend::OpenAiCompatible => self.embed_openai(texts).await,
            EmbeddingBackend::Ollama => self.embed_ollama(texts).await,
        }
    }

    // ── OpenAI / OpenAI-compatible ─────────────────────────────────────────

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/v1/embeddings", self.cfg.base_url());
        let body = serde_json::json!({
            "model": &self.cfg.model,
            "input": texts,
        });
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref k) = self.cfg.api_key {
            req = req.bearer_auth(k);
        }
        let json = check_response_status(req.send().await?).await?;
        parse_openai_embeddings(&json)
    }

    // ── Ollama ─────────────────────────────────────────────────────────────

    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/api/embeddings", self.cfg.base_url());
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let body = serde_json::json!({"model": &self.cfg.model, "prompt": text});
            let json = check_response_status(self.client.post(&url).json(&body).send().await?).await?;
            out.push(parse_vector(&json["embedding"])?);
        }
        Ok(out)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.cfg.batch_size.max(1)) {
            let vectors = self.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(EmbedError::Shape(format!(
                    "{} texts produced {} vectors",
                    batch.len(),
                    vectors.len()
                )));
            }
            for mut v in vectors {
                let expected = *self.dim.get_or_init(|| v.len());
                if v.len() != expected || expected == 0 {
                    return Err(EmbedError::Shape(format!(
                        "vector of dimension {} from a {}-d model",
                        v.len(),
                        expected
                    )));
                }
                if self.cfg.normalize {
                    l2_normalize(&mut v);
                }
                out.push(v);
            }
            debug!(done = out.len(), total = texts.len(), "Embedded batch");
        }

        Ok(out)
    }

    fn dimension(&self) -> Option<usize> {
        self.dim.get().copied()
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, EmbedError> {
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["error"].as_str())
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(EmbedError::ApiError { status, message: msg });
    }
    Ok(body)
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    value
        .as_array()
        .ok_or_else(|| EmbedError::Shape("embedding is not an array".into()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|x| x as f32)
                .ok_or_else(|| EmbedError::Shape("non-numeric embedding component".into()))
        })
        .collect()
}

/// Vectors from an OpenAI-style `{"data": [{"index": i, "embedding": [...]}]}` body,
/// in input order.
fn parse_openai_embeddings(resp: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let data = resp["data"]
        .as_array()
        .ok_or_else(|| EmbedError::Shape("response has no data array".into()))?;
    let mut items: Vec<(u64, Vec<f32>)> = data
        .iter()
        .enumerate()
        .map(|(i, item)| -> Result<(u64, Vec<f32>), EmbedError> {
            Ok((item["index"].as_u64().unwrap_or(i as u64), parse_vector(&item["embedding"])?))
        })
        .collect::<Result<_, _>>()?;
    items.sort_by_key(|(i, _)| *i);
    Ok(items.into_iter().map(|(_, v)| v).collect())
}

/// Scale a vector to unit length; zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_parse_openai_embeddings_sorts_by_index() {
        let json = serde_json::json!({"data": [
            {"index": 1, "embedding": [0.0, 2.0]},
            {"index": 0, "embedding": [1.0, 0.0]}
        ]});
        let v = parse_openai_embeddings(&json).unwrap();
        assert_eq!(v, vec![vec![1.0, 0.0], vec![0.0, 2.0]]);
        assert!(parse_openai_embeddings(&serde_json::json!({"error": "x"})).is_err());
    }

    async fn spawn_embedding_server(batches: Arc<Mutex<Vec<usize>>>) -> String {
        let app = Router::new().route(
            "/v1/embeddings",
            post(move |Json(body): Json<serde_json::Value>| {
                let batches = batches.clone();
                async move {
                    let inputs = body["input"].as_array().cloned().unwrap_or_default();
                    batches.lock().unwrap().push(inputs.len());
                    let data: Vec<_> = inputs
                        .iter()
                        .enumerate()
                        .map(|(i, text)| {
                            let len = text.as_str().unwrap_or("").len() as f32;
                            serde_json::json!({"index": i, "embedding": [len, 0.0, len]})
                        })
                        .collect();
                    Json(serde_json::json!({ "data": data }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_client_batches_and_normalizes() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_embedding_server(batches.clone()).await;
        let client = EmbeddingClient::new(EmbeddingConfig {
            base_url: Some(base),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        assert_eq!(client.dimension(), None);

        let texts: Vec<String> = (0..10).map(|i| "x".repeat(i + 1)).collect();
        let vectors = client.encode(&texts).await.unwrap();

        assert_eq!(vectors.len(), 10);
        assert_eq!(*batches.lock().unwrap(), vec![8, 2]);
        assert_eq!(client.dimension(), Some(3));
        let norm: f32 = vectors[4].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"error": {"message": "bad key"}})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = EmbeddingClient::new(EmbeddingConfig {
            base_url: Some(format!("http://{}", addr)),
            ..EmbeddingConfig::default()
        })
        .unwrap();
        let err = client.encode(&["q".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbedError::ApiError { status: 401, ref message } if message == "bad key"));
    }
}
