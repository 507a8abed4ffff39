//! Embedding providers for summary nodes.
//!
//! [`HttpEmbedder`] implements [`Embedder`] for:
//! - **`openai`**: `POST {url}/embeddings` (default `https://api.openai.com/v1`).
//! - **`ollama`**: `POST {url}/api/embed` (default `http://localhost:11434`).
//! - **`disabled`**: every call fails.
//!
//! Inputs are sent in batches of `embedding.batch_size`; each batch uses the
//! same retry policy as the LLM client. Returned vectors are checked
//! against `embedding.dims`.
//!
//! ```rust,no_run
//! # use narrative_chunker::config::EmbeddingConfig;
//! # use narrative_chunker::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert!(embedder.is_none());
//! ```

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use narrative_chunker_core::embedding::check_dims;
use narrative_chunker_core::traits::Embedder;

use crate::config::EmbeddingConfig;
use crate::llm::post_json_with_retry;

pub struct HttpEmbedder {
    config: EmbeddingConfig,
    model: String,
    dims: usize,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match config.provider.as_str() {
            "openai" => Some(
                std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?,
            ),
            "ollama" | "disabled" => None,
            other => bail!("Unknown embedding provider: {}", other),
        };
        let model = match config.provider.as_str() {
            "disabled" => "disabled".to_string(),
            provider => config
                .model
                .clone()
                .ok_or_else(|| anyhow!("embedding.model required for {} provider", provider))?,
        };
        let dims = match config.provider.as_str() {
            "disabled" => 0,
            provider => config
                .dims
                .ok_or_else(|| anyhow!("embedding.dims required for {} provider", provider))?,
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            model,
            dims,
            http,
            api_key,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });
        let vectors = match self.config.provider.as_str() {
            "openai" => {
                let url = self.config.url.as_deref().unwrap_or("https://api.openai.com/v1");
                let json = post_json_with_retry(
                    &self.http,
                    &format!("{}/embeddings", url.trim_end_matches('/')),
                    self.api_key.as_deref(),
                    &body,
                    self.config.max_retries,
                    "OpenAI",
                )
                .await?;
                parse_openai_response(&json)?
            }
            "ollama" => {
                let url = self.config.url.as_deref().unwrap_or("http://localhost:11434");
                let json = post_json_with_retry(
                    &self.http,
                    &format!("{}/api/embed", url.trim_end_matches('/')),
                    None,
                    &body,
                    self.config.max_retries,
                    "Ollama",
                )
                .await?;
                parse_ollama_response(&json)?
            }
            "disabled" => bail!("Embedding provider is disabled"),
            other => bail!("Unknown embedding provider: {}", other),
        };

        if vectors.len() != texts.len() {
            bail!(
                "embedding count mismatch: sent {}, received {}",
                texts.len(),
                vectors.len()
            );
        }
        for v in &vectors {
            check_dims(v, self.dims)?;
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

/// `None` when embeddings are disabled.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Option<HttpEmbedder>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    Ok(Some(HttpEmbedder::new(config)?))
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32_vec(embedding)));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| {
            e.as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = json!({
            "data": [
                { "index": 1, "embedding": [0.5, 0.5] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
        assert!(parse_openai_response(&json!({})).is_err());
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = json!({ "embeddings": [[0.25, -1.0], [2.0, 0.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors[0], vec![0.25, -1.0]);
        assert!(parse_ollama_response(&json!({ "embeddings": [1.0] })).is_err());
    }

    #[test]
    fn test_disabled_config_creates_nothing() {
        assert!(create_embedder(&EmbeddingConfig::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_embedder_errors() {
        let embedder = HttpEmbedder::new(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
        let err = embedder.embed(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_ollama_requires_dims() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(HttpEmbedder::new(&config).is_err());
    }
}
