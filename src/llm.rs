//! LLM providers for chunk transformation and summarization.
//!
//! [`LlmClient`] implements both [`Transformer`] and [`Summarizer`] and
//! dispatches on `llm.provider`:
//!
//! - **`openai`**: `POST {url}/chat/completions` (default url
//!   `https://api.openai.com/v1`), key from `OPENAI_API_KEY`.
//! - **`ollama`**: `POST {url}/api/chat` with `stream: false` (default url
//!   `http://localhost:11434`).
//! - **`echo`**: offline. Transform returns the chunk content unchanged;
//!   summarize returns a word-truncated prefix sized from the level's
//!   target ratio. Used by tests and dry runs.
//! - **`disabled`**: every call fails.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use narrative_chunker_core::models::{TransformOutput, TransformParams};
use narrative_chunker_core::summarize::GROUP_SEPARATOR;
use narrative_chunker_core::traits::{Summarizer, Transformer};

use crate::config::LlmConfig;
use crate::process::strip_context_prefix;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434";

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl LlmClient {
    /// Build a client for `config.provider`.
    ///
    /// # Errors
    ///
    /// Fails for an unknown provider, a missing `llm.model` on a remote
    /// provider, or a missing `OPENAI_API_KEY` for `openai`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = match config.provider.as_str() {
            "openai" => Some(
                std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?,
            ),
            "ollama" | "echo" | "disabled" => None,
            other => bail!("Unknown llm provider: {}", other),
        };
        if matches!(config.provider.as_str(), "openai" | "ollama") && config.model.is_none() {
            bail!("llm.model required for {} provider", config.provider);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            http,
            api_key,
        })
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        if self.config.provider == "disabled" {
            bail!("LLM provider is disabled");
        }
        let model = self
            .config
            .model
            .as_deref()
            .ok_or_else(|| anyhow!("llm.model required"))?;
        let messages = json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ]);

        match self.config.provider.as_str() {
            "openai" => {
                let url = self.config.url.as_deref().unwrap_or(OPENAI_URL);
                let body = json!({
                    "model": model,
                    "temperature": self.config.temperature,
                    "messages": messages,
                });
                let json = post_json_with_retry(
                    &self.http,
                    &format!("{}/chat/completions", url.trim_end_matches('/')),
                    self.api_key.as_deref(),
                    &body,
                    self.config.max_retries,
                    "OpenAI",
                )
                .await?;
                parse_openai_chat(&json)
            }
            "ollama" => {
                let url = self.config.url.as_deref().unwrap_or(OLLAMA_URL);
                let body = json!({
                    "model": model,
                    "stream": false,
                    "messages": messages,
                    "options": { "temperature": self.config.temperature },
                });
                let json = post_json_with_retry(
                    &self.http,
                    &format!("{}/api/chat", url.trim_end_matches('/')),
                    None,
                    &body,
                    self.config.max_retries,
                    "Ollama",
                )
                .await?;
                parse_ollama_chat(&json)
            }
            other => bail!("Unknown llm provider: {}", other),
        }
    }
}

#[async_trait]
impl Transformer for LlmClient {
    async fn transform(&self, input: &str, params: &TransformParams) -> Result<TransformOutput> {
        if self.config.provider == "echo" {
            return Ok(TransformOutput::text(strip_context_prefix(input)));
        }
        let text = self.chat(&transform_system_prompt(params), input).await?;
        Ok(TransformOutput {
            output_text: text,
            metadata: Some(json!({ "provider": self.config.provider, "model": self.config.model })),
        })
    }
}

#[async_trait]
impl Summarizer for LlmClient {
    async fn summarize(&self, combined_text: &str, instruction: &str) -> Result<String> {
        if self.config.provider == "echo" {
            return Ok(echo_summary(combined_text, instruction));
        }
        self.chat(instruction, combined_text).await
    }
}

/// System message for a transform call.
pub fn transform_system_prompt(params: &TransformParams) -> String {
    let persona = non_empty(&params.persona, "a careful literary editor");
    let namespace = non_empty(&params.namespace, "the original");
    let style = non_empty(&params.style, "faithful");
    format!(
        "You are {}. Rewrite the text you are given for {} setting in a {} style. \
         Keep every event and fact in its original order and return only the rewritten text. \
         Bracketed [Part], [Previous context] and [Following context] blocks are orientation \
         only; do not rewrite or repeat them.",
        persona, namespace, style
    )
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Offline summary: the first words of the input, sized by the percentage
/// stated in `instruction` (50% when none is found).
fn echo_summary(combined_text: &str, instruction: &str) -> String {
    let percent = instruction
        .split("about ")
        .nth(1)
        .and_then(|rest| rest.split('%').next())
        .and_then(|n| n.trim().parse::<f64>().ok())
        .unwrap_or(50.0);
    let words: Vec<&str> = combined_text
        .split(GROUP_SEPARATOR)
        .flat_map(|part| part.split_whitespace())
        .collect();
    let keep = ((words.len() as f64 * percent / 100.0).ceil() as usize).max(1);
    words[..keep.min(words.len())].join(" ")
}

/// POST `body` as JSON and return the parsed response, retrying transient
/// failures with exponential backoff.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
    max_retries: u32,
    label: &str,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, ?delay, "{} retry", label);
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                // Other client errors fail immediately
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

fn parse_openai_chat(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

fn parse_ollama_chat(json: &Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
}
