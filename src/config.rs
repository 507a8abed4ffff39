//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/nchunk.sqlite"
//!
//! [chunking]
//! model_family = "gpt"
//! safe_token_budget = 6000
//! overlap_words = 50
//!
//! [processing]
//! max_parallel = 5
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! ```
//!
//! Every section except `[db]` is optional. Validation happens in
//! [`load_config`] after parsing.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use narrative_chunker_core::recombine::CoherencePolicy;
use narrative_chunker_core::token::{ModelFamily, TokenEstimator};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub recombine: RecombineConfig,
    #[serde(default)]
    pub summarize: SummarizeConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Defaults for commands that run without a config file (`nchunk split`).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/nchunk.sqlite"),
            },
            chunking: ChunkingConfig::default(),
            processing: ProcessingConfig::default(),
            recombine: RecombineConfig::default(),
            summarize: SummarizeConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// `"gpt"` or `"claude"`.
    #[serde(default = "default_model_family")]
    pub model_family: String,
    /// Overrides the family's ratio when set.
    #[serde(default)]
    pub tokens_per_char: Option<f64>,
    #[serde(default = "default_safe_token_budget")]
    pub safe_token_budget: usize,
    #[serde(default = "default_overlap_words")]
    pub overlap_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            model_family: default_model_family(),
            tokens_per_char: None,
            safe_token_budget: default_safe_token_budget(),
            overlap_words: default_overlap_words(),
        }
    }
}

impl ChunkingConfig {
    pub fn estimator(&self) -> TokenEstimator {
        match self.tokens_per_char {
            Some(ratio) => TokenEstimator::with_ratio(ratio),
            None => TokenEstimator::new(
                ModelFamily::from_name(&self.model_family).unwrap_or_default(),
            ),
        }
    }
}

fn default_model_family() -> String {
    "gpt".to_string()
}
fn default_safe_token_budget() -> usize {
    6000
}
fn default_overlap_words() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// 0 disables the transform cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            batch_delay_ms: default_batch_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_max_parallel() -> usize {
    5
}
fn default_batch_delay_ms() -> u64 {
    500
}
fn default_call_timeout_secs() -> u64 {
    120
}
fn default_cache_capacity() -> usize {
    256
}

/// Coherence heuristic tuning. These values are placeholders, not
/// calibrated measurements.
#[derive(Debug, Deserialize, Clone)]
pub struct RecombineConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default)]
    pub connectives: Option<Vec<String>>,
    #[serde(default = "default_smooth_score")]
    pub smooth_score: f64,
    #[serde(default = "default_default_score")]
    pub default_score: f64,
    #[serde(default = "default_abrupt_score")]
    pub abrupt_score: f64,
}

impl Default for RecombineConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            connectives: None,
            smooth_score: default_smooth_score(),
            default_score: default_default_score(),
            abrupt_score: default_abrupt_score(),
        }
    }
}

impl RecombineConfig {
    pub fn policy(&self) -> CoherencePolicy {
        let defaults = CoherencePolicy::default();
        CoherencePolicy {
            window_chars: self.window_chars,
            connectives: self
                .connectives
                .clone()
                .unwrap_or(defaults.connectives),
            smooth_score: self.smooth_score,
            default_score: self.default_score,
            abrupt_score: self.abrupt_score,
        }
    }
}

fn default_window_chars() -> usize {
    100
}
fn default_smooth_score() -> f64 {
    0.95
}
fn default_default_score() -> f64 {
    0.8
}
fn default_abrupt_score() -> f64 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizeConfig {
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_max_group_tokens")]
    pub max_group_tokens: usize,
    #[serde(default = "default_max_levels")]
    pub max_levels: u32,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            max_group_tokens: default_max_group_tokens(),
            max_levels: default_max_levels(),
        }
    }
}

fn default_group_size() -> usize {
    3
}
fn default_max_group_tokens() -> usize {
    4000
}
fn default_max_levels() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `disabled`, `openai`, `ollama` or `echo`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible gateway or Ollama host).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_temperature() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.safe_token_budget == 0 {
        bail!("chunking.safe_token_budget must be > 0");
    }
    if let Some(ratio) = config.chunking.tokens_per_char {
        if !(ratio > 0.0 && ratio <= 10.0) {
            bail!("chunking.tokens_per_char must be in (0, 10]");
        }
    }
    if ModelFamily::from_name(&config.chunking.model_family).is_none() {
        bail!(
            "Unknown chunking.model_family: '{}'. Must be gpt or claude.",
            config.chunking.model_family
        );
    }

    // Validate processing
    if config.processing.max_parallel == 0 {
        bail!("processing.max_parallel must be >= 1");
    }
    if config.processing.call_timeout_secs == 0 {
        bail!("processing.call_timeout_secs must be > 0");
    }

    // Validate recombine
    let r = &config.recombine;
    for (name, score) in [
        ("smooth_score", r.smooth_score),
        ("default_score", r.default_score),
        ("abrupt_score", r.abrupt_score),
    ] {
        if !(0.0..=1.0).contains(&score) {
            bail!("recombine.{} must be in [0.0, 1.0]", name);
        }
    }

    // Validate summarize
    if config.summarize.group_size == 0 {
        bail!("summarize.group_size must be >= 1");
    }
    if config.summarize.max_group_tokens == 0 {
        bail!("summarize.max_group_tokens must be > 0");
    }
    if config.summarize.max_levels == 0 {
        bail!("summarize.max_levels must be >= 1");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "echo" => {}
        "openai" | "ollama" => {
            if config.llm.model.is_none() {
                bail!(
                    "llm.model must be specified when provider is '{}'",
                    config.llm.provider
                );
            }
        }
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, ollama, or echo.",
            other
        ),
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    Ok(())
}
