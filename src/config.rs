use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub intercept: InterceptConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub assist: AssistConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Client-side settings: where the companion servers live and who the
/// user is. `user_name` falls back to the mirrored page storage when unset.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_assist_url")]
    pub assist_url: String,
    #[serde(default = "default_search_url")]
    pub search_url: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            assist_url: default_assist_url(),
            search_url: default_search_url(),
            user_name: None,
        }
    }
}

fn default_assist_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_search_url() -> String {
    "http://localhost:8080".to_string()
}

/// Which intercepted response URLs carry problem payloads.
#[derive(Debug, Deserialize, Clone)]
pub struct InterceptConfig {
    #[serde(default = "default_url_patterns")]
    pub url_patterns: Vec<String>,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            url_patterns: default_url_patterns(),
        }
    }
}

fn default_url_patterns() -> Vec<String> {
    vec!["https://api2.maang.in/problems/user/*".to_string()]
}

/// Generative-language API settings used by the assist server.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 40,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistConfig {
    #[serde(default = "default_assist_bind")]
    pub bind: String,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            bind: default_assist_bind(),
        }
    }
}

fn default_assist_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_bind")]
    pub bind: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bind: default_search_bind(),
            top_k: default_top_k(),
        }
    }
}

fn default_search_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_top_k() -> usize {
    5
}

/// Problem-site crawl settings used by `pal index --fetch`.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerConfig {
    #[serde(default = "default_site_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_base_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_site_base_url() -> String {
    "https://api2.maang.in".to_string()
}
fn default_page_size() -> usize {
    200
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate intercept
    if config.intercept.url_patterns.is_empty() {
        anyhow::bail!("intercept.url_patterns must not be empty");
    }

    // Validate search
    if config.search.top_k < 1 {
        anyhow::bail!("search.top_k must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate indexer
    if config.indexer.page_size < 1 {
        anyhow::bail!("indexer.page_size must be >= 1");
    }

    Ok(config)
}
