use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Embedding vector dimension shared by the storage and query sides.
/// Stored record embeddings and query embeddings must both use this.
pub const EMBEDDING_DIM: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the record corpus is persisted
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration (embeddings + chat)
    pub llm: LlmConfig,
    /// Semantic Scholar configuration
    pub s2: S2Config,
    /// Embedding cache TTL
    pub embed_cache_ttl: Duration,
    /// Embedding cache capacity
    pub embed_cache_capacity: usize,
    /// Maximum concurrent chat turns
    pub max_concurrent_chats: usize,
    /// Wall-clock budget for one embedding-backfill invocation
    pub backfill_budget: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the OpenAI-compatible API
    pub base_url: String,
    /// Model name for chat completions
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    pub api_key: Option<String>,
    /// Embedding vector dimension requested from the provider
    pub embedding_dim: usize,
    /// Max tokens for chat completions
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S2Config {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:9100".to_string(),
            llm: LlmConfig::default(),
            s2: S2Config::default(),
            embed_cache_ttl: Duration::from_secs(30 * 60),
            embed_cache_capacity: 100,
            max_concurrent_chats: 3,
            backfill_budget: Duration::from_secs(25),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            api_key: None,
            embedding_dim: EMBEDDING_DIM,
            max_tokens: 2048,
        }
    }
}

impl Default for S2Config {
    fn default() -> Self {
        Self {
            base_url: "https://api.semanticscholar.org".to_string(),
            api_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("NSR_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("NSR_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("LLM_EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.llm.embedding_dim = d;
            }
        }
        if let Ok(url) = std::env::var("S2_BASE_URL") {
            config.s2.base_url = url;
        }
        if let Ok(key) = std::env::var("SEMANTIC_SCHOLAR_API_KEY") {
            config.s2.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("NSR_EMBED_CACHE_TTL_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.embed_cache_ttl = Duration::from_secs(v);
            }
        }
        if let Ok(val) = std::env::var("NSR_EMBED_CACHE_CAPACITY") {
            if let Ok(v) = val.parse() {
                config.embed_cache_capacity = v;
            }
        }
        if let Ok(val) = std::env::var("NSR_MAX_CONCURRENT_CHATS") {
            if let Ok(v) = val.parse() {
                config.max_concurrent_chats = v;
            }
        }
        if let Ok(val) = std::env::var("NSR_BACKFILL_BUDGET_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.backfill_budget = Duration::from_secs(v);
            }
        }

        config
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join("records.json")
    }
}
