use std::sync::Arc;

use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::store::RecordStore;

/// Shared application state.
///
/// The embedding cache is the only mutable shared state besides the store;
/// both are constructed once here and passed by reference, never reached
/// through module-level globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<RecordStore>,
    pub embed_cache: Arc<EmbeddingCache>,
    pub http_client: reqwest::Client,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let store = RecordStore::open_or_create(&config.data_dir)?;
        let embed_cache =
            EmbeddingCache::new(config.embed_cache_ttl, config.embed_cache_capacity);
        let max_concurrent_chats = config.max_concurrent_chats;

        Ok(Self {
            config,
            store: Arc::new(store),
            embed_cache: Arc::new(embed_cache),
            http_client: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_chats)),
        })
    }
}
