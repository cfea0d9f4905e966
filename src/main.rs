use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use nsr_search::api;
use nsr_search::config::Config;
use nsr_search::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {:?}", config.data_dir);
    tracing::info!(
        "LLM provider: {} (chat: {}, embeddings: {})",
        config.llm.base_url,
        config.llm.chat_model,
        config.llm.embedding_model
    );

    let state = AppState::new(config.clone())?;
    tracing::info!(records = state.store.len(), "record store loaded");

    let app = Router::new()
        .route("/api/records", get(api::records::list_records))
        .route("/api/records", post(api::records::ingest))
        .route("/api/records/search", get(api::records::lexical_search))
        .route("/api/records/embed", post(api::records::embed_missing))
        .route("/api/search", post(api::search::search))
        .route("/api/chat", post(api::chat::chat))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
