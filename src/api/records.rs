use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::time::Instant;

use crate::error::ApiError;
use crate::llm::embeddings::{embed_batch, EMBED_BATCH_SIZE};
use crate::models::{BackfillResponse, IngestRequest, IngestResponse, NsrRecord};
use crate::search::lexical::{LexicalQuery, DEFAULT_LEXICAL_LIMIT};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BrowseParams {
    #[serde(default = "default_browse_limit")]
    pub limit: usize,
}

fn default_browse_limit() -> usize {
    50
}

/// GET /api/records — latest records by key number.
pub async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<BrowseParams>,
) -> Json<Vec<NsrRecord>> {
    Json(state.store.recent(params.limit))
}

#[derive(Debug, Deserialize)]
pub struct LexicalParams {
    pub q: String,
    #[serde(default = "default_lexical_limit")]
    pub limit: usize,
}

fn default_lexical_limit() -> usize {
    DEFAULT_LEXICAL_LIMIT
}

/// GET /api/records/search — lexical substring search. A `#`-prefixed query
/// restricts matching to the key-number field.
pub async fn lexical_search(
    State(state): State<AppState>,
    Query(params): Query<LexicalParams>,
) -> Result<Json<Vec<NsrRecord>>, ApiError> {
    let query = LexicalQuery::parse(&params.q);
    if query.is_empty() {
        return Err(ApiError::BadRequest("q is required".to_string()));
    }
    Ok(Json(state.store.lexical_search(&query, params.limit)))
}

/// POST /api/records — bulk upsert keyed by key_number.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    if req.records.is_empty() {
        return Err(ApiError::BadRequest("records is required".to_string()));
    }
    let (inserted, updated) = state.store.upsert(req.records)?;
    tracing::info!(inserted, updated, "records ingested");
    Ok(Json(IngestResponse { inserted, updated }))
}

/// POST /api/records/embed — backfill embeddings for records missing one.
///
/// Embeds `title + keywords` in provider batches, stopping once the
/// wall-clock budget is exhausted so the invocation stays within
/// host-platform execution ceilings. A batch already in flight finishes;
/// no new batch starts past the deadline.
pub async fn embed_missing(
    State(state): State<AppState>,
) -> Result<Json<BackfillResponse>, ApiError> {
    let deadline = Instant::now() + state.config.backfill_budget;
    let mut embedded = 0usize;

    loop {
        if Instant::now() >= deadline {
            tracing::info!(embedded, "backfill budget exhausted, stopping");
            break;
        }

        let batch = state.store.missing_embeddings(EMBED_BATCH_SIZE);
        if batch.is_empty() {
            break;
        }

        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let embeddings =
            embed_batch(&state.http_client, &state.config.llm, &texts).await?;

        for ((key_number, _), embedding) in batch.iter().zip(embeddings) {
            state.store.set_embedding(key_number, embedding)?;
        }
        embedded += batch.len();
        tracing::info!(embedded, "backfill batch complete");
    }

    Ok(Json(BackfillResponse {
        embedded,
        remaining: state.store.missing_embedding_count(),
    }))
}
