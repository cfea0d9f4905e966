use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Instant;

use crate::cache::normalize_query;
use crate::error::ApiError;
use crate::models::{NsrRecord, SearchRequest, SearchTimings, TimedSearchResponse};
use crate::state::AppState;

/// POST /api/search — vector/hybrid search endpoint.
///
/// Pipeline: embedding cache → provider embed on miss → hybrid search with
/// lexical pre-filter → legacy pure-vector fallback if the hybrid path
/// errors. Returns a bare record array, or `{ records, timings }` when
/// `include_timing` is set.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Response, ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query is required".to_string()));
    }

    let total_start = Instant::now();

    // ── Embed (cache first) ───────────────────────────────
    let normalized = normalize_query(&query);
    let embed_start = Instant::now();
    let (query_embedding, cache_hit) = match state.embed_cache.get(&normalized) {
        Some(embedding) => (embedding, true),
        None => {
            let embedding = crate::llm::embeddings::embed_single(
                &state.http_client,
                &state.config.llm,
                &query,
            )
            .await?;
            state.embed_cache.put(&normalized, embedding.clone());
            (embedding, false)
        }
    };
    let embedding_ms = embed_start.elapsed().as_millis() as u64;

    // ── Retrieve (hybrid, falling back to legacy) ─────────
    let rpc_start = Instant::now();
    let (records, hybrid_used) = run_search_with_fallback(&state, &query_embedding, &query, &req);
    let rpc_ms = rpc_start.elapsed().as_millis() as u64;

    tracing::info!(
        count = records.len(),
        cache_hit,
        hybrid_used,
        "search completed"
    );

    if !req.include_timing {
        return Ok(Json(records).into_response());
    }

    let timings = SearchTimings {
        embedding_ms,
        embedding_cache_hit: u8::from(cache_hit),
        rpc_ms,
        db_execution_ms: hybrid_used.then_some(rpc_ms),
        edge_total_ms: total_start.elapsed().as_millis() as u64,
    };
    Ok(Json(TimedSearchResponse { records, timings }).into_response())
}

/// Hybrid first; a hybrid failure degrades to the legacy pure-vector path
/// rather than surfacing. Returns the records and whether the hybrid path
/// served them.
fn run_search_with_fallback(
    state: &AppState,
    query_embedding: &[f32],
    query_text: &str,
    req: &SearchRequest,
) -> (Vec<NsrRecord>, bool) {
    match state.store.hybrid_search(
        query_embedding,
        query_text,
        req.match_threshold,
        req.match_count,
        req.prefilter_count,
        req.filter_year,
    ) {
        Ok(records) => (records, true),
        Err(e) => {
            tracing::warn!("hybrid search failed, falling back to pure-vector: {e}");
            let records = state.store.vector_search(
                query_embedding,
                req.match_threshold,
                req.match_count,
                req.filter_year,
            );
            (records, false)
        }
    }
}
