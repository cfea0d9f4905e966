use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};

use crate::error::ApiError;
use crate::external::s2;
use crate::llm::chat_stream::start_completion;
use crate::models::ChatRequest;
use crate::rag;
use crate::search::vector::{CHAT_MATCH_COUNT, CHAT_MATCH_THRESHOLD};
use crate::state::AppState;

const AUTHOR_RESULT_LIMIT: usize = 8;
const STRUCTURED_RESULT_LIMIT: usize = 10;

/// POST /api/chat — RAG chat endpoint streaming `text/event-stream`.
///
/// The first frame is always the `sources` payload; everything after is the
/// provider's own SSE framing passed through untouched, ending with its
/// `[DONE]` sentinel. Embedding and retrieval failures abort the turn;
/// external-literature failure degrades to an empty `s2` section.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let user_message = req.user_message.trim().to_string();
    if user_message.is_empty() {
        return Err(ApiError::BadRequest("userMessage is required".to_string()));
    }

    // Correlates the retrieval log lines of one turn with its stream
    let turn_id = uuid::Uuid::new_v4();

    let permit = state
        .chat_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::BadRequest("chat service shutting down".to_string()))?;

    // ── Structured signals from the raw message ───────────
    let nuclides = rag::extract_nuclides(&user_message);
    let reactions = rag::extract_reactions(&user_message);
    let author = rag::extract_author_query(&user_message);

    // ── Embed + external retrieval, jointly awaited ───────
    // The embedding is a required input; the external search fails soft.
    let (embedding, papers) = tokio::join!(
        crate::llm::embeddings::embed_single(&state.http_client, &state.config.llm, &user_message),
        s2::search_papers(
            &state.http_client,
            &state.config.s2,
            &user_message,
            s2::PAPER_LIMIT,
        ),
    );
    let query_embedding = embedding?;

    // ── Internal retrieval: structured + author + semantic ─
    let author_records = author
        .as_deref()
        .map(|name| state.store.author_search(name, AUTHOR_RESULT_LIMIT))
        .unwrap_or_default();
    let structured_records =
        state
            .store
            .structured_search(&nuclides, &reactions, STRUCTURED_RESULT_LIMIT);
    let semantic_records = state.store.vector_search(
        &query_embedding,
        CHAT_MATCH_THRESHOLD,
        CHAT_MATCH_COUNT,
        None,
    );

    // Exact matches (author, then structured) outrank semantic hits.
    let exact = rag::merge_records(author_records, structured_records);
    let records = rag::merge_records(exact, semantic_records);

    tracing::info!(
        %turn_id,
        nsr = records.len(),
        s2 = papers.len(),
        "chat grounding retrieved"
    );

    // ── Prompt + sources ──────────────────────────────────
    let sources = rag::build_sources(&records, &papers);
    let system_prompt =
        rag::build_system_prompt(req.system_context.as_deref(), &records, &papers);
    let messages = rag::build_messages(system_prompt, &req.messages, &user_message);

    // ── Stream: sources frame first, then raw pass-through ─
    let llm_stream = start_completion(&state.http_client, &state.config.llm, &messages)
        .await
        .map_err(|e| ApiError::Completion(e.to_string()))?;

    let sources_json = serde_json::to_string(&serde_json::json!({ "sources": sources }))
        .map_err(|e| ApiError::Internal(e.into()))?;
    let sources_frame = Bytes::from(format!("data: {sources_json}\n\n"));

    let body_stream = stream::once(async move { Ok(sources_frame) })
        .chain(llm_stream)
        .map(move |item| {
            // Hold the semaphore permit for the lifetime of the stream
            let _permit = &permit;
            item.map_err(axum::Error::new)
        });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::Internal(e.into()))
}
