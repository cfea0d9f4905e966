//! Client-side query orchestration.
//!
//! Decides the lexical vs. vector path, gates short queries before any
//! network call, keeps a small insertion-order result cache for instant
//! re-render on navigation-back, and exposes the chat stream as typed
//! frames with a per-session cancellation handle.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{normalize_query, BoundedCache};
use crate::llm::chat_stream::{sse_data, stream_lines, DONE_SENTINEL};
use crate::models::{ChatRequest, NsrRecord, SourcesBundle};

/// Minimum query length before a network search is issued.
pub const MIN_QUERY_LEN: usize = 3;
/// Identifier-only queries are precise enough to search from one character.
pub const MIN_IDENTIFIER_QUERY_LEN: usize = 1;
/// Client result cache capacity.
pub const RESULT_CACHE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Semantic,
    Keyword,
}

impl SearchMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
        }
    }
}

/// Client-observable metrics for one search round trip.
#[derive(Debug, Clone, Default)]
pub struct ClientMetrics {
    pub request_ms: u64,
    pub payload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub records: Vec<NsrRecord>,
    pub count: usize,
    pub metrics: ClientMetrics,
}

/// Result of asking the orchestrator to search.
#[derive(Debug, Clone)]
pub enum SearchState {
    /// Query below the minimum length — no network call was made.
    Idle,
    Results(SearchOutcome),
}

/// Transport seam between the orchestrator and the HTTP API, so tests can
/// observe exactly which calls are issued.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn semantic_search(&self, query: &str) -> anyhow::Result<Vec<NsrRecord>>;
    /// `query` keeps its `#` prefix so the server applies the
    /// identifier-only restriction.
    async fn lexical_search(&self, query: &str) -> anyhow::Result<Vec<NsrRecord>>;
    async fn chat(
        &self,
        request: &ChatRequest,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Bytes>>>;
}

pub struct QueryOrchestrator<T> {
    transport: T,
    result_cache: BoundedCache<SearchOutcome>,
}

impl<T: SearchTransport> QueryOrchestrator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            result_cache: BoundedCache::new(RESULT_CACHE_SIZE),
        }
    }

    /// Cached outcome for instant re-render. Placeholder data only — callers
    /// still issue a fresh [`search`](Self::search).
    pub fn placeholder(&self, query: &str, mode: SearchMode) -> Option<SearchOutcome> {
        self.result_cache.get(&cache_key(query, mode))
    }

    /// Dispatch one query. Below the minimum length this resolves to
    /// [`SearchState::Idle`] without touching the transport.
    pub async fn search(&self, query: &str, mode: SearchMode) -> anyhow::Result<SearchState> {
        let trimmed = query.trim();
        let identifier_only = trimmed.starts_with('#');
        let effective_len = if identifier_only {
            trimmed.trim_start_matches('#').trim().len()
        } else {
            trimmed.len()
        };
        let min_len = if identifier_only {
            MIN_IDENTIFIER_QUERY_LEN
        } else {
            MIN_QUERY_LEN
        };
        if effective_len < min_len {
            return Ok(SearchState::Idle);
        }

        let start = Instant::now();
        let records = if identifier_only || mode == SearchMode::Keyword {
            self.transport.lexical_search(trimmed).await?
        } else {
            self.transport.semantic_search(trimmed).await?
        };

        let payload_bytes = serde_json::to_vec(&records).map(|b| b.len()).unwrap_or(0);
        let outcome = SearchOutcome {
            count: records.len(),
            records,
            metrics: ClientMetrics {
                request_ms: start.elapsed().as_millis() as u64,
                payload_bytes,
            },
        };
        self.result_cache.put(&cache_key(trimmed, mode), outcome.clone());
        Ok(SearchState::Results(outcome))
    }
}

fn cache_key(query: &str, mode: SearchMode) -> String {
    let mode_key = if query.trim().starts_with('#') {
        "id"
    } else {
        mode.as_str()
    };
    format!("{mode_key}:{}", normalize_query(query))
}

// ─── Chat frames ─────────────────────────────────────────

/// Typed frames decoded from the chat event stream.
#[derive(Debug, Clone)]
pub enum ChatFrame {
    Sources(SourcesBundle),
    Delta(String),
    Done,
}

type FrameStream = Pin<Box<dyn Stream<Item = ChatFrame> + Send>>;

/// One chat session: at most one in-flight turn, with a cooperative abort
/// handle. Sending a new message cancels any still-streaming prior turn;
/// aborting stops consumption but leaves already-applied partial content to
/// the consumer (no rollback).
pub struct ChatSession<T> {
    transport: T,
    inflight: Mutex<Option<CancellationToken>>,
}

impl<T: SearchTransport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            inflight: Mutex::new(None),
        }
    }

    /// Cancel the in-flight turn, if any.
    pub fn abort(&self) {
        if let Some(token) = self.inflight.lock().take() {
            token.cancel();
        }
    }

    /// Send one turn and return its typed frame stream. Malformed chunks are
    /// skipped, not fatal; the stream ends at `Done` or on cancellation.
    pub async fn send(&self, request: &ChatRequest) -> anyhow::Result<FrameStream> {
        let token = CancellationToken::new();
        if let Some(prior) = self.inflight.lock().replace(token.clone()) {
            prior.cancel();
        }

        let bytes = self.transport.chat(request).await?;
        Ok(Box::pin(decode_frames(bytes).take_until(token.cancelled_owned())))
    }
}

/// Decode an SSE byte stream into typed chat frames, stopping after `Done`.
pub fn decode_frames(
    bytes: impl Stream<Item = anyhow::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = ChatFrame> + Send {
    let mut done = false;
    stream_lines(bytes)
        .filter_map(|line| async move {
            match line {
                Ok(line) => parse_frame(&line),
                Err(e) => {
                    tracing::warn!("chat stream read error: {e}");
                    None
                }
            }
        })
        .take_while(move |frame| {
            let keep = !done;
            done = matches!(frame, ChatFrame::Done);
            futures_util::future::ready(keep)
        })
}

#[derive(serde::Deserialize)]
struct SourcesEnvelope {
    sources: SourcesBundle,
}

fn parse_frame(line: &str) -> Option<ChatFrame> {
    let data = sse_data(line)?;
    if data == DONE_SENTINEL {
        return Some(ChatFrame::Done);
    }
    if let Ok(envelope) = serde_json::from_str::<SourcesEnvelope>(data) {
        return Some(ChatFrame::Sources(envelope.sources));
    }
    match crate::llm::chat_stream::parse_delta_line(line) {
        Some(Ok(content)) => Some(ChatFrame::Delta(content)),
        Some(Err(e)) => {
            // Malformed mid-stream chunk: skip and keep consuming.
            tracing::warn!("skipping malformed chat chunk: {e}");
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockTransport {
        semantic_calls: Arc<AtomicUsize>,
        lexical_calls: Arc<AtomicUsize>,
        records: Vec<NsrRecord>,
        chat_frames: Vec<&'static str>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                semantic_calls: Arc::new(AtomicUsize::new(0)),
                lexical_calls: Arc::new(AtomicUsize::new(0)),
                records: Vec::new(),
                chat_frames: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl SearchTransport for MockTransport {
        async fn semantic_search(&self, _query: &str) -> anyhow::Result<Vec<NsrRecord>> {
            self.semantic_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }

        async fn lexical_search(&self, _query: &str) -> anyhow::Result<Vec<NsrRecord>> {
            self.lexical_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }

        async fn chat(
            &self,
            _request: &ChatRequest,
        ) -> anyhow::Result<BoxStream<'static, anyhow::Result<Bytes>>> {
            let frames: Vec<anyhow::Result<Bytes>> = self
                .chat_frames
                .iter()
                .map(|f| Ok(Bytes::from(*f)))
                .collect();
            Ok(Box::pin(stream::iter(frames)))
        }
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            messages: vec![],
            user_message: "q".into(),
            system_context: None,
        }
    }

    // ─── Length gate & dispatch ──────────────────────────

    #[tokio::test]
    async fn test_short_query_stays_idle_without_network() {
        let transport = MockTransport::new();
        let semantic_calls = transport.semantic_calls.clone();
        let lexical_calls = transport.lexical_calls.clone();
        let orchestrator = QueryOrchestrator::new(transport);

        for q in ["", "ab", "  ab  "] {
            let state = orchestrator.search(q, SearchMode::Semantic).await.unwrap();
            assert!(matches!(state, SearchState::Idle));
        }
        assert_eq!(semantic_calls.load(Ordering::SeqCst), 0);
        assert_eq!(lexical_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_identifier_query_accepts_single_char() {
        let transport = MockTransport::new();
        let lexical_calls = transport.lexical_calls.clone();
        let orchestrator = QueryOrchestrator::new(transport);

        assert!(matches!(
            orchestrator.search("#", SearchMode::Semantic).await.unwrap(),
            SearchState::Idle
        ));
        assert!(matches!(
            orchestrator.search("#2", SearchMode::Semantic).await.unwrap(),
            SearchState::Results(_)
        ));
        assert_eq!(lexical_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mode_dispatch() {
        let transport = MockTransport::new();
        let semantic_calls = transport.semantic_calls.clone();
        let lexical_calls = transport.lexical_calls.clone();
        let orchestrator = QueryOrchestrator::new(transport);

        orchestrator
            .search("neutron capture", SearchMode::Semantic)
            .await
            .unwrap();
        orchestrator
            .search("neutron capture", SearchMode::Keyword)
            .await
            .unwrap();
        // Identifier prefix bypasses semantic even in semantic mode
        orchestrator
            .search("#2024SM01", SearchMode::Semantic)
            .await
            .unwrap();

        assert_eq!(semantic_calls.load(Ordering::SeqCst), 1);
        assert_eq!(lexical_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_result_cache_keyed_by_mode_and_query() {
        let orchestrator = QueryOrchestrator::new(MockTransport::new());
        orchestrator
            .search("Neutron Capture", SearchMode::Semantic)
            .await
            .unwrap();

        // Same query, different case/whitespace — same key
        assert!(orchestrator
            .placeholder(" neutron capture ", SearchMode::Semantic)
            .is_some());
        // Different mode — different key
        assert!(orchestrator
            .placeholder("neutron capture", SearchMode::Keyword)
            .is_none());
    }

    #[tokio::test]
    async fn test_result_cache_bounded() {
        let orchestrator = QueryOrchestrator::new(MockTransport::new());
        for i in 0..15 {
            orchestrator
                .search(&format!("query number {i}"), SearchMode::Semantic)
                .await
                .unwrap();
        }
        assert!(orchestrator
            .placeholder("query number 0", SearchMode::Semantic)
            .is_none());
        assert!(orchestrator
            .placeholder("query number 14", SearchMode::Semantic)
            .is_some());
    }

    // ─── Chat frame decoding ─────────────────────────────

    fn sources_line() -> &'static str {
        "data: {\"sources\":{\"nsr\":[{\"key_number\":\"2024SM01\",\"title\":\"t\",\"doi\":null,\"similarity\":0.9}],\"s2\":[]}}\n\n"
    }

    #[tokio::test]
    async fn test_sources_frame_precedes_deltas() {
        let mut transport = MockTransport::new();
        transport.chat_frames = vec![
            sources_line(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let session = ChatSession::new(transport);
        let frames: Vec<ChatFrame> = session.send(&chat_request()).await.unwrap().collect().await;

        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], ChatFrame::Sources(_)));
        assert!(matches!(&frames[1], ChatFrame::Delta(d) if d == "Hello"));
        assert!(matches!(frames[2], ChatFrame::Done));
    }

    #[tokio::test]
    async fn test_malformed_chunk_skipped_not_fatal() {
        let mut transport = MockTransport::new();
        transport.chat_frames = vec![
            sources_line(),
            "data: {broken json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let session = ChatSession::new(transport);
        let frames: Vec<ChatFrame> = session.send(&chat_request()).await.unwrap().collect().await;

        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[1], ChatFrame::Delta(d) if d == "after"));
    }

    #[tokio::test]
    async fn test_abort_stops_consumption_keeps_partial_content() {
        let mut transport = MockTransport::new();
        transport.chat_frames = vec![
            sources_line(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let session = ChatSession::new(transport);
        let mut stream = session.send(&chat_request()).await.unwrap();

        let mut content = String::new();
        // Consume sources + one delta, then abort mid-stream
        for _ in 0..2 {
            if let Some(ChatFrame::Delta(d)) = stream.next().await {
                content.push_str(&d);
            }
        }
        session.abort();

        // Remaining frames stop arriving; no panic, partial content intact
        while let Some(frame) = stream.next().await {
            if let ChatFrame::Delta(d) = frame {
                content.push_str(&d);
            }
        }
        assert_eq!(content, "partial ");
    }

    #[tokio::test]
    async fn test_new_send_cancels_prior_turn() {
        let mut transport = MockTransport::new();
        transport.chat_frames = vec![sources_line(), "data: [DONE]\n\n"];
        let session = ChatSession::new(transport);

        let mut first = session.send(&chat_request()).await.unwrap();
        let _second = session.send(&chat_request()).await.unwrap();

        // The first stream was cancelled; it terminates without reaching Done
        let mut saw_done = false;
        while let Some(frame) = first.next().await {
            saw_done = matches!(frame, ChatFrame::Done);
        }
        assert!(!saw_done);
    }
}
