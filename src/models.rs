use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bibliographic NSR record as it appears on the wire.
///
/// `similarity` is present only on vector-search results and absent on plain
/// fetches. `key_number` is unique and never reassigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsrRecord {
    pub id: i64,
    pub key_number: String,
    pub pub_year: i32,
    pub reference: Option<String>,
    pub authors: Option<String>,
    pub title: String,
    pub doi: Option<String>,
    pub exfor_keys: Option<String>,
    pub keywords: Option<String>,
    #[serde(default)]
    pub nuclides: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

/// External-enrichment state for one record.
///
/// Ordered by confidence: a record that reached `Found` is never downgraded
/// by a later `Pending`/`NotFound`/`Error` pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Pending,
    Error,
    NoDoi,
    NotFound,
    Found,
}

/// Eventually-consistent enrichment block attached to a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub lookup_status: LookupStatus,
    pub citation_count: Option<u32>,
    pub abstract_text: Option<String>,
    pub venue: Option<String>,
    pub open_access_pdf: Option<String>,
    pub enriched_at: DateTime<Utc>,
}

/// A paper from the external scholarly-graph API (Semantic Scholar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPaper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<PaperAuthor>,
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(rename = "citationCount")]
    pub citation_count: Option<u32>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperAuthor {
    pub name: String,
}

// ─── Search wire contract ────────────────────────────────

/// POST /api/search request.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    #[serde(default = "default_prefilter_count")]
    pub prefilter_count: usize,
    pub filter_year: Option<i32>,
    #[serde(default)]
    pub include_timing: bool,
}

fn default_match_count() -> usize {
    20
}

fn default_match_threshold() -> f32 {
    0.3
}

fn default_prefilter_count() -> usize {
    200
}

/// Timing breakdown returned when `include_timing` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchTimings {
    pub embedding_ms: u64,
    /// 0 or 1 — kept numeric for the wire contract.
    pub embedding_cache_hit: u8,
    pub rpc_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_execution_ms: Option<u64>,
    pub edge_total_ms: u64,
}

/// Search response when timings are requested; without them the endpoint
/// returns a bare array of records instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedSearchResponse {
    pub records: Vec<NsrRecord>,
    pub timings: SearchTimings,
}

// ─── Chat wire contract ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// POST /api/chat request.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "userMessage")]
    pub user_message: String,
    #[serde(rename = "systemContext")]
    pub system_context: Option<String>,
}

/// Citation for an internal record in the leading `sources` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NsrSource {
    pub key_number: String,
    pub title: String,
    pub doi: Option<String>,
    pub similarity: f32,
}

/// Citation for an external paper in the leading `sources` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S2Source {
    pub title: String,
    pub url: String,
    pub authors: String,
    pub citations: u32,
}

/// Source-attributed evidence bundle. The two lists keep separate provenance:
/// cosine similarity and citation count rank on incompatible scales, and the
/// consuming UI renders them in separate sections. No cross-source dedup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesBundle {
    pub nsr: Vec<NsrSource>,
    pub s2: Vec<S2Source>,
}

// ─── Ingest & backfill ───────────────────────────────────

/// POST /api/records request: bulk upsert keyed by key_number.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub records: Vec<NsrRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub inserted: usize,
    pub updated: usize,
}

/// POST /api/records/embed response.
#[derive(Debug, Clone, Serialize)]
pub struct BackfillResponse {
    pub embedded: usize,
    pub remaining: usize,
}
