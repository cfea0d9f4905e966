//! Semantic Scholar paper search.
//!
//! Best-effort by contract: external literature is a supplementary signal,
//! never a hard dependency of the chat flow. Any failure — network, rate
//! limit, non-2xx, bad JSON — collapses to zero results with a `warn!`, and
//! there is exactly one attempt per chat turn.

use serde::Deserialize;

use crate::config::S2Config;
use crate::models::ExternalPaper;

/// Papers fetched per chat turn.
pub const PAPER_LIMIT: usize = 5;

const SEARCH_FIELDS: &str = "title,authors,year,abstract,citationCount,url,externalIds";

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ExternalPaper>,
}

/// Search the scholarly graph for papers matching `query`.
pub async fn search_papers(
    client: &reqwest::Client,
    config: &S2Config,
    query: &str,
    limit: usize,
) -> Vec<ExternalPaper> {
    match try_search(client, config, query, limit).await {
        Ok(papers) => papers,
        Err(e) => {
            tracing::warn!("Semantic Scholar search failed (continuing without): {e}");
            Vec::new()
        }
    }
}

async fn try_search(
    client: &reqwest::Client,
    config: &S2Config,
    query: &str,
    limit: usize,
) -> anyhow::Result<Vec<ExternalPaper>> {
    let url = format!("{}/graph/v1/paper/search", config.base_url);

    let mut req = client.get(&url).query(&[
        ("query", query),
        ("limit", &limit.to_string()),
        ("fields", SEARCH_FIELDS),
    ]);
    if let Some(key) = &config.api_key {
        req = req.header("x-api-key", key);
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("Semantic Scholar returned {}", resp.status());
    }

    let body: SearchResponse = resp.json().await?;
    Ok(body.data)
}
