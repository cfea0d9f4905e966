//! Embedding provider adapter for an OpenAI-compatible API.
//!
//! Vectors come back at the fixed dimension shared with the stored record
//! embeddings; the cosine metric on both sides depends on it. Failures are
//! retryable [`EmbeddingProviderError`]s — a partial vector is never
//! returned.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::EmbeddingProviderError;

/// Provider batch ceiling: requests fan out sequentially in chunks of this
/// size to respect upstream rate limits.
pub const EMBED_BATCH_SIZE: usize = 50;

/// Cap on input length per text. The backfill feeds title + keywords, which
/// stays far below this; the cap bounds arbitrary caller input to the
/// provider's context window.
const MAX_EMBED_CHARS: usize = 8_000;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Embed a single non-empty text.
pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>, EmbeddingProviderError> {
    let results = embed_batch(client, config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingProviderError::Malformed("no embedding returned".into()))
}

/// Embed a batch of texts, chunked at [`EMBED_BATCH_SIZE`] per request.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingProviderError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let truncated: Vec<String> = texts
        .iter()
        .map(|t| truncate_for_embedding(t).to_string())
        .collect();

    let url = format!("{}/v1/embeddings", config.base_url);
    let mut all_embeddings = Vec::with_capacity(truncated.len());

    for chunk in truncated.chunks(EMBED_BATCH_SIZE) {
        let req = EmbedRequest {
            model: &config.embedding_model,
            input: chunk,
            dimensions: config.embedding_dim,
        };

        let resp = client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", config.api_key.as_deref().unwrap_or("")),
            )
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status =
                StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbeddingProviderError::Api { status, body });
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingProviderError::Malformed(e.to_string()))?;

        if body.data.len() != chunk.len() {
            return Err(EmbeddingProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                chunk.len(),
                body.data.len()
            )));
        }

        for data in body.data {
            if data.embedding.len() != config.embedding_dim {
                return Err(EmbeddingProviderError::Malformed(format!(
                    "expected dimension {}, got {}",
                    config.embedding_dim,
                    data.embedding.len()
                )));
            }
            all_embeddings.push(data.embedding);
        }
    }

    Ok(all_embeddings)
}

/// Truncate to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_for_embedding("neutron capture"), "neutron capture");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "α".repeat(MAX_EMBED_CHARS); // 2 bytes per char
        let out = truncate_for_embedding(&text);
        assert!(out.len() <= MAX_EMBED_CHARS);
        assert!(text.is_char_boundary(out.len()));
    }

    #[test]
    fn test_embed_request_serializes_dimensions() {
        let input = vec!["q".to_string()];
        let req = EmbedRequest {
            model: "text-embedding-3-small",
            input: &input,
            dimensions: 256,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["dimensions"], 256);
        assert_eq!(json["input"][0], "q");
    }

    #[test]
    fn test_embed_response_parses() {
        let body: EmbedResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[0.1,0.2]}],"model":"m"}"#).unwrap();
        assert_eq!(body.data.len(), 1);
        assert_eq!(body.data[0].embedding, vec![0.1, 0.2]);
    }
}
