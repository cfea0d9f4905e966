//! Streaming chat completions and SSE line framing.
//!
//! The server passes the provider's SSE bytes through untouched, so the only
//! server-side job here is opening the stream. The framing/parsing helpers
//! below are shared with the client-side consumer, which must reassemble
//! `data: {...}\n\n` records across arbitrary chunk boundaries.

use anyhow::{Context, Result};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::ChatMessage;

/// SSE sentinel terminating the provider's delta stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    max_tokens: u32,
}

/// Open a streaming chat completion and return the raw SSE byte stream.
/// A non-2xx response is a hard error; the body is read for the message.
pub async fn start_completion(
    client: &reqwest::Client,
    config: &LlmConfig,
    messages: &[ChatMessage],
) -> Result<impl Stream<Item = reqwest::Result<bytes::Bytes>>> {
    let url = format!("{}/v1/chat/completions", config.base_url);

    let req = CompletionRequest {
        model: &config.chat_model,
        messages,
        stream: true,
        max_tokens: config.max_tokens,
    };

    let resp = client
        .post(&url)
        .timeout(Duration::from_secs(300))
        .header(
            "Authorization",
            format!("Bearer {}", config.api_key.as_deref().unwrap_or("")),
        )
        .json(&req)
        .send()
        .await
        .context("failed to connect to completion API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("completion API returned {status}: {body}");
    }

    Ok(resp.bytes_stream())
}

/// Strip the SSE `data: ` prefix from one line, if present.
pub fn sse_data(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data: ").map(str::trim)
}

#[derive(Deserialize)]
struct DeltaChunk {
    choices: Vec<DeltaChoice>,
}

#[derive(Deserialize)]
struct DeltaChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Parse one SSE line of the provider's delta framing. Returns:
/// - `Some(Ok(content))` for content deltas
/// - `Some(Err(e))` for malformed payloads (the consumer skips these)
/// - `None` for empty lines, non-data lines, role-only chunks, and `[DONE]`
pub fn parse_delta_line(line: &str) -> Option<Result<String>> {
    let data = sse_data(line)?;
    if data.is_empty() || data == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<DeltaChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(anyhow::anyhow!("failed to parse delta chunk: {e}"))),
    }
}

/// Convert a byte stream into a stream of complete lines, buffering across
/// chunk boundaries (a chunk may split a logical SSE record).
pub fn stream_lines<E: std::fmt::Display + Send>(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new()),
        |(mut stream, mut buffer)| async move {
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(anyhow::anyhow!("stream read error: {e}")),
                            (stream, buffer),
                        ));
                    }
                    None => {
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_parse_delta_content() {
        let line = r#"data: {"choices":[{"delta":{"content":"The half-life"}}]}"#;
        assert_eq!(parse_delta_line(line).unwrap().unwrap(), "The half-life");
    }

    #[test]
    fn test_parse_done_sentinel() {
        assert!(parse_delta_line("data: [DONE]").is_none());
    }

    #[test]
    fn test_parse_role_only_chunk() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(parse_delta_line(line).is_none());
    }

    #[test]
    fn test_parse_null_content() {
        let line = r#"data: {"choices":[{"delta":{"content":null}}]}"#;
        assert!(parse_delta_line(line).is_none());
    }

    #[test]
    fn test_parse_malformed_is_err_not_panic() {
        assert!(parse_delta_line("data: {broken json").unwrap().is_err());
    }

    #[test]
    fn test_parse_non_data_lines_skipped() {
        assert!(parse_delta_line("").is_none());
        assert!(parse_delta_line("   ").is_none());
        assert!(parse_delta_line("event: message").is_none());
    }

    #[tokio::test]
    async fn test_stream_lines_reassembles_split_records() {
        // One logical record split across three chunks
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from("data: {\"cho")),
            Ok(bytes::Bytes::from("ices\":[]}\n\ndata: [DO")),
            Ok(bytes::Bytes::from("NE]\n\n")),
        ];
        let lines: Vec<_> = stream_lines(futures_util::stream::iter(chunks))
            .collect()
            .await;
        let lines: Vec<String> = lines.into_iter().map(|l| l.unwrap()).collect();
        assert_eq!(lines, vec!["data: {\"choices\":[]}", "data: [DONE]"]);
    }

    #[tokio::test]
    async fn test_stream_lines_emits_trailing_partial_line() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> =
            vec![Ok(bytes::Bytes::from("data: tail-without-newline"))];
        let lines: Vec<_> = stream_lines(futures_util::stream::iter(chunks))
            .collect()
            .await;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_ref().unwrap(), "data: tail-without-newline");
    }
}
