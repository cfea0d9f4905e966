//! RAG assembly: turn a user message into grounded prompt context plus a
//! source-attributed citation bundle.
//!
//! Structured signals (nuclide, reaction, author mentions) are extracted from
//! the raw message and retrieved alongside the semantic hits; exact
//! structured matches rank ahead of semantic ones in the merged internal
//! list. Internal and external evidence stay in separate sections end to end.

use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

use crate::models::{ChatMessage, ExternalPaper, NsrRecord, NsrSource, S2Source, SourcesBundle};

/// Cap on the merged internal record list fed into the prompt.
pub const MERGED_RECORD_CAP: usize = 12;

/// Conversation history window, in turns.
pub const MAX_HISTORY_TURNS: usize = 10;

/// Free-text fields embedded in the prompt are clipped to this many chars to
/// bound prompt size.
const SNIPPET_CHARS: usize = 200;

pub const SYSTEM_PROMPT_BASE: &str = "\
You are NSRgpt, an AI research assistant from the National Nuclear Data Center (NNDC) at Brookhaven National Laboratory.

INSTRUCTIONS:
- Always use the retrieved NSR records and Semantic Scholar papers below to inform your answer. Even when no record is an exact match, discuss what the retrieved records reveal about the topic — related isotopes, nearby nuclides, the same element, or similar reactions are all highly relevant.
- Cite NSR records by key number (e.g., 2024SM01). Reference specific findings from the records.
- Cite Semantic Scholar papers by title/author with their URL.
- Only say \"no relevant records\" if the retrieved list is truly empty or entirely unrelated to the question.
- Combine retrieved evidence with your general nuclear physics knowledge to give a thorough answer.
- Never fabricate key numbers, DOIs, or author names.";

// ─── Entity extraction ───────────────────────────────────

fn nuclide_mass_first() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,3})([A-Z][a-z]?)\b").unwrap())
}

fn nuclide_symbol_first() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z][a-z]?)-?(\d{1,3})\b").unwrap())
}

/// Extract nuclide mentions like "100Br", "208Pb", "U-235" from text,
/// normalized to mass-first form ("100Br", "235U").
pub fn extract_nuclides(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut push = |mass: &str, symbol: &str| {
        let mut chars = symbol.chars();
        let Some(first) = chars.next() else { return };
        let normalized = format!(
            "{mass}{}{}",
            first.to_uppercase(),
            chars.as_str().to_lowercase()
        );
        if !found.contains(&normalized) {
            found.push(normalized);
        }
    };

    for caps in nuclide_mass_first().captures_iter(text) {
        push(&caps[1], &caps[2]);
    }
    for caps in nuclide_symbol_first().captures_iter(text) {
        push(&caps[2], &caps[1]);
    }
    found
}

/// Extract reaction mentions like "(p,n)", "(d,p)" — parenthesized groups
/// containing a comma.
pub fn extract_reactions(text: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\(([a-zA-Z0-9',]+)\)").unwrap());

    let mut found = Vec::new();
    for caps in re.captures_iter(text) {
        if caps[1].contains(',') {
            let reaction = format!("({})", &caps[1]);
            if !found.contains(&reaction) {
                found.push(reaction);
            }
        }
    }
    found
}

/// Extract an author name from queries like "papers by A Gilman" or
/// "what did Smith publish". Nuclide-shaped names and very short matches are
/// rejected.
pub fn extract_author_query(text: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(
                r"(?i)(?:papers?|publications?|work|research|articles?)\s+(?:by|from|of)\s+(.+?)(?:\?|\.|$|\babout\b|\bin\b)",
            )
            .unwrap(),
            Regex::new(r"(?i)(?:authored?\s+by|written\s+by)\s+(.+?)(?:\?|\.|$)").unwrap(),
            Regex::new(
                r"(?i)what\s+(?:did|has|have)\s+(.+?)\s+(?:publish|write|author|research|study)",
            )
            .unwrap(),
        ]
    });

    static NUCLIDE_SHAPE: OnceLock<Regex> = OnceLock::new();
    let nuclide_shape =
        NUCLIDE_SHAPE.get_or_init(|| Regex::new(r"^\d+[A-Z][a-z]?$").unwrap());

    for pattern in patterns {
        if let Some(caps) = pattern.captures(text) {
            let name = caps[1].trim().trim_end_matches(['?', '.', '!', ',']).trim();
            if name.len() >= 3 && !nuclide_shape.is_match(name) {
                return Some(name.to_string());
            }
        }
    }
    None
}

// ─── Merge & dedup ───────────────────────────────────────

/// Merge two internal result lists, deduplicating by key_number. `primary`
/// entries win and keep their order; the merged list is capped at
/// [`MERGED_RECORD_CAP`]. This dedup is internal-only — external papers are
/// never folded in.
pub fn merge_records(primary: Vec<NsrRecord>, secondary: Vec<NsrRecord>) -> Vec<NsrRecord> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for record in primary.into_iter().chain(secondary) {
        if seen.insert(record.key_number.clone()) {
            merged.push(record);
        }
    }
    merged.truncate(MERGED_RECORD_CAP);
    merged
}

// ─── Prompt assembly ─────────────────────────────────────

/// Format the internal grounding block: numbered `[n] KEY — "title"` entries.
pub fn format_nsr_context(records: &[NsrRecord]) -> String {
    if records.is_empty() {
        return "\n## Retrieved NSR Records\nNo relevant records found.".to_string();
    }

    let mut out = String::from("\n## Retrieved NSR Records\n");
    for (i, r) in records.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        write!(out, "[{}] {} — \"{}\"", i + 1, r.key_number, r.title).unwrap();
        write!(
            out,
            "\n    Authors: {} | Year: {}",
            r.authors.as_deref().unwrap_or("N/A"),
            r.pub_year
        )
        .unwrap();
        if let Some(doi) = &r.doi {
            write!(out, " | DOI: {doi}").unwrap();
        }
        if let Some(keywords) = &r.keywords {
            write!(out, "\n    Keywords: {}", clip(keywords, SNIPPET_CHARS)).unwrap();
        }
    }
    out
}

/// Format the external grounding block: numbered `[Sn]` entries.
pub fn format_s2_context(papers: &[ExternalPaper]) -> String {
    if papers.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n\n## Related Papers (Semantic Scholar)\n");
    for (i, p) in papers.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let authors = if p.authors.is_empty() {
            "Unknown".to_string()
        } else {
            p.authors
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            out,
            "[S{}] \"{}\" — {} ({}) | {} citations",
            i + 1,
            p.title,
            authors,
            p.year.map_or("N/A".to_string(), |y| y.to_string()),
            p.citation_count.unwrap_or(0)
        )
        .unwrap();
        if let Some(abstract_text) = &p.abstract_text {
            write!(out, "\n     Abstract: {}...", clip(abstract_text, SNIPPET_CHARS)).unwrap();
        }
        if let Some(url) = &p.url {
            write!(out, "\n     {url}").unwrap();
        }
    }
    out
}

/// Build the full system prompt: persona, optional caller-supplied context,
/// then the grounding blocks.
pub fn build_system_prompt(
    system_context: Option<&str>,
    records: &[NsrRecord],
    papers: &[ExternalPaper],
) -> String {
    let grounding = format!("{}{}", format_nsr_context(records), format_s2_context(papers));
    match system_context {
        Some(ctx) => format!("{SYSTEM_PROMPT_BASE}\n\n{ctx}\n{grounding}"),
        None => format!("{SYSTEM_PROMPT_BASE}\n{grounding}"),
    }
}

/// Assemble the completion message array: system prompt, the last
/// [`MAX_HISTORY_TURNS`] turns of history, then the new user message.
pub fn build_messages(
    system_prompt: String,
    history: &[ChatMessage],
    user_message: &str,
) -> Vec<ChatMessage> {
    let tail_start = history.len().saturating_sub(MAX_HISTORY_TURNS);
    let mut messages = Vec::with_capacity(history.len() - tail_start + 2);
    messages.push(ChatMessage {
        role: "system".to_string(),
        content: system_prompt,
    });
    messages.extend(history[tail_start..].iter().cloned());
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
    });
    messages
}

/// Build the citation bundle emitted as the first stream frame.
pub fn build_sources(records: &[NsrRecord], papers: &[ExternalPaper]) -> SourcesBundle {
    SourcesBundle {
        nsr: records
            .iter()
            .map(|r| NsrSource {
                key_number: r.key_number.clone(),
                title: r.title.clone(),
                doi: r.doi.clone(),
                similarity: r.similarity.unwrap_or(0.0),
            })
            .collect(),
        s2: papers
            .iter()
            .map(|p| S2Source {
                title: p.title.clone(),
                url: p.url.clone().unwrap_or_default(),
                authors: if p.authors.is_empty() {
                    "Unknown".to_string()
                } else {
                    p.authors
                        .iter()
                        .map(|a| a.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
                citations: p.citation_count.unwrap_or(0),
            })
            .collect(),
    }
}

/// Clip to at most `max` chars on a char boundary.
fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
