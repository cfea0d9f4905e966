//! Lexical search: pure filter + sort, no scoring.
//!
//! A `#`-prefixed query restricts matching to the key-number field;
//! everything else is case-insensitive substring match across key number,
//! title, authors and keywords.

use crate::models::NsrRecord;

/// Default result cap for chat-adjacent lexical lookups.
pub const DEFAULT_LEXICAL_LIMIT: usize = 20;

/// A parsed lexical query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalQuery {
    /// Lowercased match pattern with any `#` prefix stripped.
    pub pattern: String,
    /// Restrict matching to the key-number field only.
    pub id_only: bool,
}

impl LexicalQuery {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.strip_prefix('#') {
            Some(rest) => Self {
                pattern: rest.trim().to_lowercase(),
                id_only: true,
            },
            None => Self {
                pattern: trimmed.to_lowercase(),
                id_only: false,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Substring match against the fields this query covers.
    pub fn matches(&self, record: &NsrRecord) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        if record.key_number.to_lowercase().contains(&self.pattern) {
            return true;
        }
        if self.id_only {
            return false;
        }
        if record.title.to_lowercase().contains(&self.pattern) {
            return true;
        }
        if contains_ci(record.authors.as_deref(), &self.pattern) {
            return true;
        }
        contains_ci(record.keywords.as_deref(), &self.pattern)
    }

    /// Identifier queries order ascending by key number; free-text queries
    /// order descending by publication year.
    pub fn order(&self, results: &mut [NsrRecord]) {
        if self.id_only {
            results.sort_by(|a, b| a.key_number.cmp(&b.key_number));
        } else {
            results.sort_by(|a, b| b.pub_year.cmp(&a.pub_year));
        }
    }
}

fn contains_ci(field: Option<&str>, pattern: &str) -> bool {
    field.is_some_and(|f| f.to_lowercase().contains(pattern))
}
