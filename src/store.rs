//! In-memory record corpus with disk persistence.
//!
//! The store is the only component that touches raw records. Everything else
//! goes through the typed query surface below (lexical, structured, author,
//! vector) instead of a generic schemaless client.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{Enrichment, LookupStatus, NsrRecord};
use crate::search::lexical::LexicalQuery;
use crate::search::vector::{lexical_prefilter, rank_by_similarity};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    record: NsrRecord,
    /// Present iff the embedding backfill has processed this record.
    embedding: Option<Vec<f32>>,
    enrichment: Option<Enrichment>,
}

pub struct RecordStore {
    entries: RwLock<Vec<StoredRecord>>,
    persist_path: PathBuf,
}

impl RecordStore {
    pub fn open_or_create(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let persist_path = data_dir.join("records.json");

        let entries = if persist_path.exists() {
            let data =
                std::fs::read_to_string(&persist_path).context("failed to read record store")?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Bulk upsert keyed by key_number. Identifiers are never reassigned:
    /// an update keeps the existing id and embedding.
    pub fn upsert(&self, records: Vec<NsrRecord>) -> Result<(usize, usize)> {
        let mut inserted = 0;
        let mut updated = 0;
        {
            let mut entries = self.entries.write();
            let mut next_id = entries.iter().map(|e| e.record.id).max().unwrap_or(0) + 1;

            for mut record in records {
                record.similarity = None;
                if let Some(existing) = entries
                    .iter_mut()
                    .find(|e| e.record.key_number == record.key_number)
                {
                    record.id = existing.record.id;
                    existing.record = record;
                    updated += 1;
                } else {
                    if record.id <= 0 {
                        record.id = next_id;
                    }
                    next_id = next_id.max(record.id + 1);
                    entries.push(StoredRecord {
                        record,
                        embedding: None,
                        enrichment: None,
                    });
                    inserted += 1;
                }
            }
        }
        self.persist()?;
        Ok((inserted, updated))
    }

    pub fn set_embedding(&self, key_number: &str, embedding: Vec<f32>) -> Result<()> {
        {
            let mut entries = self.entries.write();
            if let Some(entry) = entries
                .iter_mut()
                .find(|e| e.record.key_number == key_number)
            {
                entry.embedding = Some(embedding);
            }
        }
        self.persist()
    }

    /// Apply an enrichment pass, guarding against downgrades: data from a
    /// `Found` lookup is never replaced by a lower-confidence status.
    /// Returns whether the enrichment was applied.
    pub fn apply_enrichment(&self, key_number: &str, enrichment: Enrichment) -> Result<bool> {
        let applied = {
            let mut entries = self.entries.write();
            let Some(entry) = entries
                .iter_mut()
                .find(|e| e.record.key_number == key_number)
            else {
                return Ok(false);
            };
            match &entry.enrichment {
                Some(existing) if enrichment.lookup_status < existing.lookup_status => false,
                _ => {
                    entry.enrichment = Some(enrichment);
                    true
                }
            }
        };
        if applied {
            self.persist()?;
        }
        Ok(applied)
    }

    pub fn get(&self, key_number: &str) -> Option<NsrRecord> {
        self.entries
            .read()
            .iter()
            .find(|e| e.record.key_number == key_number)
            .map(|e| e.record.clone())
    }

    pub fn enrichment(&self, key_number: &str) -> Option<Enrichment> {
        self.entries
            .read()
            .iter()
            .find(|e| e.record.key_number == key_number)
            .and_then(|e| e.enrichment.clone())
    }

    /// Latest records by key number, for the browse view.
    pub fn recent(&self, limit: usize) -> Vec<NsrRecord> {
        let entries = self.entries.read();
        let mut records: Vec<NsrRecord> = entries.iter().map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| b.key_number.cmp(&a.key_number));
        records.truncate(limit);
        records
    }

    /// Records still waiting for the embedding backfill, with the text to
    /// embed (title + keywords).
    pub fn missing_embeddings(&self, limit: usize) -> Vec<(String, String)> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.embedding.is_none())
            .take(limit)
            .map(|e| {
                let mut text = e.record.title.clone();
                if let Some(keywords) = &e.record.keywords {
                    text.push(' ');
                    text.push_str(keywords);
                }
                (e.record.key_number.clone(), text)
            })
            .collect()
    }

    pub fn missing_embedding_count(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| e.embedding.is_none())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ─── Typed query surface ─────────────────────────────

    /// Pure filter + sort substring search; no scoring.
    pub fn lexical_search(&self, query: &LexicalQuery, limit: usize) -> Vec<NsrRecord> {
        let entries = self.entries.read();
        let mut results: Vec<NsrRecord> = entries
            .iter()
            .filter(|e| query.matches(&e.record))
            .map(|e| e.record.clone())
            .collect();
        query.order(&mut results);
        results.truncate(limit);
        results
    }

    /// Author substring match, newest first. Results carry similarity 1.0 so
    /// they merge ahead of semantic hits in the RAG flow.
    pub fn author_search(&self, author: &str, limit: usize) -> Vec<NsrRecord> {
        let needle = author.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let entries = self.entries.read();
        let mut results: Vec<NsrRecord> = entries
            .iter()
            .filter(|e| {
                e.record
                    .authors
                    .as_deref()
                    .is_some_and(|a| a.to_lowercase().contains(&needle))
            })
            .map(|e| e.record.clone())
            .collect();
        results.sort_by(|a, b| b.pub_year.cmp(&a.pub_year));
        results.truncate(limit);
        for r in &mut results {
            r.similarity = Some(1.0);
        }
        results
    }

    /// Records tagged with any of the given nuclides or reactions, newest
    /// first, similarity pinned to 1.0 (exact structured hits).
    pub fn structured_search(
        &self,
        nuclides: &[String],
        reactions: &[String],
        limit: usize,
    ) -> Vec<NsrRecord> {
        if nuclides.is_empty() && reactions.is_empty() {
            return Vec::new();
        }
        let entries = self.entries.read();
        let mut results: Vec<NsrRecord> = entries
            .iter()
            .filter(|e| {
                nuclides.iter().any(|n| e.record.nuclides.contains(n))
                    || reactions.iter().any(|r| e.record.reactions.contains(r))
            })
            .map(|e| e.record.clone())
            .collect();
        results.sort_by(|a, b| b.pub_year.cmp(&a.pub_year));
        results.truncate(limit);
        for r in &mut results {
            r.similarity = Some(1.0);
        }
        results
    }

    /// Legacy pure-vector search: every embedded record is a candidate.
    /// Records without an embedding are simply excluded, never an error.
    pub fn vector_search(
        &self,
        query: &[f32],
        threshold: f32,
        count: usize,
        filter_year: Option<i32>,
    ) -> Vec<NsrRecord> {
        let entries = self.entries.read();
        let candidates = entries
            .iter()
            .filter(|e| filter_year.is_none_or(|y| e.record.pub_year == y))
            .filter_map(|e| Some((&e.record, e.embedding.as_deref()?)));
        rank_by_similarity(candidates, query, threshold, count)
    }

    /// Hybrid search: lexical pre-filter bounds the candidate set before the
    /// cosine comparison. `prefilter_count` must be positive.
    pub fn hybrid_search(
        &self,
        query: &[f32],
        query_text: &str,
        threshold: f32,
        count: usize,
        prefilter_count: usize,
        filter_year: Option<i32>,
    ) -> Result<Vec<NsrRecord>> {
        anyhow::ensure!(prefilter_count > 0, "prefilter_count must be positive");

        let entries = self.entries.read();
        let candidates: Vec<(&NsrRecord, &[f32])> = entries
            .iter()
            .filter(|e| filter_year.is_none_or(|y| e.record.pub_year == y))
            .filter_map(|e| Some((&e.record, e.embedding.as_deref()?)))
            .collect();
        let filtered = lexical_prefilter(candidates, query_text, prefilter_count);
        Ok(rank_by_similarity(filtered, query, threshold, count))
    }

    /// Persist to disk (atomic write via temp file + rename).
    fn persist(&self) -> Result<()> {
        let entries = self.entries.read();
        let data = serde_json::to_string(&*entries)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data).context("failed to write record store")?;
        std::fs::rename(&tmp_path, &self.persist_path)
            .context("failed to replace record store")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(key: &str, year: i32, title: &str) -> NsrRecord {
        NsrRecord {
            id: 0,
            key_number: key.into(),
            pub_year: year,
            reference: None,
            authors: Some("W.Smith, A.Jones".into()),
            title: title.into(),
            doi: None,
            exfor_keys: None,
            keywords: None,
            nuclides: vec![],
            reactions: vec![],
            similarity: None,
        }
    }

    fn store_with(records: Vec<NsrRecord>) -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open_or_create(dir.path()).unwrap();
        store.upsert(records).unwrap();
        (dir, store)
    }

    #[test]
    fn test_upsert_assigns_and_preserves_ids() {
        let (_dir, store) = store_with(vec![record("2024AA01", 2024, "first")]);
        let id = store.get("2024AA01").unwrap().id;
        assert!(id > 0);

        let (inserted, updated) = store
            .upsert(vec![record("2024AA01", 2024, "renamed")])
            .unwrap();
        assert_eq!((inserted, updated), (0, 1));
        let after = store.get("2024AA01").unwrap();
        assert_eq!(after.id, id);
        assert_eq!(after.title, "renamed");
    }

    #[test]
    fn test_update_keeps_embedding() {
        let (_dir, store) = store_with(vec![record("2024AA01", 2024, "t")]);
        store.set_embedding("2024AA01", vec![1.0, 0.0]).unwrap();
        store.upsert(vec![record("2024AA01", 2024, "t2")]).unwrap();
        let results = store.vector_search(&[1.0, 0.0], 0.5, 10, None);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RecordStore::open_or_create(dir.path()).unwrap();
            store.upsert(vec![record("2024AA01", 2024, "t")]).unwrap();
            store.set_embedding("2024AA01", vec![0.5, 0.5]).unwrap();
        }
        let reopened = RecordStore::open_or_create(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.missing_embedding_count(), 0);
    }

    #[test]
    fn test_records_without_embedding_excluded_not_fatal() {
        let (_dir, store) = store_with(vec![
            record("2024AA01", 2024, "embedded"),
            record("2024BB01", 2024, "not embedded"),
        ]);
        store.set_embedding("2024AA01", vec![1.0, 0.0]).unwrap();

        let results = store.vector_search(&[1.0, 0.0], 0.1, 10, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key_number, "2024AA01");
    }

    #[test]
    fn test_vector_search_empty_corpus_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open_or_create(dir.path()).unwrap();
        assert!(store.vector_search(&[1.0, 0.0], 0.3, 20, None).is_empty());
    }

    #[test]
    fn test_hybrid_rejects_zero_prefilter() {
        let (_dir, store) = store_with(vec![record("2024AA01", 2024, "t")]);
        assert!(store
            .hybrid_search(&[1.0], "t", 0.3, 20, 0, None)
            .is_err());
    }

    #[test]
    fn test_hybrid_search_respects_threshold_and_order() {
        let (_dir, store) = store_with(vec![
            record("2024AA01", 2024, "neutron capture in U-235"),
            record("2024BB01", 2024, "neutron capture in Pu-239"),
            record("2024CC01", 2024, "alpha decay systematics"),
        ]);
        store.set_embedding("2024AA01", vec![1.0, 0.0]).unwrap();
        store.set_embedding("2024BB01", vec![0.7, 0.7]).unwrap();
        store.set_embedding("2024CC01", vec![0.0, 1.0]).unwrap();

        let results = store
            .hybrid_search(&[1.0, 0.0], "neutron capture", 0.3, 20, 200, None)
            .unwrap();
        // The alpha-decay record is pruned by the lexical pre-filter; the
        // remaining two rank by similarity.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].key_number, "2024AA01");
        assert!(results[0].similarity.unwrap() > results[1].similarity.unwrap());
    }

    #[test]
    fn test_year_filter() {
        let (_dir, store) = store_with(vec![
            record("2020AA01", 2020, "neutron capture"),
            record("2024AA01", 2024, "neutron capture"),
        ]);
        store.set_embedding("2020AA01", vec![1.0, 0.0]).unwrap();
        store.set_embedding("2024AA01", vec![1.0, 0.0]).unwrap();

        let results = store.vector_search(&[1.0, 0.0], 0.3, 20, Some(2024));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pub_year, 2024);
    }

    #[test]
    fn test_author_search_orders_newest_first() {
        let (_dir, store) = store_with(vec![
            record("2001AA01", 2001, "old"),
            record("2024AA01", 2024, "new"),
        ]);
        let results = store.author_search("smith", 8);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].pub_year, 2024);
        assert_eq!(results[0].similarity, Some(1.0));
    }

    #[test]
    fn test_structured_search_matches_tags() {
        let mut tagged = record("2024AA01", 2024, "t");
        tagged.nuclides = vec!["235U".into()];
        tagged.reactions = vec!["(n,g)".into()];
        let (_dir, store) = store_with(vec![tagged, record("2024BB01", 2024, "t")]);

        let by_nuclide = store.structured_search(&["235U".into()], &[], 10);
        assert_eq!(by_nuclide.len(), 1);
        let by_reaction = store.structured_search(&[], &["(n,g)".into()], 10);
        assert_eq!(by_reaction.len(), 1);
        assert!(store.structured_search(&[], &[], 10).is_empty());
    }

    #[test]
    fn test_enrichment_never_downgraded() {
        let (_dir, store) = store_with(vec![record("2024AA01", 2024, "t")]);
        let found = Enrichment {
            lookup_status: LookupStatus::Found,
            citation_count: Some(10),
            abstract_text: Some("abs".into()),
            venue: None,
            open_access_pdf: None,
            enriched_at: Utc::now(),
        };
        assert!(store.apply_enrichment("2024AA01", found).unwrap());

        let error_pass = Enrichment {
            lookup_status: LookupStatus::Error,
            citation_count: None,
            abstract_text: None,
            venue: None,
            open_access_pdf: None,
            enriched_at: Utc::now(),
        };
        assert!(!store.apply_enrichment("2024AA01", error_pass).unwrap());
        let kept = store.enrichment("2024AA01").unwrap();
        assert_eq!(kept.lookup_status, LookupStatus::Found);
        assert_eq!(kept.citation_count, Some(10));
    }

    #[test]
    fn test_identifier_query_with_no_match_is_empty() {
        let (_dir, store) = store_with(vec![record("2024AA01", 2024, "t")]);
        let q = LexicalQuery::parse("#2024AB99");
        assert!(store.lexical_search(&q, 20).is_empty());
    }
}
