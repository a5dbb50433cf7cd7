//! Authoritative in-memory vector index with durable snapshotting.
//!
//! Owns the id -> embedding mapping and answers top-K similarity queries by
//! linear scan. Linear scan is intentional: correct and simple at personal
//! note-collection scale (thousands of vectors, not millions). A larger
//! deployment would swap the internals behind the same `search` contract.
//!
//! Every mutating call rewrites the full snapshot before returning. On
//! persistence failure the in-memory mutation is NOT rolled back, so callers
//! get at-least-once semantics: the store may be ahead of the file by one
//! mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::retrieval::similarity;
use crate::retrieval::snapshot::{SnapshotError, SnapshotStore};

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("validation: {0}")]
    Validation(&'static str),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Structured metadata carried with each stored vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    /// Category of the owning note, used by search filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Open extension map for fields the store itself does not interpret.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VectorMetadata {
    /// Shallow merge: `other`'s present fields win, extension keys overwrite.
    pub fn merge(&mut self, other: VectorMetadata) {
        if other.category.is_some() {
            self.category = other.category;
        }
        for (k, v) in other.extra {
            self.extra.insert(k, v);
        }
    }
}

/// One stored vector with its metadata and timestamps.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Dimension-adjusted vector as supplied by the caller.
    pub vector: Vec<f32>,
    /// Unit-normalized copy, cached for the dot-product fast path in search.
    /// Not persisted; recomputed on load.
    pub unit: Vec<f32>,
    pub metadata: VectorMetadata,
    pub added_at: i64,
    pub updated_at: i64,
}

impl VectorRecord {
    /// Rebuild a record from persisted fields, recomputing the cached unit
    /// vector.
    pub fn restored(
        vector: Vec<f32>,
        metadata: VectorMetadata,
        added_at: i64,
        updated_at: i64,
    ) -> Self {
        let unit = similarity::normalize(&vector);
        Self {
            vector,
            unit,
            metadata,
            added_at,
            updated_at,
        }
    }
}

/// Search result entry.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Filter applied to `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Ids excluded from results.
    pub exclude_ids: Vec<String>,
    /// When set, only records whose metadata category equals this value.
    pub category: Option<String>,
}

impl SearchFilter {
    fn admits(&self, id: &str, metadata: &VectorMetadata) -> bool {
        if self.exclude_ids.iter().any(|ex| ex == id) {
            return false;
        }
        if let Some(category) = &self.category {
            return metadata.category.as_deref() == Some(category.as_str());
        }
        true
    }
}

pub struct VectorStore {
    dimension: usize,
    default_top_k: usize,
    records: HashMap<String, VectorRecord>,
    /// Insertion order; search ties are broken by it (stable sort).
    order: Vec<String>,
    snapshot: SnapshotStore,
    model_id: [u8; 32],
}

impl VectorStore {
    /// Open the store, loading any existing snapshot.
    ///
    /// An absent snapshot file means "start empty". A snapshot written by a
    /// different model or format version is discarded with a warning and the
    /// store starts fresh (a reindex rebuilds it). Any other load failure
    /// propagates.
    pub fn open(
        dimension: usize,
        default_top_k: usize,
        snapshot: SnapshotStore,
        model_id: [u8; 32],
    ) -> Result<Self, VectorStoreError> {
        let mut store = Self {
            dimension,
            default_top_k,
            records: HashMap::new(),
            order: Vec::new(),
            snapshot,
            model_id,
        };

        if !store.snapshot.exists() {
            log::info!("no vector snapshot at {:?}, starting empty", store.snapshot.path());
            return Ok(store);
        }

        match store.snapshot.load(&model_id, dimension) {
            Ok(data) => {
                log::info!("loaded {} vectors from snapshot", data.entries.len());
                for entry in data.entries {
                    store.order.push(entry.id.clone());
                    store.records.insert(entry.id, entry.record);
                }
            }
            Err(SnapshotError::ModelMismatch) => {
                log::warn!("embedding model changed, starting with a fresh vector index");
            }
            Err(SnapshotError::VersionMismatch(file_ver, _)) => {
                log::warn!("snapshot version {file_ver} unsupported, starting with a fresh vector index");
            }
            Err(e) => {
                log::error!("failed to load vector snapshot: {e}");
                return Err(e.into());
            }
        }

        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Insert or overwrite a vector. The vector is zero-padded or truncated
    /// to the store dimension; existing metadata is shallow-merged.
    /// Persists the full snapshot before returning.
    pub fn add_vector(
        &mut self,
        id: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), VectorStoreError> {
        if id.is_empty() {
            return Err(VectorStoreError::Validation("id must not be empty"));
        }
        if vector.is_empty() {
            return Err(VectorStoreError::Validation("vector must not be empty"));
        }

        let vector = self.fit_dimension(vector);
        let unit = similarity::normalize(&vector);
        let now = chrono::Utc::now().timestamp_millis();

        match self.records.get_mut(id) {
            Some(record) => {
                record.vector = vector;
                record.unit = unit;
                record.metadata.merge(metadata);
                record.updated_at = now;
            }
            None => {
                self.records.insert(
                    id.to_string(),
                    VectorRecord {
                        vector,
                        unit,
                        metadata,
                        added_at: now,
                        updated_at: now,
                    },
                );
                self.order.push(id.to_string());
            }
        }

        self.persist()
    }

    /// Replace a vector and shallow-merge metadata; behaves as `add_vector`
    /// when the id is absent (the semantics coincide).
    pub fn update_vector(
        &mut self,
        id: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<(), VectorStoreError> {
        self.add_vector(id, vector, metadata)
    }

    /// Remove a record. Returns whether anything was removed; persists only
    /// when a deletion actually happened.
    pub fn remove_vector(&mut self, id: &str) -> Result<bool, VectorStoreError> {
        if self.records.remove(id).is_none() {
            return Ok(false);
        }
        self.order.retain(|o| o != id);
        self.persist()?;
        Ok(true)
    }

    /// The stored (dimension-adjusted) vector, without side effects.
    pub fn get_vector(&self, id: &str) -> Option<&[f32]> {
        self.records.get(id).map(|r| r.vector.as_slice())
    }

    pub fn get_record(&self, id: &str) -> Option<&VectorRecord> {
        self.records.get(id)
    }

    /// Top-K nearest records by cosine similarity.
    ///
    /// The query is normalized once and scored against each record's cached
    /// unit vector by dot product. Results are sorted descending by score;
    /// ties keep insertion order (stable sort).
    pub fn search(
        &self,
        query: &[f32],
        top_k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        if query.is_empty() {
            return Err(VectorStoreError::Validation("query vector must not be empty"));
        }

        let query_unit = similarity::normalize(query);
        let k = top_k.unwrap_or(self.default_top_k);

        let mut hits: Vec<SearchHit> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id).map(|record| (id, record)))
            .filter(|(id, record)| filter.admits(id.as_str(), &record.metadata))
            .map(|(id, record)| SearchHit {
                id: id.clone(),
                score: similarity::dot_product(&query_unit, &record.unit),
                metadata: record.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Independent `search` per query; result order matches input order.
    pub fn batch_search(
        &self,
        queries: &[Vec<f32>],
        top_k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<Vec<SearchHit>>, VectorStoreError> {
        queries
            .iter()
            .map(|q| self.search(q, top_k, filter))
            .collect()
    }

    /// Empty the store and persist an empty snapshot. Used before a full
    /// reindex.
    pub fn clear(&mut self) -> Result<(), VectorStoreError> {
        self.records.clear();
        self.order.clear();
        self.persist()
    }

    /// Persist the current state.
    pub fn save(&self) -> Result<(), VectorStoreError> {
        self.persist()
    }

    /// Recompute the insertion-order bookkeeping from the record map and
    /// persist. Repair operation; `search` iterates the map through the
    /// order list but never requires this to have run.
    pub fn rebuild_index(&mut self) -> Result<(), VectorStoreError> {
        self.order.retain(|id| self.records.contains_key(id));

        let mut missing: Vec<&String> = self
            .records
            .keys()
            .filter(|id| !self.order.contains(*id))
            .collect();
        missing.sort_by_key(|id| (self.records[*id].added_at, (*id).clone()));

        let missing: Vec<String> = missing.into_iter().cloned().collect();
        self.order.extend(missing);

        self.persist()
    }

    fn persist(&self) -> Result<(), VectorStoreError> {
        let entries: Vec<(&str, &VectorRecord)> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| (id.as_str(), r)))
            .collect();
        self.snapshot
            .save(self.dimension, &self.model_id, &entries)?;
        Ok(())
    }

    /// Deterministically adjust a vector to the store dimension: truncate if
    /// longer, zero-pad if shorter. Lossy but never a rejection.
    fn fit_dimension(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if vector.len() != self.dimension {
            log::debug!(
                "adjusting vector of length {} to dimension {}",
                vector.len(),
                self.dimension
            );
            vector.resize(self.dimension, 0.0);
        }
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(dir: &tempfile::TempDir, dimension: usize) -> VectorStore {
        let snapshot = SnapshotStore::new(dir.path().join("vectors.bin"));
        VectorStore::open(dimension, 5, snapshot, [7u8; 32]).unwrap()
    }

    fn meta(category: &str) -> VectorMetadata {
        VectorMetadata {
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_open_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 4);
        assert!(store.is_empty());
        assert_eq!(store.dimension(), 4);
    }

    #[test]
    fn test_add_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);

        store
            .add_vector("n1", vec![1.0, 2.0, 3.0], VectorMetadata::default())
            .unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.contains("n1"));
        assert_eq!(store.get_vector("n1").unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_add_rejects_empty_id_and_vector() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);

        let err = store
            .add_vector("", vec![1.0], VectorMetadata::default())
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Validation(_)));

        let err = store
            .add_vector("n1", vec![], VectorMetadata::default())
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_dimension_adjustment() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 4);

        // too short: zero-padded
        store
            .add_vector("short", vec![1.0, 2.0], VectorMetadata::default())
            .unwrap();
        assert_eq!(store.get_vector("short").unwrap(), &[1.0, 2.0, 0.0, 0.0]);

        // too long: truncated
        store
            .add_vector(
                "long",
                vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
                VectorMetadata::default(),
            )
            .unwrap();
        assert_eq!(store.get_vector("long").unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_overwrite_merges_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);

        let mut m1 = meta("personal");
        m1.extra
            .insert("source".to_string(), serde_json::json!("import"));
        store.add_vector("n1", vec![1.0, 0.0, 0.0], m1).unwrap();

        store
            .update_vector("n1", vec![0.0, 1.0, 0.0], meta("work"))
            .unwrap();

        let record = store.get_record("n1").unwrap();
        assert_eq!(record.vector, vec![0.0, 1.0, 0.0]);
        assert_eq!(record.metadata.category.as_deref(), Some("work"));
        // extension key from the first insert survives the merge
        assert_eq!(
            record.metadata.extra.get("source"),
            Some(&serde_json::json!("import"))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_vector() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);

        store
            .add_vector("n1", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();

        assert!(store.remove_vector("n1").unwrap());
        assert!(!store.remove_vector("n1").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_missing_does_not_rewrite_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        store
            .add_vector("n1", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();

        let before = std::fs::read(dir.path().join("vectors.bin")).unwrap();
        assert!(!store.remove_vector("ghost").unwrap());
        let after = std::fs::read(dir.path().join("vectors.bin")).unwrap();

        // byte-identical: the no-op removal did not persist
        assert_eq!(before, after);
    }

    #[test]
    fn test_search_orders_by_score() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);

        store
            .add_vector("x", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();
        store
            .add_vector("y", vec![0.0, 1.0, 0.0], VectorMetadata::default())
            .unwrap();

        let hits = store.search(&[1.0, 0.1, 0.0], None, &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "x");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_search_empty_query_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 3);
        let err = store.search(&[], None, &SearchFilter::default()).unwrap_err();
        assert!(matches!(err, VectorStoreError::Validation(_)));
    }

    #[test]
    fn test_search_respects_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        for i in 0..10 {
            store
                .add_vector(
                    &format!("n{i}"),
                    vec![1.0, i as f32 * 0.1, 0.0],
                    VectorMetadata::default(),
                )
                .unwrap();
        }

        let hits = store.search(&[1.0, 0.0, 0.0], Some(3), &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 3);

        // default_top_k is 5
        let hits = store.search(&[1.0, 0.0, 0.0], None, &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_search_exclude_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        store
            .add_vector("keep", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();
        store
            .add_vector("skip", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();

        let filter = SearchFilter {
            exclude_ids: vec!["skip".to_string()],
            category: None,
        };
        let hits = store.search(&[1.0, 0.0, 0.0], None, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "keep");
    }

    #[test]
    fn test_search_category_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        store.add_vector("w", vec![1.0, 0.0, 0.0], meta("work")).unwrap();
        store
            .add_vector("p", vec![1.0, 0.0, 0.0], meta("personal"))
            .unwrap();
        store
            .add_vector("none", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();

        let filter = SearchFilter {
            exclude_ids: vec![],
            category: Some("work".to_string()),
        };
        let hits = store.search(&[1.0, 0.0, 0.0], None, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "w");
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        // identical vectors -> identical scores
        store
            .add_vector("first", vec![1.0, 1.0, 0.0], VectorMetadata::default())
            .unwrap();
        store
            .add_vector("second", vec![1.0, 1.0, 0.0], VectorMetadata::default())
            .unwrap();
        store
            .add_vector("third", vec![1.0, 1.0, 0.0], VectorMetadata::default())
            .unwrap();

        let hits = store.search(&[1.0, 1.0, 0.0], None, &SearchFilter::default()).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_batch_search_matches_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        store
            .add_vector("x", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();
        store
            .add_vector("y", vec![0.0, 1.0, 0.0], VectorMetadata::default())
            .unwrap();

        let queries = vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]];
        let results = store
            .batch_search(&queries, Some(1), &SearchFilter::default())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0][0].id, "y");
        assert_eq!(results[1][0].id, "x");
    }

    #[test]
    fn test_clear_persists_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        store
            .add_vector("n1", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();

        store.clear().unwrap();
        assert!(store.is_empty());

        let reopened = open_store(&dir, 3);
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_restart_reproduces_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(&dir, 3);
            store
                .add_vector("n1", vec![1.0, 2.0, 3.0], meta("work"))
                .unwrap();
            store
                .add_vector("n2", vec![4.0, 5.0], VectorMetadata::default())
                .unwrap();
        }

        let reopened = open_store(&dir, 3);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get_vector("n1").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(reopened.get_vector("n2").unwrap(), &[4.0, 5.0, 0.0]);
        assert_eq!(
            reopened.get_record("n1").unwrap().metadata.category.as_deref(),
            Some("work")
        );
        // insertion order survives the round trip
        let ids: Vec<&str> = reopened.ids().collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[test]
    fn test_model_change_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = open_store(&dir, 3);
            store
                .add_vector("n1", vec![1.0, 0.0, 0.0], VectorMetadata::default())
                .unwrap();
        }

        let snapshot = SnapshotStore::new(dir.path().join("vectors.bin"));
        let store = VectorStore::open(3, 5, snapshot, [9u8; 32]).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_rebuild_index_keeps_search_working() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(&dir, 3);
        store
            .add_vector("a", vec![1.0, 0.0, 0.0], VectorMetadata::default())
            .unwrap();
        store
            .add_vector("b", vec![0.0, 1.0, 0.0], VectorMetadata::default())
            .unwrap();

        store.rebuild_index().unwrap();
        assert_eq!(store.ids().collect::<Vec<_>>(), vec!["a", "b"]);

        let hits = store.search(&[0.0, 1.0, 0.0], None, &SearchFilter::default()).unwrap();
        assert_eq!(hits[0].id, "b");
    }
}
