//! Retrieval orchestrator.
//!
//! Turns a text query into ranked notes: embeds the query, searches the
//! vector store, optionally fuses with a lexical ranking, and resolves ids
//! back to full notes. Ids in the store that no longer resolve to a note are
//! dropped silently; the pipeline removes them on its own schedule.

use std::sync::{Arc, RwLock};

use crate::eid::Eid;
use crate::notes::{Note, NoteStore};
use crate::retrieval::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::retrieval::hybrid;
use crate::retrieval::store::{SearchFilter, VectorStore, VectorStoreError};

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    Store(#[from] VectorStoreError),

    #[error(transparent)]
    Notes(#[from] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A retrieved note with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredNote {
    pub note: Note,
    pub score: f32,
}

pub struct Retriever {
    store: Arc<RwLock<VectorStore>>,
    notes: Arc<dyn NoteStore>,
    provider: Arc<EmbeddingProvider>,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<RwLock<VectorStore>>,
        notes: Arc<dyn NoteStore>,
        provider: Arc<EmbeddingProvider>,
        default_top_k: usize,
    ) -> Self {
        Self {
            store,
            notes,
            provider,
            default_top_k,
        }
    }

    /// Pure semantic retrieval: embed the query and return the nearest notes,
    /// best first.
    pub fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredNote>, RetrieveError> {
        let hits = self.semantic_hits(query, top_k, filter)?;

        let ids: Vec<Eid> = hits.iter().map(|(id, _)| id.clone()).collect();
        let notes = self.notes.find_by_ids(&ids)?;

        // resolve scores by id; stale store entries have no note and vanish
        Ok(notes
            .into_iter()
            .map(|note| {
                let score = hits
                    .iter()
                    .find(|(id, _)| id == &note.id)
                    .map(|(_, score)| *score)
                    .unwrap_or(0.0);
                ScoredNote { note, score }
            })
            .collect())
    }

    /// Hybrid retrieval: fuse the semantic ranking with a keyword ranking.
    ///
    /// Both candidate lists are fetched oversized so the fused ordering has
    /// real choices, then truncated to `top_k`.
    pub fn retrieve_hybrid(
        &self,
        query: &str,
        top_k: Option<usize>,
        semantic_weight: f32,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredNote>, RetrieveError> {
        let k = top_k.unwrap_or(self.default_top_k);
        let candidates = k.saturating_mul(3).max(10);

        let semantic: Vec<Eid> = self
            .semantic_hits(query, Some(candidates), filter)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let lexical = self.notes.full_text_search(query, candidates)?;

        let fused = hybrid::fuse(&semantic, &lexical, semantic_weight, k);

        let ids: Vec<Eid> = fused.iter().map(|f| f.id.clone()).collect();
        let notes = self.notes.find_by_ids(&ids)?;

        Ok(notes
            .into_iter()
            .map(|note| {
                let score = fused
                    .iter()
                    .find(|f| f.id == note.id)
                    .map(|f| f.score)
                    .unwrap_or(0.0);
                ScoredNote { note, score }
            })
            .collect())
    }

    fn semantic_hits(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: &SearchFilter,
    ) -> Result<Vec<(Eid, f32)>, RetrieveError> {
        let embedding = self.provider.embed(query)?;

        let store = self
            .store
            .read()
            .map_err(|e| RetrieveError::Internal(format!("lock poisoned: {e}")))?;

        if store.is_empty() {
            return Ok(vec![]);
        }

        let hits = store.search(&embedding.vector, top_k.or(Some(self.default_top_k)), filter)?;
        Ok(hits
            .into_iter()
            .map(|h| (Eid::from(h.id), h.score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{BackendCsv, NoteCreate};
    use crate::retrieval::snapshot::SnapshotStore;
    use crate::retrieval::store::VectorMetadata;

    struct Fixture {
        _dir: tempfile::TempDir,
        retriever: Retriever,
        notes: Arc<dyn NoteStore>,
        store: Arc<RwLock<VectorStore>>,
        provider: Arc<EmbeddingProvider>,
    }

    fn fixture(dimension: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let notes: Arc<dyn NoteStore> =
            Arc::new(BackendCsv::load(&dir.path().join("notes.csv")).unwrap());
        let snapshot = SnapshotStore::new(dir.path().join("vectors.bin"));
        let store = Arc::new(RwLock::new(
            VectorStore::open(dimension, 5, snapshot, [1u8; 32]).unwrap(),
        ));
        let provider = Arc::new(EmbeddingProvider::new(None, dimension, true));
        let retriever = Retriever::new(store.clone(), notes.clone(), provider.clone(), 5);
        Fixture {
            _dir: dir,
            retriever,
            notes,
            store,
            provider,
        }
    }

    fn add_note(fx: &Fixture, title: &str, content: &str) -> Note {
        let note = fx
            .notes
            .create(NoteCreate {
                title: title.to_string(),
                content: content.to_string(),
                ..Default::default()
            })
            .unwrap();
        let text = format!("{title}\n{content}");
        let embedding = fx.provider.embed(&text).unwrap();
        fx.store
            .write()
            .unwrap()
            .add_vector(note.id.as_str(), embedding.vector, VectorMetadata::default())
            .unwrap();
        note
    }

    #[test]
    fn test_retrieve_empty_store() {
        let fx = fixture(64);
        let results = fx
            .retriever
            .retrieve("anything", None, &SearchFilter::default())
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_retrieve_finds_closest_note() {
        let fx = fixture(256);
        let grocery = add_note(&fx, "Buy milk", "milk and eggs from the store");
        add_note(&fx, "Quarterly finance", "revenue report for the quarter");

        let results = fx
            .retriever
            .retrieve("buy milk and eggs", None, &SearchFilter::default())
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].note.id, grocery.id);
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn test_retrieve_respects_top_k() {
        let fx = fixture(64);
        for i in 0..8 {
            add_note(&fx, &format!("note {i}"), "shared words in every note");
        }

        let results = fx
            .retriever
            .retrieve("shared words", Some(3), &SearchFilter::default())
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_stale_store_entry_dropped() {
        let fx = fixture(64);
        let note = add_note(&fx, "Doomed", "this note will be deleted");

        // delete the note but leave its vector behind
        fx.notes.delete(&note.id).unwrap();

        let results = fx
            .retriever
            .retrieve("deleted note", None, &SearchFilter::default())
            .unwrap();
        assert!(results.iter().all(|r| r.note.id != note.id));
    }

    #[test]
    fn test_hybrid_prefers_agreement() {
        let fx = fixture(256);
        add_note(&fx, "Milk note", "buy milk today");
        add_note(&fx, "Other errands", "post office and bank");

        let results = fx
            .retriever
            .retrieve_hybrid("buy milk", None, 0.7, &SearchFilter::default())
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].note.title, "Milk note");
    }

    #[test]
    fn test_hybrid_weight_zero_is_lexical() {
        let fx = fixture(64);
        add_note(&fx, "Milk", "milk milk milk");
        add_note(&fx, "Cheese", "all about cheese");

        let results = fx
            .retriever
            .retrieve_hybrid("cheese", None, 0.0, &SearchFilter::default())
            .unwrap();
        assert_eq!(results[0].note.title, "Cheese");
    }
}
