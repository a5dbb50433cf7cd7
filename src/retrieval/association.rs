//! Note-to-embedding association records.
//!
//! One record per embedded note, tracking which content hash and model the
//! stored vector was produced from. The consistency pipeline consults these
//! to decide whether a note needs re-embedding.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::eid::Eid;
use crate::storage::StorageManager;

const ASSOCIATIONS_FILE: &str = "embeddings.json";

fn default_chunk_index() -> u32 {
    0
}

/// Persistent link between a note and its stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub note_id: Eid,
    /// SHA-256 hex of the note text the vector was computed from.
    pub content_hash: String,
    /// Model that produced the vector.
    pub model: String,
    /// Reserved for future multi-chunk embedding; always 0 today.
    #[serde(default = "default_chunk_index")]
    pub chunk_index: u32,
    pub embedded_at: i64,
}

/// JSON-file-backed collection of [`EmbeddingRecord`]s.
pub struct AssociationStore {
    storage: Arc<dyn StorageManager>,
}

impl AssociationStore {
    pub fn new(storage: Arc<dyn StorageManager>) -> Self {
        Self { storage }
    }

    /// All records. A missing or unreadable file yields an empty list; the
    /// pipeline re-creates records as notes are re-embedded.
    pub fn read_all(&self) -> Vec<EmbeddingRecord> {
        if !self.storage.exists(ASSOCIATIONS_FILE) {
            return vec![];
        }

        let bytes = match self.storage.read(ASSOCIATIONS_FILE) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("failed to read embedding associations: {err}");
                return vec![];
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(records) => records,
            Err(err) => {
                log::error!("failed to parse embedding associations: {err}");
                vec![]
            }
        }
    }

    pub fn get(&self, note_id: &Eid) -> Option<EmbeddingRecord> {
        self.read_all()
            .into_iter()
            .find(|r| &r.note_id == note_id)
    }

    /// Insert or replace the record for a note.
    pub fn upsert(&self, record: EmbeddingRecord) -> anyhow::Result<()> {
        let mut records = self.read_all();
        records.retain(|r| r.note_id != record.note_id);
        records.push(record);
        self.write_all(&records)
    }

    /// Drop the record for a note. No-op when absent.
    pub fn remove(&self, note_id: &Eid) -> anyhow::Result<()> {
        let mut records = self.read_all();
        let before = records.len();
        records.retain(|r| &r.note_id != note_id);
        if records.len() == before {
            return Ok(());
        }
        self.write_all(&records)
    }

    fn write_all(&self, records: &[EmbeddingRecord]) -> anyhow::Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        self.storage.write(ASSOCIATIONS_FILE, &bytes)?;
        Ok(())
    }
}
