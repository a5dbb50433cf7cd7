//! Consistency pipeline between the note store and the vector store.
//!
//! Note mutations enqueue tasks on an mpsc channel; a single worker thread
//! drains them in FIFO order so embedding work never blocks the caller.
//! Shutdown is graceful: a sentinel task lets the worker finish everything
//! already queued before it exits.

use std::sync::{
    mpsc::{self, Sender},
    Arc, RwLock,
};
use std::thread::JoinHandle;

use anyhow::anyhow;
use indicatif::{ProgressBar, ProgressStyle};

use crate::eid::Eid;
use crate::notes::NoteStore;
use crate::retrieval::association::{AssociationStore, EmbeddingRecord};
use crate::retrieval::embeddings::EmbeddingProvider;
use crate::retrieval::preprocess;
use crate::retrieval::store::{VectorMetadata, VectorStore};

#[derive(Clone, Debug)]
pub enum Task {
    /// (Re-)embed one note and store the vector.
    Embed { note_id: Eid },

    /// Drop a deleted note's vector and association record.
    Remove { note_id: Eid },

    /// Request to gracefully shut down the worker.
    Shutdown,
}

/// Shared handles the pipeline tasks operate on.
#[derive(Clone)]
pub struct PipelineContext {
    pub notes: Arc<dyn NoteStore>,
    pub store: Arc<RwLock<VectorStore>>,
    pub provider: Arc<EmbeddingProvider>,
    pub associations: Arc<AssociationStore>,
}

/// Outcome of a full reindex.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReindexReport {
    pub processed: usize,
    pub errors: usize,
}

pub struct Pipeline {
    task_tx: Sender<Task>,
    worker: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the worker thread and return the handle used to enqueue tasks.
    pub fn start(ctx: PipelineContext) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<Task>();

        let worker = std::thread::spawn(move || {
            log::debug!("waiting for job");
            while let Ok(task) = task_rx.recv() {
                match task {
                    Task::Shutdown => return,
                    Task::Embed { note_id } => {
                        if let Err(err) = embed_note(&ctx, &note_id) {
                            log::error!("failed to embed note {note_id}: {err}");
                        }
                    }
                    Task::Remove { note_id } => {
                        if let Err(err) = remove_note(&ctx, &note_id) {
                            log::error!("failed to remove vectors for note {note_id}: {err}");
                        }
                    }
                }
            }
        });

        Self {
            task_tx,
            worker: Some(worker),
        }
    }

    /// Fire-and-forget enqueue. A send failure means the worker is gone; the
    /// task is lost and a later reindex repairs the gap.
    pub fn enqueue(&self, task: Task) {
        if let Err(err) = self.task_tx.send(task) {
            log::error!("pipeline worker unavailable, task dropped: {err}");
        }
    }

    /// Drain the queue and stop the worker. Everything enqueued before this
    /// call completes first.
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.task_tx.send(Task::Shutdown);
            if worker.join().is_err() {
                log::error!("pipeline worker panicked");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Embed one note and bring store, association record, and note flag in sync.
///
/// Skips silently when the note is gone (deleted while queued), when it has
/// no embeddable text, or when the stored vector is already current for the
/// note's content hash.
pub fn embed_note(ctx: &PipelineContext, note_id: &Eid) -> anyhow::Result<()> {
    let Some(note) = ctx.notes.find_by_id(note_id)? else {
        log::debug!("note {note_id} vanished before embedding, skipping");
        return Ok(());
    };

    let Some(text) = preprocess::preprocess_content(&note.title, &note.content) else {
        log::debug!("note {note_id} has no embeddable text, skipping");
        return Ok(());
    };

    let hash = preprocess::content_hash(&note.title, &note.content);

    let up_to_date = ctx
        .associations
        .get(note_id)
        .map(|record| record.content_hash == hash)
        .unwrap_or(false);
    if up_to_date {
        let store = ctx
            .store
            .read()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        if store.contains(note_id.as_str()) {
            log::debug!("note {note_id} already embedded, skipping");
            return Ok(());
        }
    }

    let embedding = ctx.provider.embed(&text)?;

    let metadata = VectorMetadata {
        category: note.category.clone(),
        ..Default::default()
    };

    {
        let mut store = ctx
            .store
            .write()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        store.add_vector(note_id.as_str(), embedding.vector, metadata)?;
    }

    ctx.associations.upsert(EmbeddingRecord {
        note_id: note_id.clone(),
        content_hash: hash,
        model: embedding.model,
        chunk_index: 0,
        embedded_at: chrono::Utc::now().timestamp_millis(),
    })?;

    ctx.notes.set_has_embedding(note_id, true)?;

    Ok(())
}

/// Remove a deleted note's vector and association record. Best effort on
/// both sides; either may already be gone.
pub fn remove_note(ctx: &PipelineContext, note_id: &Eid) -> anyhow::Result<()> {
    {
        let mut store = ctx
            .store
            .write()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        store.remove_vector(note_id.as_str())?;
    }
    ctx.associations.remove(note_id)?;
    Ok(())
}

/// Rebuild the whole vector store from the note store, in the foreground.
///
/// The store is cleared first; notes are embedded in batches so progress is
/// visible. A failed note is counted and skipped, never aborting the run.
pub fn reindex_all(ctx: &PipelineContext, batch_size: usize) -> anyhow::Result<ReindexReport> {
    let notes = ctx.notes.list()?;

    {
        let mut store = ctx
            .store
            .write()
            .map_err(|e| anyhow!("lock poisoned: {e}"))?;
        store.clear()?;
    }

    let bar = ProgressBar::new(notes.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let batch_size = batch_size.max(1);
    let mut report = ReindexReport::default();

    for batch in notes.chunks(batch_size) {
        for note in batch {
            match embed_note(ctx, &note.id) {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    log::error!("reindex: failed to embed note {}: {err}", note.id);
                    report.errors += 1;
                }
            }
            bar.inc(1);
        }
    }

    bar.finish_with_message(format!(
        "reindexed {} notes, {} errors",
        report.processed, report.errors
    ));

    Ok(report)
}
