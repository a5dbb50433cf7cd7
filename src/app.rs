//! Application wiring and high-level operations.
//!
//! Builds the note store, vector store, embedding provider, retriever, and
//! consistency pipeline from the config, and exposes the operations the CLI
//! dispatches to. Note mutations enqueue pipeline tasks; searches go through
//! the retriever.

use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::Context;

use crate::config::Config;
use crate::eid::Eid;
use crate::notes::{self, Note, NoteCreate, NoteStore, NoteUpdate};
use crate::retrieval::{
    self,
    embeddings::{model_id_hash, EmbeddingProvider, HttpEmbedder},
    pipeline::{self, Pipeline, PipelineContext, ReindexReport, Task},
    retriever::{Retriever, ScoredNote},
    store::{SearchFilter, VectorStore},
    AssociationStore, SnapshotStore,
};
use crate::storage::{BackendLocal, StorageManager};

/// Counts reported by the `status` command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Status {
    pub notes: usize,
    pub embedded_notes: usize,
    pub indexed_vectors: usize,
    pub dimension: usize,
    pub model: String,
}

/// Options for a search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOpts {
    pub top_k: Option<usize>,
    /// Overrides the configured hybrid weight.
    pub semantic_weight: Option<f32>,
    /// Skip the lexical ranking entirely.
    pub semantic_only: bool,
    /// Restrict results to one category.
    pub category: Option<String>,
}

pub struct App {
    config: Config,
    notes: Arc<dyn NoteStore>,
    retriever: Retriever,
    pipeline: Pipeline,
    ctx: PipelineContext,
}

impl App {
    pub fn init(config: Config, base_path: &Path) -> anyhow::Result<Self> {
        let base = base_path
            .to_str()
            .context("data directory path is not valid utf8")?;

        let storage: Arc<dyn StorageManager> =
            Arc::new(BackendLocal::new(base).context("failed to open data directory")?);

        let notes: Arc<dyn NoteStore> = Arc::new(
            notes::BackendCsv::load(&base_path.join("notes.csv"))
                .context("failed to load note database")?,
        );

        let primary: Option<Box<dyn retrieval::Embedder>> = match &config.embedding.endpoint {
            Some(endpoint) => Some(Box::new(HttpEmbedder::new(
                endpoint,
                &config.embedding.model,
                config.embedding.timeout_secs,
            )?)),
            None => None,
        };
        let provider = Arc::new(EmbeddingProvider::new(
            primary,
            config.retrieval.dimension,
            config.embedding.fallback_enabled,
        ));

        Self::init_with_provider(config, base_path, storage, notes, provider)
    }

    /// Wiring with a caller-supplied provider. The regular entry point is
    /// [`App::init`]; tests inject mock embedders here.
    pub fn init_with_provider(
        config: Config,
        base_path: &Path,
        storage: Arc<dyn StorageManager>,
        notes: Arc<dyn NoteStore>,
        provider: Arc<EmbeddingProvider>,
    ) -> anyhow::Result<Self> {
        let snapshot = SnapshotStore::new(base_path.join(&config.retrieval.snapshot_file));
        let store = Arc::new(RwLock::new(VectorStore::open(
            config.retrieval.dimension,
            config.retrieval.default_top_k,
            snapshot,
            model_id_hash(provider.model_name()),
        )?));

        let associations = Arc::new(AssociationStore::new(storage));

        let ctx = PipelineContext {
            notes: notes.clone(),
            store: store.clone(),
            provider: provider.clone(),
            associations,
        };

        let retriever = Retriever::new(
            store,
            notes.clone(),
            provider,
            config.retrieval.default_top_k,
        );
        let pipeline = Pipeline::start(ctx.clone());

        Ok(Self {
            config,
            notes,
            retriever,
            pipeline,
            ctx,
        })
    }

    pub fn create_note(&self, create: NoteCreate) -> anyhow::Result<Note> {
        let note = self.notes.create(create)?;
        self.pipeline.enqueue(Task::Embed {
            note_id: note.id.clone(),
        });
        Ok(note)
    }

    /// Update a note; re-embeds only when the embeddable text changed.
    pub fn update_note(&self, id: &Eid, update: NoteUpdate) -> anyhow::Result<Note> {
        let before = self
            .notes
            .find_by_id(id)?
            .map(|n| retrieval::content_hash(&n.title, &n.content));

        let note = self.notes.update(id, update)?;

        let after = retrieval::content_hash(&note.title, &note.content);
        if before.as_deref() != Some(after.as_str()) || !note.has_embedding {
            self.pipeline.enqueue(Task::Embed {
                note_id: note.id.clone(),
            });
        }
        Ok(note)
    }

    pub fn delete_note(&self, id: &Eid) -> anyhow::Result<()> {
        self.notes.delete(id)?;
        self.pipeline.enqueue(Task::Remove { note_id: id.clone() });
        Ok(())
    }

    pub fn get_note(&self, id: &Eid) -> anyhow::Result<Option<Note>> {
        self.notes.find_by_id(id)
    }

    pub fn list_notes(&self) -> anyhow::Result<Vec<Note>> {
        self.notes.list()
    }

    pub fn distinct_tags(&self) -> anyhow::Result<Vec<String>> {
        self.notes.distinct_tags()
    }

    pub fn distinct_categories(&self) -> anyhow::Result<Vec<String>> {
        self.notes.distinct_categories()
    }

    /// Hybrid search by default; pure semantic with `semantic_only`.
    pub fn search(&self, query: &str, opts: &SearchOpts) -> anyhow::Result<Vec<ScoredNote>> {
        let filter = SearchFilter {
            exclude_ids: vec![],
            category: opts.category.clone(),
        };

        let results = if opts.semantic_only {
            self.retriever.retrieve(query, opts.top_k, &filter)?
        } else {
            let weight = opts
                .semantic_weight
                .unwrap_or(self.config.retrieval.semantic_weight);
            self.retriever
                .retrieve_hybrid(query, opts.top_k, weight, &filter)?
        };
        Ok(results)
    }

    /// Note and index counts for the `status` command.
    pub fn status(&self) -> anyhow::Result<Status> {
        let notes = self.notes.list()?;
        let embedded_notes = notes.iter().filter(|n| n.has_embedding).count();
        let (indexed_vectors, dimension) = {
            let store = self
                .ctx
                .store
                .read()
                .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;
            (store.len(), store.dimension())
        };

        Ok(Status {
            notes: notes.len(),
            embedded_notes,
            indexed_vectors,
            dimension,
            model: self.ctx.provider.model_name().to_string(),
        })
    }

    /// Foreground rebuild of the vector store from all notes.
    pub fn reindex(&self, batch_size: Option<usize>) -> anyhow::Result<ReindexReport> {
        let batch_size = batch_size.unwrap_or(self.config.pipeline.batch_size);
        pipeline::reindex_all(&self.ctx, batch_size)
    }

    /// Drain pending pipeline tasks and stop the worker.
    pub fn shutdown(&mut self) {
        self.pipeline.shutdown();
    }
}
