//! Retrieval infrastructure for note embeddings.
//!
//! Provides local semantic retrieval over notes: an in-memory vector store
//! with binary snapshot persistence, embedding collaborators with a
//! deterministic fallback, hybrid semantic+keyword ranking, and the
//! consistency pipeline that keeps vectors in step with note mutations.
//!
//! # Architecture
//!
//! - `embeddings`: Remote embedding client plus hash-based fallback
//! - `store`: Authoritative vector store with top-K similarity search
//! - `snapshot`: Binary file I/O for vectors.bin persistence
//! - `similarity`: Vector math primitives
//! - `preprocess`: Text preparation and content hashing
//! - `lexical`: Keyword scoring over note fields
//! - `hybrid`: Rank fusion of semantic and lexical lists
//! - `retriever`: Query orchestration, text in, ranked notes out
//! - `association`: Note-to-embedding bookkeeping records
//! - `pipeline`: Background worker keeping everything consistent

pub mod association;
pub mod embeddings;
pub mod hybrid;
pub mod lexical;
pub mod pipeline;
pub mod preprocess;
pub mod retriever;
pub mod similarity;
pub mod snapshot;
pub mod store;

pub use association::{AssociationStore, EmbeddingRecord};
pub use embeddings::{Embedder, EmbeddingProvider, HashEmbedder, HttpEmbedder};
pub use hybrid::DEFAULT_SEMANTIC_WEIGHT;
pub use pipeline::{Pipeline, PipelineContext, ReindexReport, Task};
pub use preprocess::{content_hash, preprocess_content};
pub use retriever::{RetrieveError, Retriever, ScoredNote};
pub use snapshot::SnapshotStore;
pub use store::{SearchFilter, SearchHit, VectorMetadata, VectorStore};
