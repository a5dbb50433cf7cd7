//! End-to-end tests through the App layer: note mutations feed the
//! pipeline, searches go through the retriever, and everything survives a
//! restart.

use std::sync::Arc;

use crate::app::{App, SearchOpts};
use crate::config::Config;
use crate::notes::{BackendCsv, NoteCreate, NoteStore, NoteUpdate};
use crate::retrieval::embeddings::{
    Embedder, EmbeddingError, EmbeddingProvider, HashEmbedder,
};
use crate::storage::{BackendLocal, StorageManager};

const DIMENSION: usize = 128;

fn test_config() -> Config {
    let mut config = Config::default();
    config.retrieval.dimension = DIMENSION;
    config
}

/// Creates an isolated App using a unique temp directory.
/// Each test gets its own directory so parallel tests never collide,
/// and no real data is touched.
fn create_app(dir: &tempfile::TempDir) -> App {
    create_app_with_provider(dir, EmbeddingProvider::new(None, DIMENSION, true))
}

fn create_app_with_provider(dir: &tempfile::TempDir, provider: EmbeddingProvider) -> App {
    let storage: Arc<dyn StorageManager> =
        Arc::new(BackendLocal::new(dir.path().to_str().unwrap()).unwrap());
    let notes: Arc<dyn NoteStore> =
        Arc::new(BackendCsv::load(&dir.path().join("notes.csv")).unwrap());
    App::init_with_provider(test_config(), dir.path(), storage, notes, Arc::new(provider))
        .expect("failed to init app")
}

fn add(app: &App, title: &str, content: &str) -> crate::notes::Note {
    app.create_note(NoteCreate {
        title: title.to_string(),
        content: content.to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_create_embeds_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    let note = add(&app, "Buy milk", "and eggs from the store");
    app.shutdown();

    let reloaded = app.get_note(&note.id).unwrap().unwrap();
    assert!(reloaded.has_embedding);
}

#[test]
fn test_search_finds_created_note() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    add(&app, "Buy milk", "milk and eggs from the store");
    add(&app, "Quarterly finance", "revenue report for the quarter");
    app.shutdown();

    let results = app
        .search("buy milk and eggs", &SearchOpts::default())
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].note.title, "Buy milk");
}

#[test]
fn test_semantic_only_search() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    add(&app, "Grocery", "milk eggs bread");
    app.shutdown();

    let results = app
        .search(
            "milk eggs",
            &SearchOpts {
                semantic_only: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].score > 0.0);
}

#[test]
fn test_update_without_text_change_keeps_embedding_current() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);
    let note = add(&app, "Stable", "unchanged body");
    app.shutdown();

    let app = create_app(&dir);
    // tag-only update leaves title and content alone
    let updated = app
        .update_note(
            &note.id,
            NoteUpdate {
                append_tags: Some(vec!["later".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(updated.has_embedding);
}

#[test]
fn test_update_content_reembeds() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);
    let note = add(&app, "Draft", "first version");
    app.shutdown();

    let mut app = create_app(&dir);
    app.update_note(
        &note.id,
        NoteUpdate {
            content: Some("second version entirely".to_string()),
            ..Default::default()
        },
    )
    .unwrap();
    app.shutdown();

    let reloaded = app.get_note(&note.id).unwrap().unwrap();
    assert!(reloaded.has_embedding);

    // the new content is findable
    let results = app
        .search("second version", &SearchOpts::default())
        .unwrap();
    assert_eq!(results[0].note.id, note.id);
}

#[test]
fn test_delete_removes_from_search() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    let keep = add(&app, "Keeper", "stays around");
    let gone = add(&app, "Goner", "will be deleted");
    app.shutdown();

    let mut app = create_app(&dir);
    app.delete_note(&gone.id).unwrap();
    app.shutdown();

    let results = app.search("deleted", &SearchOpts::default()).unwrap();
    assert!(results.iter().all(|r| r.note.id != gone.id));
    assert!(app.get_note(&keep.id).unwrap().is_some());
    assert!(app.get_note(&gone.id).unwrap().is_none());
}

#[test]
fn test_restart_preserves_index() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut app = create_app(&dir);
        add(&app, "Persistent", "survives a restart");
        app.shutdown();
    }

    // fresh process: no reindex, the snapshot carries the vectors
    let app = create_app(&dir);
    let results = app
        .search("survives restart", &SearchOpts::default())
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].note.title, "Persistent");
}

#[test]
fn test_category_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    app.create_note(NoteCreate {
        title: "Work meeting".to_string(),
        content: "project sync notes".to_string(),
        category: Some("work".to_string()),
        ..Default::default()
    })
    .unwrap();
    app.create_note(NoteCreate {
        title: "Home project".to_string(),
        content: "project for the garage".to_string(),
        category: Some("personal".to_string()),
        ..Default::default()
    })
    .unwrap();
    app.shutdown();

    let results = app
        .search(
            "project",
            &SearchOpts {
                semantic_only: true,
                category: Some("work".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].note.title, "Work meeting");
}

struct FlakyEmbedder;

impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.contains("unlucky") {
            return Err(EmbeddingError::Request("connection refused".to_string()));
        }
        HashEmbedder::new(DIMENSION).embed(text)
    }
}

#[test]
fn test_reindex_reports_failures() {
    let dir = tempfile::tempdir().unwrap();

    // seed notes; three of them always fail to embed
    {
        let mut app = create_app_with_provider(
            &dir,
            EmbeddingProvider::new(Some(Box::new(FlakyEmbedder)), DIMENSION, false),
        );
        for i in 0..25 {
            let content = if i < 3 {
                "unlucky note".to_string()
            } else {
                format!("regular note number {i}")
            };
            add(&app, &format!("note {i}"), &content);
        }
        app.shutdown();
    }

    let mut app = create_app_with_provider(
        &dir,
        EmbeddingProvider::new(Some(Box::new(FlakyEmbedder)), DIMENSION, false),
    );
    let report = app.reindex(Some(10)).unwrap();
    app.shutdown();

    assert_eq!(report.processed, 22);
    assert_eq!(report.errors, 3);

    let embedded = app
        .list_notes()
        .unwrap()
        .into_iter()
        .filter(|n| n.has_embedding)
        .count();
    assert_eq!(embedded, 22);
}

#[test]
fn test_status_counts() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    add(&app, "One", "first note");
    add(&app, "Two", "second note");
    add(&app, "", "   "); // nothing to embed
    app.shutdown();

    let status = app.status().unwrap();
    assert_eq!(status.notes, 3);
    assert_eq!(status.embedded_notes, 2);
    assert_eq!(status.indexed_vectors, 2);
    assert_eq!(status.dimension, DIMENSION);
    assert_eq!(status.model, "fnv1a-hash-fallback");
}

#[test]
fn test_tags_and_categories_listing() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = create_app(&dir);

    app.create_note(NoteCreate {
        title: "a".to_string(),
        tags: Some(vec!["x".to_string(), "y".to_string()]),
        category: Some("work".to_string()),
        ..Default::default()
    })
    .unwrap();
    app.create_note(NoteCreate {
        title: "b".to_string(),
        tags: Some(vec!["y".to_string()]),
        ..Default::default()
    })
    .unwrap();
    app.shutdown();

    assert_eq!(app.distinct_tags().unwrap(), vec!["x", "y"]);
    assert_eq!(app.distinct_categories().unwrap(), vec!["work"]);
}
