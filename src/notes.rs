use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    hash::Hash,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Instant,
};

use crate::eid::Eid;
use crate::retrieval::lexical;

#[derive(Debug, Clone, Eq, Default, Serialize, Deserialize)]
pub struct Note {
    pub id: Eid,

    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub category: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,

    /// Whether a current embedding exists for this note.
    #[serde(default)]
    pub has_embedding: bool,
}

impl Hash for Note {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteCreate {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_tags: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

pub trait NoteStore: Send + Sync {
    fn create(&self, note: NoteCreate) -> anyhow::Result<Note>;
    fn update(&self, id: &Eid, update: NoteUpdate) -> anyhow::Result<Note>;
    fn delete(&self, id: &Eid) -> anyhow::Result<()>;
    fn find_by_id(&self, id: &Eid) -> anyhow::Result<Option<Note>>;
    /// Notes in the order of `ids`; unknown ids are silently dropped.
    fn find_by_ids(&self, ids: &[Eid]) -> anyhow::Result<Vec<Note>>;
    fn list(&self) -> anyhow::Result<Vec<Note>>;
    fn distinct_tags(&self) -> anyhow::Result<Vec<String>>;
    fn distinct_categories(&self) -> anyhow::Result<Vec<String>>;
    fn set_has_embedding(&self, id: &Eid, value: bool) -> anyhow::Result<()>;
    /// Keyword-ranked note ids, best first.
    fn full_text_search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Eid>>;
}

/// Split a comma-separated tag string, dropping empties and duplicates.
pub fn parse_tags(tags: String) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Note>>>,
    path: PathBuf,
}

const CSV_HEADERS: [&str; 8] = [
    "id",
    "title",
    "content",
    "tags",
    "category",
    "created_at",
    "updated_at",
    "has_embedding",
];

impl BackendCsv {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("creating new note database at {path:?}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut notes = vec![];
        for record in csv_reader.records() {
            let record = record?;
            let field = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("couldnt get record {name}"))
            };

            let id = Eid::from(field(0, "id")?);
            let title = field(1, "title")?;
            let content = field(2, "content")?;
            let tags = parse_tags(field(3, "tags")?);
            let category = field(4, "category")?;
            let created_at = field(5, "created_at")?.parse::<i64>()?;
            let updated_at = field(6, "updated_at")?.parse::<i64>()?;
            let has_embedding = field(7, "has_embedding")? == "1";

            notes.push(Note {
                id,
                title,
                content,
                tags,
                category: if category.is_empty() {
                    None
                } else {
                    Some(category)
                },
                created_at,
                updated_at,
                has_embedding,
            });
        }

        log::debug!(
            "took {}ms to read csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(notes)),
            path: path.to_path_buf(),
        })
    }

    fn save(&self) -> anyhow::Result<()> {
        let notes = self.list.write().unwrap();

        let temp_path = self.path.with_extension("csv-tmp");
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for note in notes.iter() {
            csv_wrt.write_record([
                note.id.as_str(),
                &note.title,
                &note.content,
                &note.tags.join(","),
                note.category.as_deref().unwrap_or_default(),
                &note.created_at.to_string(),
                &note.updated_at.to_string(),
                if note.has_embedding { "1" } else { "0" },
            ])?;
        }
        csv_wrt.flush()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl NoteStore for BackendCsv {
    fn create(&self, note_create: NoteCreate) -> anyhow::Result<Note> {
        let mut tags = note_create.tags.unwrap_or_default();
        let mut seen = HashSet::new();
        tags.retain(|item| seen.insert(item.clone()));

        let now = chrono::Utc::now().timestamp_millis();
        let note = Note {
            id: Eid::new(),
            title: note_create.title,
            content: note_create.content,
            tags,
            category: note_create.category,
            created_at: now,
            updated_at: now,
            has_embedding: false,
        };

        self.list.write().unwrap().push(note.clone());
        self.save()?;

        Ok(note)
    }

    fn update(&self, id: &Eid, update: NoteUpdate) -> anyhow::Result<Note> {
        let mut notes = self.list.write().unwrap();

        let note = notes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| anyhow!("note with id {id} not found"))?;

        if let Some(title) = update.title {
            note.title = title;
        }
        if let Some(content) = update.content {
            note.content = content;
        }

        if let Some(tags) = update.tags {
            note.tags = tags;
            let mut seen = HashSet::new();
            note.tags.retain(|item| seen.insert(item.clone()));
        }

        if let Some(delete_tags) = update.remove_tags {
            note.tags.retain(|item| !delete_tags.iter().any(|t| t == item));
        }

        if let Some(mut tags) = update.append_tags {
            note.tags.append(&mut tags);
            let mut seen = HashSet::new();
            note.tags.retain(|item| seen.insert(item.clone()));
        }

        if let Some(category) = update.category {
            note.category = if category.is_empty() {
                None
            } else {
                Some(category)
            };
        }

        note.updated_at = chrono::Utc::now().timestamp_millis();

        let result = note.clone();
        drop(notes);

        self.save()?;

        Ok(result)
    }

    fn delete(&self, id: &Eid) -> anyhow::Result<()> {
        let mut notes = self.list.write().unwrap();
        let removed = notes.iter().position(|n| &n.id == id).map(|idx| {
            notes.remove(idx);
        });

        drop(notes);

        if removed.is_some() {
            self.save()?;
        }

        Ok(())
    }

    fn find_by_id(&self, id: &Eid) -> anyhow::Result<Option<Note>> {
        let notes = self.list.read().unwrap();
        Ok(notes.iter().find(|n| &n.id == id).cloned())
    }

    fn find_by_ids(&self, ids: &[Eid]) -> anyhow::Result<Vec<Note>> {
        let notes = self.list.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| notes.iter().find(|n| &n.id == id).cloned())
            .collect())
    }

    fn list(&self) -> anyhow::Result<Vec<Note>> {
        Ok(self.list.read().unwrap().clone())
    }

    fn distinct_tags(&self) -> anyhow::Result<Vec<String>> {
        let notes = self.list.read().unwrap();
        let mut tags: Vec<String> = notes
            .iter()
            .flat_map(|n| n.tags.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        tags.sort();
        Ok(tags)
    }

    fn distinct_categories(&self) -> anyhow::Result<Vec<String>> {
        let notes = self.list.read().unwrap();
        let mut categories: Vec<String> = notes
            .iter()
            .filter_map(|n| n.category.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        categories.sort();
        Ok(categories)
    }

    fn set_has_embedding(&self, id: &Eid, value: bool) -> anyhow::Result<()> {
        let mut notes = self.list.write().unwrap();
        let note = notes
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| anyhow!("note with id {id} not found"))?;

        if note.has_embedding == value {
            return Ok(());
        }
        note.has_embedding = value;
        drop(notes);

        self.save()?;
        Ok(())
    }

    fn full_text_search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<Eid>> {
        let notes = self.list.read().unwrap();
        let mut results = lexical::score_lexical(query, &notes);
        results.truncate(limit);
        Ok(results.into_iter().map(|r| r.id).collect())
    }
}
