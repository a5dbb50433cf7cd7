//! Binary snapshot persistence for the vector store.
//!
//! File format: vectors.bin
//!
//! Header (55 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA-256 hash of the embedding model name)
//! - dimension: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - saved_at: i64 epoch millis (little-endian)
//! - checksum: u32 (CRC32 of the header bytes before the checksum)
//!
//! Entries (repeated, in insertion order):
//! - id_len: u16, then id bytes (UTF-8)
//! - added_at: i64, updated_at: i64 (little-endian)
//! - vector: [f32; dimension] (little-endian)
//! - meta_len: u32, then metadata as JSON bytes
//!
//! The snapshot is the entire store state. It is rewritten in full after
//! every mutation, via temp file + rename, so a reader never observes a
//! partially written file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::retrieval::store::{VectorMetadata, VectorRecord};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimension(2) +
/// entry_count(8) + saved_at(8) + checksum(4)
const HEADER_SIZE: usize = 55;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid snapshot format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("model mismatch: snapshot was built with a different embedding model")]
    ModelMismatch,

    #[error("checksum mismatch: snapshot file may be corrupted")]
    ChecksumMismatch,

    #[error("dimension mismatch: expected {expected}, snapshot has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// One deserialized record from a snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: String,
    pub record: VectorRecord,
}

/// Full contents of a snapshot file.
#[derive(Debug)]
pub struct SnapshotData {
    pub dimension: usize,
    pub saved_at: i64,
    pub entries: Vec<SnapshotEntry>,
}

/// Reads and writes vector store snapshots at a fixed path.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the full snapshot, validating version, model and dimension.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimension: usize,
    ) -> Result<SnapshotData, SnapshotError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;

        if header.model_id != *expected_model_id {
            return Err(SnapshotError::ModelMismatch);
        }
        if header.dimension as usize != expected_dimension {
            return Err(SnapshotError::DimensionMismatch {
                expected: expected_dimension,
                got: header.dimension as usize,
            });
        }

        let mut entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            entries.push(read_entry(&mut reader, header.dimension as usize)?);
        }

        Ok(SnapshotData {
            dimension: header.dimension as usize,
            saved_at: header.saved_at,
            entries,
        })
    }

    /// Write the full record set atomically: temp file -> fsync -> rename.
    pub fn save(
        &self,
        dimension: usize,
        model_id: &[u8; 32],
        entries: &[(&str, &VectorRecord)],
    ) -> Result<(), SnapshotError> {
        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, dimension, model_id, entries);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    pub fn delete(&self) -> Result<(), SnapshotError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        dimension: usize,
        model_id: &[u8; 32],
        entries: &[(&str, &VectorRecord)],
    ) -> Result<(), SnapshotError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimension: dimension as u16,
            entry_count: entries.len() as u64,
            saved_at: chrono::Utc::now().timestamp_millis(),
        };
        write_header(&mut writer, &header)?;

        for (id, record) in entries {
            write_entry(&mut writer, id, record)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimension: u16,
    entry_count: u64,
    saved_at: i64,
}

fn read_header(reader: &mut BufReader<File>) -> Result<Header, SnapshotError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(SnapshotError::VersionMismatch(version, FORMAT_VERSION));
    }

    let mut model_id = [0u8; 32];
    model_id.copy_from_slice(&header_bytes[1..33]);

    let dimension = u16::from_le_bytes(header_bytes[33..35].try_into().unwrap());
    let entry_count = u64::from_le_bytes(header_bytes[35..43].try_into().unwrap());
    let saved_at = i64::from_le_bytes(header_bytes[43..51].try_into().unwrap());
    let stored_checksum = u32::from_le_bytes(header_bytes[51..55].try_into().unwrap());

    let computed_checksum = crc32fast::hash(&header_bytes[0..51]);
    if stored_checksum != computed_checksum {
        return Err(SnapshotError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        model_id,
        dimension,
        entry_count,
        saved_at,
    })
}

fn write_header(writer: &mut BufWriter<File>, header: &Header) -> Result<(), SnapshotError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimension.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());
    header_bytes[43..51].copy_from_slice(&header.saved_at.to_le_bytes());

    let checksum = crc32fast::hash(&header_bytes[0..51]);
    header_bytes[51..55].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_entry(
    reader: &mut BufReader<File>,
    dimension: usize,
) -> Result<SnapshotEntry, SnapshotError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let id_len = u16::from_le_bytes(len_bytes) as usize;

    let mut id_bytes = vec![0u8; id_len];
    reader.read_exact(&mut id_bytes)?;
    let id = String::from_utf8(id_bytes)
        .map_err(|e| SnapshotError::InvalidFormat(format!("entry id is not UTF-8: {e}")))?;

    let mut ts_bytes = [0u8; 8];
    reader.read_exact(&mut ts_bytes)?;
    let added_at = i64::from_le_bytes(ts_bytes);
    reader.read_exact(&mut ts_bytes)?;
    let updated_at = i64::from_le_bytes(ts_bytes);

    let mut vector = Vec::with_capacity(dimension);
    let mut float_bytes = [0u8; 4];
    for _ in 0..dimension {
        reader.read_exact(&mut float_bytes)?;
        vector.push(f32::from_le_bytes(float_bytes));
    }

    let mut meta_len_bytes = [0u8; 4];
    reader.read_exact(&mut meta_len_bytes)?;
    let meta_len = u32::from_le_bytes(meta_len_bytes) as usize;

    let mut meta_bytes = vec![0u8; meta_len];
    reader.read_exact(&mut meta_bytes)?;
    let metadata: VectorMetadata = serde_json::from_slice(&meta_bytes)
        .map_err(|e| SnapshotError::InvalidFormat(format!("bad entry metadata: {e}")))?;

    Ok(SnapshotEntry {
        id,
        record: VectorRecord::restored(vector, metadata, added_at, updated_at),
    })
}

fn write_entry(
    writer: &mut BufWriter<File>,
    id: &str,
    record: &VectorRecord,
) -> Result<(), SnapshotError> {
    let id_bytes = id.as_bytes();
    if id_bytes.len() > u16::MAX as usize {
        return Err(SnapshotError::InvalidFormat(format!(
            "entry id too long: {} bytes",
            id_bytes.len()
        )));
    }
    writer.write_all(&(id_bytes.len() as u16).to_le_bytes())?;
    writer.write_all(id_bytes)?;

    writer.write_all(&record.added_at.to_le_bytes())?;
    writer.write_all(&record.updated_at.to_le_bytes())?;

    for &value in &record.vector {
        writer.write_all(&value.to_le_bytes())?;
    }

    let meta_bytes = serde_json::to_vec(&record.metadata)
        .map_err(|e| SnapshotError::InvalidFormat(format!("unserializable metadata: {e}")))?;
    writer.write_all(&(meta_bytes.len() as u32).to_le_bytes())?;
    writer.write_all(&meta_bytes)?;

    Ok(())
}
