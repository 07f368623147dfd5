//! Binary storage for vector embeddings.
//!
//! File format: vectors-<mode>.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated):
//! - id: u16 length + UTF-8 bytes
//! - scope: u16 length + UTF-8 bytes
//! - seq: u64 (little-endian)
//! - metadata: u32 length + JSON object bytes
//! - embedding: [f32; dimensions] (little-endian)

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::dedup::TabScope;
use crate::semantic::index::{VectorEntry, VectorIndex};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Longest id or scope that fits the u16 length prefix
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Upper bound for the JSON metadata of one entry
pub const MAX_METADATA_LEN: usize = 1024 * 1024;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Storage manager for vector embeddings.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the vector index from storage.
    ///
    /// Fails when the file was written by another model or with other dimensions.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<VectorIndex, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = read_header(&mut reader)?;
        validate_header(&header, expected_model_id, expected_dimensions)?;

        let mut index =
            VectorIndex::with_capacity(header.dimensions as usize, header.entry_count as usize);

        for _ in 0..header.entry_count {
            let (id, entry) = read_entry(&mut reader, header.dimensions as usize)?;
            // Skip entries that fail to insert (e.g., zero norm)
            if let Err(e) = index.insert_entry(id, entry) {
                log::warn!("skipping stored vector: {e}");
            }
        }

        Ok(index)
    }

    /// Save the vector index to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(&self, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = write_to_file(&temp_path, index, model_id);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn write_to_file(path: &Path, index: &VectorIndex, model_id: &[u8; 32]) -> Result<(), VectorStorageError> {
    let dimensions = u16::try_from(index.dimensions()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("{} dimensions do not fit u16", index.dimensions()))
    })?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write_header(
        &mut writer,
        &Header {
            version: FORMAT_VERSION,
            model_id: *model_id,
            dimensions,
            entry_count: index.len() as u64,
        },
    )?;

    for (id, entry) in index.iter() {
        write_entry(&mut writer, id, entry)?;
    }

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(())
}

fn read_header<R: Read>(reader: &mut R) -> Result<Header, VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes)?;

    let version = header_bytes[0];
    if version > FORMAT_VERSION {
        return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
    }

    let stored_checksum = u32::from_le_bytes(take_array(&header_bytes[43..47]));
    if stored_checksum != compute_checksum(&header_bytes[0..43]) {
        return Err(VectorStorageError::ChecksumMismatch);
    }

    Ok(Header {
        version,
        model_id: take_array(&header_bytes[1..33]),
        dimensions: u16::from_le_bytes(take_array(&header_bytes[33..35])),
        entry_count: u64::from_le_bytes(take_array(&header_bytes[35..43])),
    })
}

fn validate_header(
    header: &Header,
    expected_model_id: &[u8; 32],
    expected_dimensions: usize,
) -> Result<(), VectorStorageError> {
    if header.model_id != *expected_model_id {
        return Err(VectorStorageError::ModelMismatch);
    }

    if header.dimensions as usize != expected_dimensions {
        return Err(VectorStorageError::DimensionMismatch {
            expected: expected_dimensions,
            got: header.dimensions as usize,
        });
    }

    Ok(())
}

fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), VectorStorageError> {
    let mut header_bytes = [0u8; HEADER_SIZE];

    header_bytes[0] = header.version;
    header_bytes[1..33].copy_from_slice(&header.model_id);
    header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
    header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

    let checksum = compute_checksum(&header_bytes[0..43]);
    header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

    writer.write_all(&header_bytes)?;
    Ok(())
}

fn read_entry<R: Read>(reader: &mut R, dimensions: usize) -> Result<(String, VectorEntry), VectorStorageError> {
    let id = read_string(reader)?;
    let scope = TabScope::new(read_string(reader)?);

    let mut seq_bytes = [0u8; 8];
    reader.read_exact(&mut seq_bytes)?;
    let seq = u64::from_le_bytes(seq_bytes);

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let meta_len = u32::from_le_bytes(len_bytes) as usize;
    if meta_len > MAX_METADATA_LEN {
        return Err(VectorStorageError::InvalidFormat(format!(
            "metadata of {meta_len} bytes exceeds {MAX_METADATA_LEN}"
        )));
    }
    let mut meta_bytes = vec![0u8; meta_len];
    reader.read_exact(&mut meta_bytes)?;
    let metadata: HashMap<String, String> = serde_json::from_slice(&meta_bytes)
        .map_err(|e| VectorStorageError::InvalidFormat(format!("metadata: {e}")))?;

    let mut embedding = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        let mut float_bytes = [0u8; 4];
        reader.read_exact(&mut float_bytes)?;
        embedding.push(f32::from_le_bytes(float_bytes));
    }

    Ok((
        id,
        VectorEntry {
            scope,
            seq,
            metadata,
            embedding,
        },
    ))
}

fn write_entry<W: Write>(writer: &mut W, id: &str, entry: &VectorEntry) -> Result<(), VectorStorageError> {
    write_string(writer, id)?;
    write_string(writer, &entry.scope)?;
    writer.write_all(&entry.seq.to_le_bytes())?;

    let meta_bytes = serde_json::to_vec(&entry.metadata)
        .map_err(|e| VectorStorageError::InvalidFormat(format!("metadata: {e}")))?;
    if meta_bytes.len() > MAX_METADATA_LEN {
        return Err(VectorStorageError::InvalidFormat(format!(
            "metadata of {} bytes exceeds {MAX_METADATA_LEN}",
            meta_bytes.len()
        )));
    }
    let meta_len = meta_bytes.len() as u32;
    writer.write_all(&meta_len.to_le_bytes())?;
    writer.write_all(&meta_bytes)?;

    for &value in &entry.embedding {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, VectorStorageError> {
    let mut len_bytes = [0u8; 2];
    reader.read_exact(&mut len_bytes)?;
    let mut bytes = vec![0u8; u16::from_le_bytes(len_bytes) as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| VectorStorageError::InvalidFormat(e.to_string()))
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<(), VectorStorageError> {
    let len = u16::try_from(value.len()).map_err(|_| {
        VectorStorageError::InvalidFormat(format!("string of {} bytes is too long", value.len()))
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn take_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

fn compute_checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}
