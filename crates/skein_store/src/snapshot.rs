//! `MessagePack` snapshots of a [`MemoryStore`].
//!
//! A snapshot holds every collection's documents. Loading one produces a
//! fresh store with zeroed counters.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use skein_foundation::{Document, Error, ErrorKind, Result};

use crate::memory::{Collections, MemoryStore};

#[derive(Serialize, Deserialize)]
struct Snapshot {
    collections: BTreeMap<String, Vec<Document>>,
}

impl MemoryStore {
    /// Serializes every collection to `MessagePack` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            collections: self
                .collections
                .read()
                .iter()
                .map(|(name, docs)| (name.clone(), docs.values().cloned().collect()))
                .collect(),
        };
        rmp_serde::to_vec_named(&snapshot)
            .map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))
    }

    /// Rebuilds a store from `MessagePack` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or a document lacks an `_id`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = rmp_serde::from_slice(bytes)
            .map_err(|e| Error::new(ErrorKind::SerializationError(e.to_string())))?;

        let mut collections = Collections::new();
        for (name, docs) in snapshot.collections {
            let mut by_id = BTreeMap::new();
            for doc in docs {
                let id = doc.id().ok_or_else(|| {
                    Error::new(ErrorKind::SerializationError(format!(
                        "document in {name} has no _id"
                    )))
                })?;
                by_id.insert(id, doc);
            }
            collections.insert(name, by_id);
        }
        Ok(Self::from_collections(collections))
    }

    /// Writes a snapshot file, creating or overwriting it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialization fails.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to create file '{}': {e}",
                path.display()
            )))
        })?;

        let bytes = self.to_bytes()?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes).map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to write to file '{}': {e}",
                path.display()
            )))
        })?;
        writer.flush().map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to flush file '{}': {e}",
                path.display()
            )))
        })?;

        debug!(path = %path.display(), bytes = bytes.len(), "store.snapshot.save");
        Ok(())
    }

    /// Loads a store from a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or deserialization fails.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to open file '{}': {e}",
                path.display()
            )))
        })?;

        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes).map_err(|e| {
            Error::new(ErrorKind::IoError(format!(
                "failed to read file '{}': {e}",
                path.display()
            )))
        })?;

        debug!(path = %path.display(), bytes = bytes.len(), "store.snapshot.load");
        Self::from_bytes(&bytes)
    }
}
