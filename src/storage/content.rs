//! Fetched content persistence
//!
//! The crawler only keeps the opaque reference a content store hands back;
//! how and where the bytes live is up to the store.

use crate::storage::traits::{StorageError, StorageResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A sink for fetched page content
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` under `reference` and returns the reference to persist
    ///
    /// # Arguments
    ///
    /// * `reference` - Suggested name for the object
    /// * `bytes` - The payload
    /// * `compressed` - Whether `bytes` are already gzip-compressed
    fn put(&self, reference: &str, bytes: &[u8], compressed: bool) -> StorageResult<String>;
}

/// Stores content as files in a local directory
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ContentStore for LocalContentStore {
    fn put(&self, reference: &str, bytes: &[u8], compressed: bool) -> StorageResult<String> {
        let file_name = Path::new(reference)
            .file_name()
            .filter(|name| name.to_string_lossy() == reference)
            .ok_or_else(|| {
                StorageError::Serialization(format!("invalid content reference: {}", reference))
            })?;

        let mut path = self.root.join(file_name);
        if compressed && path.extension().map_or(true, |ext| ext != "gz") {
            let mut name = file_name.to_os_string();
            name.push(".gz");
            path = self.root.join(name);
        }

        fs::create_dir_all(&self.root)?;
        fs::write(&path, bytes)?;

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Gzip-compresses a payload
pub fn gzip_bytes(bytes: &[u8]) -> StorageResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}
