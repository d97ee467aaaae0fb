//! Storage backends for index files.
//!
//! The index engine never touches the file system directly; it reads and
//! writes named blobs through the [`Storage`] trait. Two backends exist:
//!
//! - [`file::FileStorage`]: one file per blob under an index directory
//! - [`memory::MemoryStorage`]: a process-local map, used by tests
//!
//! Backends are created from a serializable [`StorageConfig`] through
//! [`StorageFactory`].

pub mod file;
pub mod memory;

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

/// A readable blob.
pub trait StorageInput: Read + Send + std::fmt::Debug {}

/// A writable blob.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffered bytes and make them durable.
    fn flush_and_sync(&mut self) -> Result<()>;
}

/// A flat namespace of named blobs.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing blob for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a blob for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Create a blob only if it does not exist yet.
    ///
    /// Returns `false` when the blob already exists.
    fn create_exclusive(&self, name: &str, contents: &[u8]) -> Result<bool>;

    fn file_exists(&self, name: &str) -> bool;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Atomically replace `to` with `from`.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    fn list_files(&self) -> Result<Vec<String>>;

    /// Read a whole blob into memory.
    fn read_bytes(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Write a whole blob and sync it.
    fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut output = self.create_output(name)?;
        output.write_all(bytes)?;
        output.flush_and_sync()
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    File(FileStorageConfig),
    Memory(MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File(FileStorageConfig::new("./index"))
    }
}

/// Creates storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::File(file_config) => Ok(Arc::new(FileStorage::new(file_config)?)),
            StorageConfig::Memory(memory_config) => Ok(Arc::new(MemoryStorage::new(memory_config))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_memory() {
        let storage =
            StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default())).unwrap();
        storage.write_bytes("a.bin", b"hello").unwrap();
        assert_eq!(storage.read_bytes("a.bin").unwrap(), b"hello");
    }

    #[test]
    fn test_config_serde() {
        let json = r#"{"type":"file","path":"/var/lib/sift"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        match config {
            StorageConfig::File(file) => assert_eq!(file.path.to_str(), Some("/var/lib/sift")),
            StorageConfig::Memory(_) => panic!("expected file storage"),
        }
    }
}
