//! Flat file table with lazy load and explicit persist
//!
//! A table materializes one flat file as an ordered key/value map. The backing
//! file is read at most once between invalidations, triggered by the first
//! access; mutations stay in memory until `persist` is called.

use crate::codec::{self, Record, Value};
use crate::error::{Result, UgmError};
use std::fs;
use std::path::{Path, PathBuf};

/// A single flat file materialized as an ordered key/value map
#[derive(Debug)]
pub struct FileTable {
    path: PathBuf,
    delimiter: String,
    data: Option<Record>,
}

impl FileTable {
    /// Create a table over `path`; nothing is read until first access
    pub fn new(path: impl Into<PathBuf>, delimiter: &str) -> Self {
        FileTable {
            path: path.into(),
            delimiter: delimiter.to_string(),
            data: None,
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&mut self) -> Result<&mut Record> {
        if self.data.is_none() {
            let record = if self.path.is_file() {
                let raw = fs::read(&self.path)?;
                let record = codec::decode(&raw, &self.delimiter);
                tracing::debug!(
                    "loaded {} entries from {}",
                    record.len(),
                    self.path.display()
                );
                record
            } else {
                Record::new()
            };
            self.data = Some(record);
        }
        Ok(self.data.get_or_insert_with(Record::new))
    }

    /// Look up a value, failing with `KeyNotFound` if absent
    pub fn get(&mut self, key: &str) -> Result<Value> {
        self.record()?
            .get(key)
            .cloned()
            .ok_or_else(|| UgmError::KeyNotFound(key.to_string()))
    }

    /// Whether the table holds `key`
    pub fn contains(&mut self, key: &str) -> Result<bool> {
        Ok(self.record()?.contains_key(key))
    }

    /// Upsert a value in memory; no disk write
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.record()?.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a key from memory, failing with `KeyNotFound` if absent
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.record()?
            .shift_remove(key)
            .map(|_| ())
            .ok_or_else(|| UgmError::KeyNotFound(key.to_string()))
    }

    /// Keys in table order
    pub fn keys(&mut self) -> Result<Vec<String>> {
        Ok(self.record()?.keys().cloned().collect())
    }

    /// Write the in-memory map to the backing file.
    ///
    /// A table that was never loaded only creates the file if missing; it
    /// never overwrites on-disk data it has not read.
    pub fn persist(&mut self) -> Result<()> {
        match &self.data {
            None => {
                if !self.path.exists() {
                    if let Some(parent) = self.path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    fs::write(&self.path, b"")?;
                }
            }
            Some(record) => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&self.path, codec::encode(record, &self.delimiter))?;
                tracing::debug!(
                    "wrote {} entries to {}",
                    record.len(),
                    self.path.display()
                );
            }
        }
        Ok(())
    }

    /// Drop the in-memory map; the next access reloads from disk.
    ///
    /// Invalidation is whole-table only, there is no per-key variant.
    pub fn invalidate(&mut self) {
        self.data = None;
    }
}
