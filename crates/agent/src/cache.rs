//! Last-known-good catalog cache
//!
//! One file per node holding the serialized catalog. Writes go through a
//! temporary file that is renamed into place, so a reader never sees a
//! partially written cache.

use crate::error::{Error, Result};
use crate::storage::write_atomic;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CatalogCache {
    path: PathBuf,
}

impl CatalogCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a cached catalog exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the cached catalog text, if any.
    pub fn read(&self) -> Result<Option<String>> {
        if !self.exists() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|e| Error::io(&self.path, e))
    }

    /// Replace the cached catalog.
    pub fn write(&self, text: &str) -> Result<()> {
        log::info!("Caching catalog at {}", self.path.display());
        write_atomic(&self.path, text.as_bytes())
    }
}
