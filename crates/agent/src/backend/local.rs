//! Local compiler backend.
//!
//! Serves a catalog document from a file. It has no notion of when the
//! catalog last changed, so it always reports a freshness far in the future
//! and every run recompiles (re-reads the file).

use crate::backend::{CompilerBackend, escape};
use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;

/// Seconds added to "now" so a local catalog is never considered fresh.
const ALWAYS_STALE: i64 = 1000;

#[derive(Debug, Clone)]
pub struct LocalBackend {
    path: PathBuf,
}

impl LocalBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CompilerBackend for LocalBackend {
    fn freshness(&self, _node: &str) -> Result<i64> {
        Ok(chrono::Utc::now().timestamp() + ALWAYS_STALE)
    }

    fn compile(&self, _node: &str, _facts: &str) -> Result<String> {
        let text = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(escape(&text))
    }

    fn is_local(&self) -> bool {
        true
    }
}
