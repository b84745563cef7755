//! Flat env-file configuration store.
//!
//! Each service persists its credentials as `KEY=VALUE` lines in a single
//! text file. Updates merge into the existing keys and rewrite the whole
//! file; keys the caller does not name are preserved verbatim.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from env-file operations.
#[derive(Error, Debug)]
pub enum EnvFileError {
    /// IO error reading or writing the backing file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a `KEY=VALUE` configuration file.
///
/// The file does not need to exist; a missing file reads as an empty map.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
}

impl EnvFile {
    /// Create a handle for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all keys from the backing file.
    ///
    /// Blank lines, `#` comments, and lines without `=` are skipped. Values
    /// split on the first `=` only and are otherwise opaque. A duplicated
    /// key keeps its last occurrence.
    ///
    /// # Errors
    ///
    /// Returns `EnvFileError::Io` if the file exists but cannot be read.
    pub fn load(&self) -> Result<BTreeMap<String, String>, EnvFileError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(parse(&content))
    }

    /// Load the keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns `EnvFileError::Io` if the file exists but cannot be read.
    pub fn load_prefixed(&self, prefix: &str) -> Result<BTreeMap<String, String>, EnvFileError> {
        let mut vars = self.load()?;
        vars.retain(|key, _| key.starts_with(prefix));
        Ok(vars)
    }

    /// Merge `partial` into the persisted keys and rewrite the whole file.
    ///
    /// Keys absent from `partial` — recognized or not — are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `EnvFileError::Io` if the read or the rewrite fails.
    pub fn update(&self, partial: &BTreeMap<String, String>) -> Result<(), EnvFileError> {
        let mut vars = self.load()?;
        for (key, value) in partial {
            vars.insert(key.clone(), value.clone());
        }

        let mut out = String::new();
        for (key, value) in &vars {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        std::fs::write(&self.path, out)?;
        Ok(())
    }
}

fn parse(content: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            vars.insert(key.to_string(), value.to_string());
        }
    }
    vars
}
