//! Compile cache
//!
//! Decides whether an asset needs recompiling: any input's content
//! fingerprint changed, the output file is missing, or the asset format
//! version was bumped. Entries are keyed by output file and persisted as
//! JSON. The driver commits entries only after a fully successful compile,
//! so a failed asset is retried on the next run.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::CompileError;

/// One input file's recorded state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub source_file: PathBuf,
    /// SHA-256 of the source file contents, hex
    pub fingerprint: String,
    /// Format version the output was compiled with
    pub format_version: u32,
}

/// On-disk cache database
pub struct CacheManager {
    path: PathBuf,
    entries: HashMap<String, Vec<CacheEntry>>,
}

impl CacheManager {
    /// Load the cache file; a missing or unreadable cache means everything
    /// recompiles
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read(path)
            .ok()
            .and_then(|data| serde_json::from_slice(&data).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Check whether a compile is needed, returning the cache entries to
    /// commit after it succeeds
    pub fn needs_to_be_compiled(
        &self,
        input_files: &[PathBuf],
        output_file: &Path,
        format_version: u32,
    ) -> Result<(bool, Vec<CacheEntry>), CompileError> {
        let mut entries = Vec::with_capacity(input_files.len());
        for input in input_files {
            entries.push(CacheEntry {
                source_file: input.clone(),
                fingerprint: hash_file(input)?,
                format_version,
            });
        }

        let recompile = !output_file.exists()
            || match self.entries.get(&key_for(output_file)) {
                Some(recorded) => recorded != &entries,
                None => true,
            };

        Ok((recompile, entries))
    }

    /// Record entries for an output file; call only after a successful write
    pub fn store_or_update_entries(&mut self, output_file: &Path, entries: Vec<CacheEntry>) {
        self.entries.insert(key_for(output_file), entries);
    }

    /// Persist the cache database
    pub fn save(&self) -> Result<(), CompileError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CompileError::io(&self.path, e))?;
        }
        let data = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| CompileError::malformed(&self.path, format!("cache serialization: {e}")))?;
        std::fs::write(&self.path, data).map_err(|e| CompileError::io(&self.path, e))
    }
}

fn key_for(output_file: &Path) -> String {
    output_file.to_string_lossy().into_owned()
}

fn hash_file(path: &Path) -> Result<String, CompileError> {
    let data = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    let digest = hasher.finalize();
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}
