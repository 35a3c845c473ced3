//! Knowledge-base manifest: which corpus files are indexed, at which
//! content fingerprint, and which chunk ids they own

use crate::errors::{ForgeError, Result};
use crate::persist::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Hex SHA-256 of file content
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub fingerprint: String,
    /// When this version of the file was committed
    pub indexed_at: DateTime<Utc>,
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub updated_at: Option<DateTime<Utc>>,
    /// Keyed by source id (corpus-relative path)
    pub entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Load from `path`; a missing file is an empty manifest
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| ForgeError::Storage(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| ForgeError::Storage(format!("corrupt manifest {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json)
            .map_err(|e| ForgeError::Storage(format!("{}: {}", path.display(), e)))
    }

    /// True when `source_id` is indexed at exactly `fingerprint`
    pub fn is_current(&self, source_id: &str, fingerprint: &str) -> bool {
        self.entries
            .get(source_id)
            .is_some_and(|entry| entry.fingerprint == fingerprint)
    }

    pub fn get(&self, source_id: &str) -> Option<&ManifestEntry> {
        self.entries.get(source_id)
    }

    /// Record a committed file, replacing any previous entry
    pub fn record(&mut self, source_id: &str, fingerprint: String, chunk_ids: Vec<String>) {
        let now = Utc::now();
        self.entries.insert(
            source_id.to_string(),
            ManifestEntry {
                fingerprint,
                indexed_at: now,
                chunk_ids,
            },
        );
        self.updated_at = Some(now);
    }

    pub fn remove(&mut self, source_id: &str) -> Option<ManifestEntry> {
        let removed = self.entries.remove(source_id);
        if removed.is_some() {
            self.updated_at = Some(Utc::now());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_chunks(&self) -> usize {
        self.entries.values().map(|e| e.chunk_ids.len()).sum()
    }
}
