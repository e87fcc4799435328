//! On-disk index of cache entries

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IndexEntry {
    /// Blob file name under `blobs/`
    pub blob: String,
    pub size: u64,
    /// Logical clock value of the most recent access; orders eviction
    pub last_access: u64,
    pub accessed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CacheIndex {
    pub clock: u64,
    pub entries: BTreeMap<String, IndexEntry>,
}

impl CacheIndex {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| Error::Index {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_vec_pretty(self).map_err(|e| Error::Index {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        vendo_fs::io::write_atomic(path, &content)?;
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// Mark `key` as used now.
    pub fn touch(&mut self, key: &str) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = clock;
            entry.accessed_at = Utc::now();
        }
    }

    pub fn insert(&mut self, key: &str, blob: String, size: u64) {
        self.clock += 1;
        self.entries.insert(
            key.to_string(),
            IndexEntry {
                blob,
                size,
                last_access: self.clock,
                accessed_at: Utc::now(),
            },
        );
    }

    /// Keys to evict, least recently used first, so that `incoming` bytes fit
    /// under `budget`. `replacing` is excluded from the total since its old
    /// value is about to be overwritten.
    pub fn plan_eviction(&self, incoming: u64, budget: u64, replacing: &str) -> Vec<String> {
        let mut by_age: Vec<(&String, &IndexEntry)> = self
            .entries
            .iter()
            .filter(|(key, _)| key.as_str() != replacing)
            .collect();
        by_age.sort_by_key(|(_, entry)| entry.last_access);

        let mut total: u64 = by_age.iter().map(|(_, e)| e.size).sum();
        let mut victims = Vec::new();
        for (key, entry) in by_age {
            if total.saturating_add(incoming) <= budget {
                break;
            }
            total -= entry.size;
            victims.push(key.clone());
        }
        victims
    }
}
