//! Companion `Secret` and `ConfigMap` documents
//!
//! These carry data referenced by name from the config: credentials, trusted
//! public keys and inline file contents.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metadata {
    pub name: String,
}

/// A named bag of base64-encoded (`data`) or plain (`stringData`) values.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub metadata: Metadata,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub string_data: BTreeMap<String, String>,
}

impl Secret {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Decoded entries; `stringData` wins over `data` for the same key.
    pub fn entries(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut entries = BTreeMap::new();
        for (key, encoded) in &self.data {
            let compact: String = encoded.split_whitespace().collect();
            let decoded = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| Error::InvalidSecretData {
                    name: self.metadata.name.clone(),
                    key: key.clone(),
                    message: e.to_string(),
                })?;
            entries.insert(key.clone(), decoded);
        }
        for (key, value) in &self.string_data {
            entries.insert(key.clone(), value.clone().into_bytes());
        }
        Ok(entries)
    }

    /// Decoded value of a single key, if present.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.remove(key))
    }
}

/// A named bag of plain-text values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigMap {
    pub metadata: Metadata,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
