//! Loader for the multi-document manifest stream
//!
//! A manifest holds exactly one `Config` document plus any number of
//! `Secret` and `ConfigMap` documents, in any order:
//!
//! ```text
//! apiVersion: v1
//! kind: Secret
//! ...
//! ---
//! apiVersion: vendo.dev/v1alpha1
//! kind: Config
//! ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::schema::{Config, ConfigMap, Secret};
use crate::{Error, Result};

/// Document kinds accepted in a manifest stream.
const CONFIG_KIND: &str = "Config";
const SECRET_KIND: &str = "Secret";
const CONFIG_MAP_KIND: &str = "ConfigMap";

/// A parsed manifest: the config and its named companion documents.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub config: Config,
    pub secrets: BTreeMap<String, Secret>,
    pub config_maps: BTreeMap<String, ConfigMap>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
}

impl Manifest {
    /// Parse a manifest from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut configs = Vec::new();
        let mut secrets = BTreeMap::new();
        let mut config_maps = BTreeMap::new();

        for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| Error::Parse {
                index,
                message: e.to_string(),
            })?;
            if value.is_null() {
                continue;
            }

            let meta: TypeMeta = from_value(index, value.clone())?;
            match meta.kind.as_str() {
                CONFIG_KIND if meta.api_version == crate::API_VERSION => {
                    configs.push(from_value::<Config>(index, value)?);
                }
                SECRET_KIND => {
                    let secret: Secret = from_value(index, value)?;
                    secrets.insert(secret.name().to_string(), secret);
                }
                CONFIG_MAP_KIND => {
                    let config_map: ConfigMap = from_value(index, value)?;
                    config_maps.insert(config_map.name().to_string(), config_map);
                }
                _ => {
                    return Err(Error::UnknownKind {
                        kind: meta.kind,
                        api_version: meta.api_version,
                    });
                }
            }
        }

        if configs.len() != 1 {
            return Err(Error::ConfigCount {
                count: configs.len(),
            });
        }
        let config = configs.remove(0);

        tracing::debug!(
            directories = config.directories.len(),
            secrets = secrets.len(),
            config_maps = config_maps.len(),
            "Loaded manifest"
        );

        Ok(Self {
            config,
            secrets,
            config_maps,
        })
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = vendo_fs::io::read_text(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn secret(&self, name: &str) -> Result<&Secret> {
        self.secrets.get(name).ok_or_else(|| Error::SecretNotFound {
            name: name.to_string(),
        })
    }

    pub fn config_map(&self, name: &str) -> Result<&ConfigMap> {
        self.config_maps
            .get(name)
            .ok_or_else(|| Error::ConfigMapNotFound {
                name: name.to_string(),
            })
    }

    /// Reject the manifest if it asks for a newer vendo than `current`.
    pub fn check_minimum_version(&self, current: &str) -> Result<()> {
        let Some(required) = self.config.minimum_required_version.as_deref() else {
            return Ok(());
        };
        let constraint = crate::VersionConstraint::parse(&format!(">={required}"))?;
        if constraint.satisfies(current) {
            Ok(())
        } else {
            Err(Error::VersionTooOld {
                required: required.to_string(),
                current: current.to_string(),
            })
        }
    }
}

fn from_value<T: DeserializeOwned>(index: usize, value: serde_yaml::Value) -> Result<T> {
    serde_yaml::from_value(value).map_err(|e| Error::Parse {
        index,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceSpec;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: Secret
metadata:
  name: keys
stringData:
  trusted.pub: KEY
---
apiVersion: vendo.dev/v1alpha1
kind: Config
directories:
- path: vendor
  contents:
  - path: lib
    git:
      url: https://example.com/lib.git
      ref: main
      verification:
        publicKeysSecretRef:
          name: keys
"#;

    #[test]
    fn loads_config_and_companions() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        assert_eq!(manifest.config.directories.len(), 1);
        assert!(manifest.secret("keys").is_ok());
        assert!(matches!(
            manifest.config.directories[0].contents[0].source,
            SourceSpec::Git(_)
        ));
    }

    #[test]
    fn missing_config_is_rejected() {
        let err = Manifest::from_yaml_str("apiVersion: v1\nkind: ConfigMap\nmetadata: {name: a}\n")
            .unwrap_err();
        assert!(matches!(err, Error::ConfigCount { count: 0 }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = Manifest::from_yaml_str("apiVersion: v1\nkind: Deployment\n").unwrap_err();
        assert!(matches!(err, Error::UnknownKind { .. }));
    }

    #[test]
    fn config_with_wrong_api_version_is_unknown() {
        let err =
            Manifest::from_yaml_str("apiVersion: other/v1\nkind: Config\ndirectories: []\n")
                .unwrap_err();
        assert!(matches!(err, Error::UnknownKind { .. }));
    }

    #[test]
    fn minimum_version_check() {
        let mut manifest = Manifest::from_yaml_str(MANIFEST).unwrap();
        manifest.config.minimum_required_version = Some("0.2.0".into());
        assert!(manifest.check_minimum_version("0.3.1").is_ok());
        assert!(matches!(
            manifest.check_minimum_version("0.1.0"),
            Err(Error::VersionTooOld { .. })
        ));
    }
}
