//! Literal file contents, from the manifest or referenced documents

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use vendo_fs::NormalizedPath;
use vendo_meta::schema::InlineLock;
use vendo_meta::{InlineSource, LockedSource};

use super::{FetchContext, FetchResult};
use crate::{Error, Result};

pub(super) fn fetch(ctx: &FetchContext<'_>, inline: &InlineSource, dest: &Path) -> Result<FetchResult> {
    fs::create_dir_all(dest).map_err(|e| vendo_fs::Error::io(dest, e))?;

    for (path, content) in &inline.paths {
        write_entry(dest, path, content.as_bytes())?;
    }

    for from in &inline.paths_from {
        let (entries, directory) = match (&from.secret_ref, &from.config_map_ref) {
            (Some(secret), None) => (ctx.secret_entries(&secret.name)?, secret.directory_path.as_deref()),
            (None, Some(config_map)) => {
                let entries: BTreeMap<String, Vec<u8>> = ctx
                    .manifest
                    .config_map(&config_map.name)?
                    .data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone().into_bytes()))
                    .collect();
                (entries, config_map.directory_path.as_deref())
            }
            _ => {
                return Err(Error::InvalidSource {
                    message: "inline pathsFrom entry needs exactly one of secretRef or configMapRef".to_string(),
                });
            }
        };

        for (name, content) in &entries {
            let path = match directory {
                Some(directory) => format!("{directory}/{name}"),
                None => name.clone(),
            };
            write_entry(dest, &path, content)?;
        }
    }

    Ok(FetchResult::local(LockedSource::Inline(InlineLock {})))
}

fn write_entry(dest: &Path, path: &str, content: &[u8]) -> Result<()> {
    let relative = NormalizedPath::new(path);
    if !relative.is_contained() || relative.is_current() {
        return Err(Error::InvalidSource {
            message: format!("inline path '{path}' must be a relative file path"),
        });
    }
    vendo_fs::io::write_atomic(&dest.join(relative.to_native()), content)?;
    Ok(())
}
