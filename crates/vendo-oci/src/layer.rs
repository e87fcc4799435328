//! Layer extraction
//!
//! Layers are tar streams, optionally gzip-compressed, applied in order.
//! `.wh.<name>` entries delete `<name>` from lower layers and
//! `.wh..wh..opq` clears the directory it appears in.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path};

use flate2::read::GzDecoder;

use crate::Result;

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Apply the layer blob at `blob` on top of `dest`.
pub fn apply_layer(blob: &Path, dest: &Path) -> Result<()> {
    let file = File::open(blob).map_err(|e| vendo_fs::Error::io(blob, e))?;
    let mut reader = BufReader::new(file);
    let gzip = reader
        .fill_buf()
        .map_err(|e| vendo_fs::Error::io(blob, e))?
        .starts_with(&[0x1f, 0x8b]);

    fs::create_dir_all(dest).map_err(|e| vendo_fs::Error::io(dest, e))?;
    if gzip {
        apply_tar(GzDecoder::new(reader), blob, dest)
    } else {
        apply_tar(reader, blob, dest)
    }
}

fn apply_tar<R: Read>(reader: R, blob: &Path, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_mtime(false);

    let entries = archive.entries().map_err(|e| vendo_fs::Error::io(blob, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| vendo_fs::Error::io(blob, e))?;
        let path = entry
            .path()
            .map_err(|e| vendo_fs::Error::io(blob, e))?
            .into_owned();
        let escapes = path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            return Err(vendo_fs::Error::PathTraversal {
                entry: path.display().to_string(),
            }
            .into());
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parent = dest.join(path.parent().unwrap_or(Path::new("")));

        if name == OPAQUE_WHITEOUT {
            clear_dir(&parent)?;
            continue;
        }
        if let Some(hidden) = name.strip_prefix(WHITEOUT_PREFIX) {
            remove_path(&parent.join(hidden))?;
            continue;
        }

        if !entry.unpack_in(dest).map_err(|e| vendo_fs::Error::io(dest, e))? {
            return Err(vendo_fs::Error::PathTraversal {
                entry: path.display().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> Result<()> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        remove_path(&entry.path())?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(());
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| vendo_fs::Error::io(path, e))?;
    Ok(())
}

/// Build an uncompressed tar layer from `(path, content)` pairs.
pub fn tar_layer(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *content)
            .map_err(|e| vendo_fs::Error::io(Path::new(path), e))?;
    }
    builder
        .into_inner()
        .map_err(|e| vendo_fs::Error::io(Path::new("layer.tar"), e).into())
}
