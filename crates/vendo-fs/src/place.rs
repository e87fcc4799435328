//! Atomic placement of staged directories
//!
//! A staged directory replaces its destination through renames on the same
//! filesystem. The previous destination is parked beside it until the new
//! tree is in place, and restored if the swap fails.

use std::fs;
use std::path::{Path, PathBuf};

use crate::copy::move_dir;
use crate::io::remove_dir_best_effort;
use crate::{Error, Result};

/// Replace `dest` with the staged directory `staged`.
///
/// After a successful call `staged` no longer exists and `dest` holds its
/// former contents. On failure `dest` is left as it was.
pub fn replace_dir(staged: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let parked = if dest.exists() {
        let parked = parked_path(dest);
        fs::rename(dest, &parked).map_err(|e| Error::io(dest, e))?;
        Some(parked)
    } else {
        None
    };

    if let Err(e) = move_dir(staged, dest) {
        if let Some(parked) = &parked {
            remove_dir_best_effort(dest);
            if let Err(restore) = fs::rename(parked, dest) {
                tracing::warn!(
                    dest = %dest.display(),
                    error = %restore,
                    "Failed to restore previous directory"
                );
            }
        }
        return Err(e);
    }

    if let Some(parked) = parked {
        remove_dir_best_effort(&parked);
    }
    tracing::debug!(dest = %dest.display(), "Placed directory");
    Ok(())
}

fn parked_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.vendo-old-{}", name, std::process::id()))
}
