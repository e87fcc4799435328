//! Recursive copy and move helpers

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::{Error, Result};

/// Recursively copy `src` into `dest`.
///
/// Entries for which `skip` returns true (given the path relative to `src`)
/// are not copied; a skipped directory prunes its whole subtree. Symlinks
/// are recreated rather than followed.
pub fn copy_dir_filtered(src: &Path, dest: &Path, skip: impl Fn(&Path) -> bool) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;

    let mut walker = WalkDir::new(src).follow_links(false).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            Error::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::PathTraversal {
                entry: entry.path().display().to_string(),
            })?;

        if skip(relative) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let target = dest.join(relative);
        copy_entry(entry.path(), &target, entry.file_type())?;
    }
    Ok(())
}

/// Recursively copy `src` into `dest`.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    copy_dir_filtered(src, dest, |_| false)
}

/// Copy a single walked entry to `target`, creating parents as needed.
pub(crate) fn copy_entry(src: &Path, target: &Path, file_type: fs::FileType) -> Result<()> {
    if file_type.is_dir() {
        return fs::create_dir_all(target).map_err(|e| Error::io(target, e));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    if file_type.is_symlink() {
        let link = fs::read_link(src).map_err(|e| Error::io(src, e))?;
        return symlink(&link, target);
    }
    fs::copy(src, target).map_err(|e| Error::io(target, e))?;
    Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target).map_err(|e| Error::io(target, e))
}

#[cfg(windows)]
fn symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::windows::fs::symlink_file(link, target).map_err(|e| Error::io(target, e))
}

/// Move a directory, falling back to copy + delete across filesystems.
pub fn move_dir(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(
                src = %src.display(),
                dest = %dest.display(),
                error = %e,
                "Rename failed, copying instead"
            );
            copy_dir(src, dest)?;
            fs::remove_dir_all(src).map_err(|e| Error::io(src, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/file.txt"), "x").unwrap();

        let dest = dir.path().join("dest");
        copy_dir(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("a/b/file.txt")).unwrap(), "x");
    }

    #[test]
    fn skipped_directories_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join(".git/objects")).unwrap();
        fs::write(src.join(".git/HEAD"), "ref").unwrap();
        fs::write(src.join("keep.txt"), "k").unwrap();

        let dest = dir.path().join("dest");
        copy_dir_filtered(&src, &dest, |p| p.starts_with(".git")).unwrap();

        assert!(dest.join("keep.txt").exists());
        assert!(!dest.join(".git").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real.txt"), "r").unwrap();
        std::os::unix::fs::symlink("real.txt", src.join("link.txt")).unwrap();

        let dest = dir.path().join("dest");
        copy_dir(&src, &dest).unwrap();

        let link = fs::read_link(dest.join("link.txt")).unwrap();
        assert_eq!(link, Path::new("real.txt"));
    }

    #[test]
    fn move_dir_relocates_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("f.txt"), "f").unwrap();

        let dest = dir.path().join("deep/dest");
        move_dir(&src, &dest).unwrap();

        assert!(!src.exists());
        assert!(dest.join("f.txt").exists());
    }
}
