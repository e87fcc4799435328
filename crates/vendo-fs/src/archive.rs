//! Archive unpacking and packing
//!
//! Unpacks `.tar`, `.tar.gz`/`.tgz` and `.zip` archives with path traversal
//! protection, and packs directory trees into `.tar.gz` snapshots for the
//! content cache.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::{Error, Result};

/// Supported archive encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Guess the archive kind from a file name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Detect the archive kind from the leading bytes of a file.
    pub fn sniff(path: &Path) -> Result<Option<Self>> {
        let mut header = [0u8; 262];
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut read = 0;
        while read < header.len() {
            let n = file
                .read(&mut header[read..])
                .map_err(|e| Error::io(path, e))?;
            if n == 0 {
                break;
            }
            read += n;
        }
        let header = &header[..read];

        if header.starts_with(&[0x1f, 0x8b]) {
            Ok(Some(Self::TarGz))
        } else if header.starts_with(b"PK\x03\x04") {
            Ok(Some(Self::Zip))
        } else if header.len() >= 262 && &header[257..262] == b"ustar" {
            Ok(Some(Self::Tar))
        } else {
            Ok(None)
        }
    }
}

/// Unpack `archive` into `dest`, creating `dest` if needed.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] if any entry would land outside `dest`.
pub fn unpack(archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let reader = BufReader::new(file);

    tracing::debug!(archive = %archive.display(), ?kind, dest = %dest.display(), "Unpacking archive");

    match kind {
        ArchiveKind::Tar => unpack_tar(reader, archive, dest),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(reader), archive, dest),
        ArchiveKind::Zip => unpack_zip(archive, dest),
    }
}

/// Unpack a tar or gzip-compressed tar read from an open stream.
///
/// `source` only labels errors. Zip needs random access and is rejected.
pub fn unpack_reader<R: Read>(reader: R, kind: ArchiveKind, source: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    match kind {
        ArchiveKind::Tar => unpack_tar(BufReader::new(reader), source, dest),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(BufReader::new(reader)), source, dest),
        ArchiveKind::Zip => Err(Error::UnsupportedArchive {
            path: source.to_path_buf(),
        }),
    }
}

/// Unpack a tar stream (already decompressed) into `dest`.
pub fn unpack_tar<R: Read>(reader: R, source: &Path, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_mtime(false);

    let entries = archive.entries().map_err(|e| Error::io(source, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::io(source, e))?;
        let entry_path = entry.path().map_err(|e| Error::io(source, e))?.into_owned();
        validate_entry_path(&entry_path)?;

        if !entry.unpack_in(dest).map_err(|e| Error::io(dest, e))? {
            return Err(Error::PathTraversal {
                entry: entry_path.display().to_string(),
            });
        }
    }
    Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let zip_err = |e: zip::result::ZipError| Error::Zip {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    };
    let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(zip_err)?;
        let relative = entry.enclosed_name().ok_or_else(|| Error::PathTraversal {
            entry: entry.name().to_string(),
        })?;
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| Error::io(&target, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| Error::io(&target, e))?;
        }
    }
    Ok(())
}

/// Pack the contents of `src` into a gzip-compressed tar at `dest`.
///
/// Symlinks are stored as links, not followed.
pub fn pack_tar_gz(src: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(|e| Error::io(dest, e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", src)
        .map_err(|e| Error::io(src, e))?;
    let encoder = builder.into_inner().map_err(|e| Error::io(dest, e))?;
    encoder.finish().map_err(|e| Error::io(dest, e))?;
    Ok(())
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<()> {
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(Error::PathTraversal {
            entry: path.display().to_string(),
        });
    }
    Ok(())
}
