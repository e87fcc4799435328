use std::path::Path;

use vendo_meta::schema::DirectoryLock;
use vendo_meta::{DirectorySource, LockedSource};

use super::{FetchContext, FetchResult};
use crate::{Error, Result};

pub(super) fn fetch(ctx: &FetchContext<'_>, directory: &DirectorySource, dest: &Path) -> Result<FetchResult> {
    let src = ctx.root.join(&directory.path);
    if !src.is_dir() {
        return Err(Error::InvalidSource {
            message: format!("directory '{}' does not exist", src.display()),
        });
    }
    vendo_fs::copy::copy_dir(&src, dest)?;
    Ok(FetchResult::local(LockedSource::Directory(DirectoryLock {})))
}
