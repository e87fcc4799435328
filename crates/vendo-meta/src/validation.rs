//! Structural checks run on a manifest before anything is fetched

use vendo_fs::{NormalizedPath, PathFilter};

use crate::loader::Manifest;
use crate::schema::{ContentSpec, SourceSpec};
use crate::{Error, Result};

/// Validate directory layout, content sources and named references.
pub fn validate(manifest: &Manifest) -> Result<()> {
    let directories = &manifest.config.directories;
    let mut seen: Vec<NormalizedPath> = Vec::with_capacity(directories.len());

    for directory in directories {
        let dir_path = NormalizedPath::new(&directory.path);
        if !dir_path.is_contained() || dir_path.is_current() {
            return Err(Error::ConfigConflict {
                message: format!(
                    "Directory path '{}' must be a relative sub-directory without '..'",
                    directory.path
                ),
            });
        }
        if let Some(other) = seen.iter().find(|other| other.overlaps(&dir_path)) {
            return Err(Error::ConfigConflict {
                message: format!(
                    "Directory '{}' overlaps directory '{}'",
                    dir_path, other
                ),
            });
        }
        seen.push(dir_path.clone());

        validate_contents(&dir_path, &directory.contents)?;
        for content in &directory.contents {
            validate_content(&dir_path, content)?;
            validate_references(manifest, &content.source)?;
        }
    }
    Ok(())
}

fn validate_contents(dir_path: &NormalizedPath, contents: &[ContentSpec]) -> Result<()> {
    let paths: Vec<NormalizedPath> = contents
        .iter()
        .map(|c| NormalizedPath::new(&c.path))
        .collect();

    for (i, path) in paths.iter().enumerate() {
        if !path.is_contained() {
            return Err(Error::ConfigConflict {
                message: format!(
                    "Content path '{}' in directory '{}' must be relative without '..'",
                    path, dir_path
                ),
            });
        }
        if path.is_current() && paths.len() > 1 {
            return Err(Error::ConfigConflict {
                message: format!(
                    "Content path '.' in directory '{}' must be the only content",
                    dir_path
                ),
            });
        }
        if let Some(other) = paths[..i].iter().find(|other| other.overlaps(path)) {
            return Err(Error::ConfigConflict {
                message: format!(
                    "Content '{}' overlaps content '{}' in directory '{}'",
                    path, other, dir_path
                ),
            });
        }
    }
    Ok(())
}

fn validate_content(dir_path: &NormalizedPath, content: &ContentSpec) -> Result<()> {
    let invalid = |message: String| Error::InvalidConfig {
        message: format!("{}/{}: {}", dir_path, content.path, message),
    };

    PathFilter::new(
        &content.include_paths,
        &content.exclude_paths,
        &content.legal_paths,
        content.new_root_path.as_deref(),
    )?;

    if let Some(root) = &content.new_root_path {
        if !NormalizedPath::new(root).is_contained() {
            return Err(invalid(format!("newRootPath '{root}' must be relative")));
        }
    }

    match &content.source {
        SourceSpec::Git(git) => {
            if git.url.is_empty() {
                return Err(invalid("git.url is required".into()));
            }
            if git.git_ref.is_none() == git.ref_selection.is_none() {
                return Err(invalid(
                    "git requires exactly one of 'ref' or 'refSelection'".into(),
                ));
            }
        }
        SourceSpec::Hg(hg) if hg.url.is_empty() => {
            return Err(invalid("hg.url is required".into()));
        }
        SourceSpec::Http(http) if http.url.is_empty() => {
            return Err(invalid("http.url is required".into()));
        }
        SourceSpec::Image(image) if image.url.is_empty() => {
            return Err(invalid("image.url is required".into()));
        }
        SourceSpec::ImgpkgBundle(bundle) if bundle.image.is_empty() => {
            return Err(invalid("imgpkgBundle.image is required".into()));
        }
        SourceSpec::HelmChart(chart) if chart.name.is_empty() => {
            return Err(invalid("helmChart.name is required".into()));
        }
        SourceSpec::Directory(dir) if dir.path.is_empty() => {
            return Err(invalid("directory.path is required".into()));
        }
        SourceSpec::Inline(inline) => {
            for path in inline.paths.keys() {
                if !NormalizedPath::new(path).is_contained() {
                    return Err(invalid(format!("inline path '{path}' must be relative")));
                }
            }
            for from in &inline.paths_from {
                if from.secret_ref.is_some() == from.config_map_ref.is_some() {
                    return Err(invalid(
                        "inline.pathsFrom entries need exactly one of secretRef or configMapRef"
                            .into(),
                    ));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_references(manifest: &Manifest, source: &SourceSpec) -> Result<()> {
    for name in source.secret_names() {
        manifest.secret(name)?;
    }
    for name in source.config_map_names() {
        manifest.config_map(name)?;
    }
    Ok(())
}
