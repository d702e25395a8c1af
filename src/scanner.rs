use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::BuildError;

/// Top-level templates compiled by the pipeline; partials live in
/// subdirectories and are only pulled in through includes
pub const TEMPLATE_PATTERNS: &[&str] = &["*.heml.twig", "*.heml"];

/// Style sources compiled by the pipeline
pub const STYLE_PATTERNS: &[&str] = &["**/*.scss"];

/// Build a glob set where `*` does not cross directory boundaries
pub fn build_glob_set(patterns: &[&str]) -> Result<GlobSet, BuildError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| BuildError::Pattern(e.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| BuildError::Pattern(e.to_string()))
}

/// Collect files under `root` whose path relative to `root` matches,
/// sorted for deterministic processing order
#[must_use = "this returns the matched files which should be processed"]
pub fn scan_files(root: &Path, patterns: &GlobSet) -> Vec<PathBuf> {
    if !root.is_dir() {
        return Vec::new();
    }

    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let relative = e.path().strip_prefix(root).unwrap_or(e.path());
            patterns.is_match(relative)
        })
        .map(|e| e.into_path())
        .collect()
}

/// Sass partials (`_name.scss`) are only compiled through imports
pub fn is_style_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('_'))
        .unwrap_or(false)
}

/// Scan staged assets for Sass entry points
pub fn scan_style_sources(assets: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let patterns = build_glob_set(STYLE_PATTERNS)?;
    Ok(scan_files(assets, &patterns)
        .into_iter()
        .filter(|p| !is_style_partial(p))
        .collect())
}

/// Scan a heml directory for top-level templates
pub fn scan_template_sources(heml: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let patterns = build_glob_set(TEMPLATE_PATTERNS)?;
    Ok(scan_files(heml, &patterns))
}
