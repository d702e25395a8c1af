//! Build directory layout, workspace reset/staging and post-compile cleanup.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::copier::{copy_tree, remove_path, CopyStats};
use crate::error::BuildError;
use crate::scanner::{build_glob_set, scan_files};
use crate::theme::ThemeName;

/// Intermediate files removed from the staging tree after compilation,
/// relative to the staged assets directory
const CLEANUP_ASSET_PATTERNS: &[&str] = &["**/*.scss", "**/*.css"];

/// Directory holding HEML sources, both in `src/` and in the staging tree
pub const STAGED_HEML_DIR: &str = "heml";

/// Filesystem layout of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Project root
    pub root: PathBuf,
    /// Source tree: `src/`
    pub source: PathBuf,
    /// Output root receiving archives: `build/`
    pub output: PathBuf,
    /// Staging tree: `build/theme/`
    pub staging: PathBuf,
    /// Per-theme output root: `build/themes/`
    pub themes: PathBuf,
    /// Single-email previews: `build/emails/`
    pub emails: PathBuf,
}

impl Layout {
    pub fn new(root: &Path) -> Self {
        let output = root.join("build");
        Self {
            root: root.to_path_buf(),
            source: root.join("src"),
            staging: output.join("theme"),
            themes: output.join("themes"),
            emails: output.join("emails"),
            output,
        }
    }

    /// HEML sources inside the source tree
    pub fn heml_source(&self) -> PathBuf {
        self.source.join(STAGED_HEML_DIR)
    }

    /// Standalone preview emails inside the source tree
    pub fn emails_source(&self) -> PathBuf {
        self.heml_source().join("emails")
    }

    /// HEML sources inside the staging tree
    pub fn staged_heml(&self) -> PathBuf {
        self.staging.join(STAGED_HEML_DIR)
    }

    /// Assets inside the staging tree
    pub fn staged_assets(&self) -> PathBuf {
        self.staging.join("assets")
    }

    /// Output directory of one theme
    pub fn theme_dir(&self, name: &ThemeName) -> PathBuf {
        self.themes.join(name.as_str())
    }

    /// Archive path of one theme
    pub fn archive_path(&self, name: &ThemeName) -> PathBuf {
        self.output.join(name.archive_name())
    }
}

/// Delete the whole output directory. Succeeds if it is already absent.
pub fn reset(layout: &Layout) -> Result<(), BuildError> {
    if remove_path(&layout.output)? {
        info!("Removed {}", layout.output.display());
    } else {
        debug!("{} already clean", layout.output.display());
    }
    Ok(())
}

/// Copy every file of the source tree into the staging tree
pub fn stage(layout: &Layout) -> Result<CopyStats, BuildError> {
    if !layout.source.is_dir() {
        return Err(BuildError::SourceNotFound {
            path: layout.source.clone(),
        });
    }

    let stats = copy_tree(&layout.source, &layout.staging, |_| true)?;
    info!(
        "Staged {} files ({} bytes) into {}",
        stats.files,
        stats.bytes,
        layout.staging.display()
    );
    Ok(stats)
}

/// Remove raw templates and style sources from the staging tree.
/// Returns the number of paths removed; absent paths are skipped.
pub fn cleanup(layout: &Layout) -> Result<usize, BuildError> {
    let mut removed = 0;

    if remove_path(&layout.staged_heml())? {
        removed += 1;
    }

    let patterns = build_glob_set(CLEANUP_ASSET_PATTERNS)?;
    for path in scan_files(&layout.staged_assets(), &patterns) {
        if remove_path(&path)? {
            debug!("Removed {}", path.display());
            removed += 1;
        }
    }

    info!("Cleanup removed {} intermediate path(s)", removed);
    Ok(removed)
}
