//! Per-theme bundling of the compiled staging tree.
//!
//! Every declared theme receives a filtered copy of the staging tree: the
//! main-template candidates of other themes are left out, the theme's own
//! template is renamed to [`MAIN_TEMPLATE_NAME`], and the manifest's `name`
//! field is set to the theme's display name.

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::copier::{copy_tree, remove_path, write_file};
use crate::error::BuildError;
use crate::theme::{Theme, ThemeName, MAIN_TEMPLATE_NAME};

/// A theme output directory produced by the bundler
#[derive(Debug, Clone)]
pub struct BundledTheme {
    pub name: ThemeName,
    pub dir: PathBuf,
    pub files: u64,
}

/// Read a theme manifest, which must be a JSON object with a `name` field
pub fn read_manifest(theme: &Theme, path: &Path) -> Result<Map<String, Value>, BuildError> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            BuildError::ManifestNotFound {
                theme: theme.name.to_string(),
                path: path.to_path_buf(),
            }
        } else {
            BuildError::Io(e)
        }
    })?;

    let invalid = |reason: String| BuildError::InvalidManifest {
        theme: theme.name.to_string(),
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(manifest) = value else {
        return Err(invalid("expected a JSON object".to_string()));
    };
    if !manifest.contains_key("name") {
        return Err(invalid("missing \"name\" field".to_string()));
    }
    Ok(manifest)
}

/// Set the manifest's display name, leaving every other field in place
pub fn patch_manifest(mut manifest: Map<String, Value>, display_name: &str) -> Map<String, Value> {
    manifest.insert("name".to_string(), Value::String(display_name.to_string()));
    manifest
}

/// Write a manifest with 2-space indentation
pub fn write_manifest(path: &Path, manifest: Map<String, Value>) -> Result<(), BuildError> {
    let mut text =
        serde_json::to_string_pretty(&Value::Object(manifest)).map_err(|e| BuildError::Io(e.into()))?;
    text.push('\n');
    write_file(path, text.as_bytes())
}

/// Assemble the output directory of one theme from the staging tree
pub fn bundle_theme(theme: &Theme, config: &Config) -> Result<BundledTheme, BuildError> {
    let layout = &config.layout;
    let dest = layout.theme_dir(&theme.name);
    let designated = theme.designated_template(&config.template_dir);

    remove_path(&dest)?;

    let mut found = false;
    let stats = copy_tree(&layout.staging, &dest, |relative| {
        if relative == designated.as_path() {
            found = true;
            return true;
        }
        let candidate = relative
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| theme.is_email_candidate(n))
            .unwrap_or(false);
        if candidate {
            debug!("{}: skipping {}", theme.name, relative.display());
        }
        !candidate
    })?;

    if !found {
        return Err(BuildError::MainTemplateNotFound {
            theme: theme.name.to_string(),
            index: theme.index,
            expected: designated,
        });
    }

    // Parse before touching anything so a broken manifest leaves no rename behind
    let manifest_path = dest.join(&config.manifest);
    let manifest = read_manifest(theme, &manifest_path)?;

    let main = dest.join(&designated);
    let canonical = main.with_file_name(MAIN_TEMPLATE_NAME);
    if main != canonical {
        fs::rename(&main, &canonical)?;
    }

    write_manifest(&manifest_path, patch_manifest(manifest, &theme.display_name))?;

    Ok(BundledTheme {
        name: theme.name.clone(),
        dir: dest,
        files: stats.files,
    })
}

/// Bundle every declared theme, then drop the staging tree.
///
/// The first failing theme aborts the step and removes the themes directory
/// so no partial set of themes is left behind.
pub fn bundle_themes(config: &Config) -> Result<Vec<BundledTheme>, BuildError> {
    let layout = &config.layout;
    if !layout.staging.is_dir() {
        return Err(BuildError::SourceNotFound {
            path: layout.staging.clone(),
        });
    }

    remove_path(&layout.themes)?;

    let mut bundled = Vec::with_capacity(config.themes.len());
    for theme in &config.themes {
        match bundle_theme(theme, config) {
            Ok(result) => {
                info!(
                    "Bundled theme {} ({} files) into {}",
                    result.name,
                    result.files,
                    result.dir.display()
                );
                bundled.push(result);
            }
            Err(e) => {
                remove_path(&layout.themes)?;
                return Err(e);
            }
        }
    }

    remove_path(&layout.staging)?;
    Ok(bundled)
}
