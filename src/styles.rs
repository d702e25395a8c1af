//! Sass compilation of staged stylesheets.
//!
//! Compiles every Sass entry point under the staged assets directory into a
//! sibling `.css` file. A broken stylesheet is logged and skipped so the rest
//! of the batch still compiles; only an unavailable compiler aborts the stage.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info};

use crate::copier::write_file;
use crate::error::BuildError;
use crate::scanner::scan_style_sources;

/// Compiles one stylesheet to CSS
pub trait StyleCompiler: Send + Sync {
    /// Compile the stylesheet at `source`, returning the CSS text
    fn compile(&self, source: &Path) -> Result<String, BuildError>;
}

/// Runs an external Sass executable (dart-sass compatible CLI)
#[derive(Debug, Clone)]
pub struct SassCommand {
    program: String,
}

impl SassCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl StyleCompiler for SassCommand {
    fn compile(&self, source: &Path) -> Result<String, BuildError> {
        let output = Command::new(&self.program)
            .arg("--no-source-map")
            .arg(source)
            .output()
            .map_err(|e| BuildError::CompilerUnavailable {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(BuildError::StyleCompile {
                path: source.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Outcome of a style compilation pass
#[derive(Debug, Default)]
pub struct StyleReport {
    /// Stylesheets written
    pub compiled: Vec<PathBuf>,
    /// Stylesheets whose compilation failed
    pub failed: Vec<PathBuf>,
}

impl StyleReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Compile every Sass entry point under `assets` in place
pub fn compile_styles(
    assets: &Path,
    compiler: &dyn StyleCompiler,
) -> Result<StyleReport, BuildError> {
    let mut report = StyleReport::default();

    for source in scan_style_sources(assets)? {
        let target = source.with_extension("css");
        match compiler.compile(&source) {
            Ok(css) => {
                write_file(&target, css.as_bytes())?;
                debug!("Compiled {} -> {}", source.display(), target.display());
                report.compiled.push(target);
            }
            Err(e @ BuildError::CompilerUnavailable { .. }) => return Err(e),
            Err(e) => {
                error!("{}", e);
                report.failed.push(source);
            }
        }
    }

    info!(
        "Compiled {} stylesheet(s), {} failed",
        report.compiled.len(),
        report.failed.len()
    );
    Ok(report)
}
