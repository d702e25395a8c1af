//! Deployment of bundled themes into a Mautic installation.
//!
//! Copies every theme directory under `build/themes/` into
//! `<mauticBasePath>/themes/`, overwriting files that already exist there.
//! Files present only in the destination are left alone.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Config;
use crate::copier::{copy_tree, CopyStats};
use crate::error::BuildError;

/// Result of a deployment
#[derive(Debug)]
pub struct DeployResult {
    /// Directory the themes were copied into
    pub target: PathBuf,
    /// Files and bytes copied
    pub stats: CopyStats,
    /// Time taken
    pub duration: Duration,
}

/// Copy the bundled themes into the configured Mautic themes directory
pub fn deploy(config: &Config) -> Result<DeployResult, BuildError> {
    let target = config.deploy_dir()?;
    let source = &config.layout.themes;
    if !source.is_dir() {
        return Err(BuildError::SourceNotFound {
            path: source.clone(),
        });
    }

    let start = Instant::now();
    debug!("Deploying {} -> {}", source.display(), target.display());
    let stats = copy_tree(source, &target, |_| true)?;
    let duration = start.elapsed();

    info!(
        "Deployed {} files ({} bytes) to {} in {:.2}s",
        stats.files,
        stats.bytes,
        target.display(),
        duration.as_secs_f64()
    );

    Ok(DeployResult {
        target,
        stats,
        duration,
    })
}
