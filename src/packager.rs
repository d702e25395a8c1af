//! Zip packaging of bundled themes.
//!
//! One archive per theme, written on a bounded worker pool. Entries are
//! relative to the theme directory, sorted, and stamped with a fixed
//! timestamp so an unchanged theme always yields the same archive.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::result::ZipResult;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::config::Config;
use crate::error::BuildError;
use crate::theme::ThemeName;

/// Result of packaging one theme
#[derive(Debug)]
pub struct PackageResult {
    pub theme: ThemeName,
    pub archive: PathBuf,
    pub status: PackageStatus,
    /// Number of file entries written
    pub entries: u64,
    pub duration: Duration,
}

/// Packaging outcome
#[derive(Debug)]
pub enum PackageStatus {
    Written,
    Failed(BuildError),
}

/// Archive entry name: forward slashes regardless of platform
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn write_archive(src_dir: &Path, dest: &Path) -> ZipResult<u64> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut entries = 0u64;
    for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(src_dir).unwrap_or(entry.path());
        let name = entry_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)?;
            let mut source = File::open(entry.path())?;
            io::copy(&mut source, &mut zip)?;
            entries += 1;
        }
    }

    zip.finish()?;
    Ok(entries)
}

/// Zip the contents of `src_dir` into `dest`, without an enclosing folder.
/// Returns the number of files archived.
pub fn create_archive(src_dir: &Path, dest: &Path) -> Result<u64, BuildError> {
    if !src_dir.is_dir() {
        return Err(BuildError::SourceNotFound {
            path: src_dir.to_path_buf(),
        });
    }
    write_archive(src_dir, dest).map_err(|e| BuildError::Archive {
        path: dest.to_path_buf(),
        source: e,
    })
}

/// Package one theme directory into `build/<name>.zip`
pub fn package_theme(config: &Config, theme: &ThemeName) -> PackageResult {
    let start = Instant::now();
    let src = config.layout.theme_dir(theme);
    let archive = config.layout.archive_path(theme);

    let (status, entries) = match create_archive(&src, &archive) {
        Ok(entries) => {
            debug!("Wrote {} ({} files)", archive.display(), entries);
            (PackageStatus::Written, entries)
        }
        Err(e) => (PackageStatus::Failed(e), 0),
    };

    PackageResult {
        theme: theme.clone(),
        archive,
        status,
        entries,
        duration: start.elapsed(),
    }
}

/// Package every theme on a pool of `config.jobs` workers and wait for all
/// archives. Fails after the join if any archive could not be written.
pub fn package_themes(config: &Config) -> Result<Vec<PackageResult>, BuildError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs.max(1))
        .build()
        .map_err(|e| BuildError::Io(io::Error::other(e)))?;

    let progress = if config.verbose {
        let pb = ProgressBar::new(config.themes.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("Packaging themes...");
        Some(pb)
    } else {
        None
    };

    let results: Vec<PackageResult> = pool.install(|| {
        config
            .themes
            .par_iter()
            .map(|theme| {
                let result = package_theme(config, &theme.name);
                if let Some(ref pb) = progress {
                    pb.inc(1);
                }
                result
            })
            .collect()
    });

    if let Some(pb) = progress {
        pb.finish_with_message("Complete");
    }

    let (results, failure) = collect_results(results);
    if let Some(e) = failure {
        return Err(e);
    }

    for result in &results {
        info!(
            "Packaged {} -> {} ({} files)",
            result.theme,
            result.archive.display(),
            result.entries
        );
    }
    Ok(results)
}

/// Split successful results from the first failure, keeping declaration order
pub fn collect_results(results: Vec<PackageResult>) -> (Vec<PackageResult>, Option<BuildError>) {
    let mut written = Vec::with_capacity(results.len());
    let mut failure = None;

    for result in results {
        match result.status {
            PackageStatus::Written => written.push(result),
            PackageStatus::Failed(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }

    (written, failure)
}
