use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::BuildError;

/// ENOSPC on Unix
const ENOSPC: i32 = 28;

/// Files and bytes moved by a tree copy
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

fn create_dir_error(path: &Path, e: io::Error) -> BuildError {
    if e.raw_os_error() == Some(ENOSPC) {
        return BuildError::DiskFull {
            path: path.to_path_buf(),
        };
    }
    BuildError::CreateDirFailed {
        path: path.to_path_buf(),
        source: e,
    }
}

/// Create a directory and its parents
pub fn ensure_dir(path: &Path) -> Result<(), BuildError> {
    fs::create_dir_all(path).map_err(|e| create_dir_error(path, e))
}

/// Copy a single file from src to dst, overwriting dst
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, BuildError> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            ensure_dir(parent)?;
        }
    }

    fs::copy(src, dst).map_err(|e| {
        if e.raw_os_error() == Some(ENOSPC) {
            return BuildError::DiskFull {
                path: dst.to_path_buf(),
            };
        }
        BuildError::CopyFailed {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source: e,
        }
    })
}

/// Write a file, creating parent directories as needed
pub fn write_file(dst: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            ensure_dir(parent)?;
        }
    }
    fs::write(dst, contents).map_err(|e| {
        if e.raw_os_error() == Some(ENOSPC) {
            return BuildError::DiskFull {
                path: dst.to_path_buf(),
            };
        }
        BuildError::Io(e)
    })
}

/// Copy directory recursively, preserving relative paths and overwriting
/// existing files. `keep` receives each file's path relative to `src` and
/// decides whether it is copied.
pub fn copy_tree<F>(src: &Path, dst: &Path, mut keep: F) -> Result<CopyStats, BuildError>
where
    F: FnMut(&Path) -> bool,
{
    let mut stats = CopyStats::default();

    for entry in WalkDir::new(src).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BuildError::Io(
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop detected")),
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let src_path = entry.path();
        let relative = src_path.strip_prefix(src).unwrap_or(src_path);
        if !keep(relative) {
            continue;
        }

        stats.bytes += copy_file(src_path, &dst.join(relative))?;
        stats.files += 1;
    }

    Ok(stats)
}

/// Remove a file or directory tree. Returns false if nothing was there.
pub fn remove_path(path: &Path) -> Result<bool, BuildError> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(BuildError::Io(e)),
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BuildError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(temp: &TempDir) -> std::path::PathBuf {
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("assets/css")).unwrap();
        fs::write(src.join("config.json"), "{}").unwrap();
        fs::write(src.join("assets/css/main.scss"), "body{}").unwrap();
        fs::write(src.join("assets/logo.png"), [0u8, 1, 2, 3]).unwrap();
        src
    }

    #[test]
    fn test_copy_file_creates_parents() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("a.txt");
        fs::write(&src, "hello").unwrap();
        let dst = temp.path().join("x/y/z/a.txt");

        let bytes = copy_file(&src, &dst).unwrap();

        assert_eq!(bytes, 5);
        assert_eq!(fs::read_to_string(dst).unwrap(), "hello");
    }

    #[test]
    fn test_copy_file_missing_source() {
        let temp = TempDir::new().unwrap();
        let result = copy_file(&temp.path().join("nope"), &temp.path().join("out"));
        assert!(matches!(result, Err(BuildError::CopyFailed { .. })));
    }

    #[test]
    fn test_copy_tree_preserves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let src = fixture(&temp);
        let dst = temp.path().join("dst");

        let stats = copy_tree(&src, &dst, |_| true).unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.bytes, 2 + 6 + 4);
        assert!(dst.join("config.json").exists());
        assert!(dst.join("assets/css/main.scss").exists());
        assert!(dst.join("assets/logo.png").exists());
    }

    #[test]
    fn test_copy_tree_filter_receives_relative_path() {
        let temp = TempDir::new().unwrap();
        let src = fixture(&temp);
        let dst = temp.path().join("dst");

        let stats = copy_tree(&src, &dst, |rel| rel != Path::new("assets/css/main.scss")).unwrap();

        assert_eq!(stats.files, 2);
        assert!(!dst.join("assets/css/main.scss").exists());
    }

    #[test]
    fn test_copy_tree_overwrites_existing() {
        let temp = TempDir::new().unwrap();
        let src = fixture(&temp);
        let dst = temp.path().join("dst");
        fs::create_dir_all(&dst).unwrap();
        fs::write(dst.join("config.json"), "old").unwrap();

        copy_tree(&src, &dst, |_| true).unwrap();

        assert_eq!(fs::read_to_string(dst.join("config.json")).unwrap(), "{}");
    }

    #[test]
    fn test_copy_tree_missing_source_is_error() {
        let temp = TempDir::new().unwrap();
        let result = copy_tree(&temp.path().join("missing"), &temp.path().join("dst"), |_| true);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_file_creates_parents() {
        let temp = TempDir::new().unwrap();
        let dst = temp.path().join("a/b.html");
        write_file(&dst, b"<p>").unwrap();
        assert_eq!(fs::read(dst).unwrap(), b"<p>");
    }

    #[test]
    fn test_remove_path_dir_file_and_absent() {
        let temp = TempDir::new().unwrap();
        let src = fixture(&temp);

        assert!(remove_path(&src.join("config.json")).unwrap());
        assert!(remove_path(&src).unwrap());
        assert!(!src.exists());
        assert!(!remove_path(&src).unwrap());
    }
}
