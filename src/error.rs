use std::path::PathBuf;
use thiserror::Error;

/// Build error types
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Missing configuration key {key}. Please set {key} in your {file}")]
    MissingConfig { key: String, file: String },

    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("{message}")]
    Usage { message: String },

    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("No space left on device for {path}")]
    DiskFull { path: PathBuf },

    #[error("Failed to copy {src} to {dst}")]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory: {path}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run {program}: is it installed and on PATH?")]
    CompilerUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compile stylesheet {path}: {message}")]
    StyleCompile { path: PathBuf, message: String },

    #[error("Failed to compile template {path}: {message}")]
    TemplateCompile { path: PathBuf, message: String },

    #[error("Included file {path} not found (referenced from {from})")]
    IncludeNotFound { path: PathBuf, from: PathBuf },

    #[error("Include depth exceeded {limit} while resolving {path}: circular include?")]
    IncludeDepth { path: PathBuf, limit: usize },

    #[error(
        "Email template {expected} for theme '{theme}' not found in build output. \
         Check theme.themes[{index}].email in your package.json"
    )]
    MainTemplateNotFound {
        theme: String,
        index: usize,
        expected: PathBuf,
    },

    #[error("Manifest for theme '{theme}' not found: {path}")]
    ManifestNotFound { theme: String, path: PathBuf },

    #[error("Invalid manifest for theme '{theme}' at {path}: {reason}")]
    InvalidManifest {
        theme: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write archive {path}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Failed to watch {path}: {reason}")]
    Watch { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Configuration and usage problems are reported with a distinct exit code
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BuildError::MissingConfig { .. }
                | BuildError::InvalidConfig { .. }
                | BuildError::Usage { .. }
        )
    }
}
