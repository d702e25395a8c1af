//! CLI definition, project descriptor loading and runtime settings.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::BuildError;
use crate::pipeline::Task;
use crate::theme::{Theme, ThemeName, DEFAULT_EMAIL_PATTERN};
use crate::workspace::{Layout, STAGED_HEML_DIR};

const DEFAULT_SASS_BINARY: &str = "sass";
const DEFAULT_HEML_BINARY: &str = "heml";
const DEFAULT_MANIFEST: &str = "config.json";

/// Build pipeline for Mautic email themes written in HEML
#[derive(Parser, Debug)]
#[command(name = "heml-theme-build")]
#[command(version)]
#[command(about = "Build pipeline for Mautic email themes written in HEML")]
pub struct Cli {
    /// Project root directory
    #[arg(short, long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Project descriptor (relative to the project root)
    #[arg(short, long, default_value = "package.json", global = true)]
    pub config: PathBuf,

    /// Number of parallel packaging workers
    #[arg(short, long, default_value_t = num_cpus::get(), global = true)]
    pub jobs: usize,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub task: TaskCommand,
}

/// Pipeline tasks invocable by name
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommand {
    /// Remove the build directory
    Clean,
    /// Copy sources into the staging tree
    Copy,
    /// Compile staged Sass stylesheets
    Sass,
    /// Compile staged HEML templates
    Heml,
    /// Remove intermediate sources from the staging tree
    Cleanup,
    /// Assemble per-theme output directories
    Bundle,
    /// Run the full build
    Build,
    /// Build, then copy themes into the Mautic installation
    Deploy,
    /// Build, then zip every theme
    Package,
    /// Compile a single email template for preview
    Compile {
        /// Email template name under src/heml/emails (without extension)
        #[arg(long)]
        email: Option<String>,
    },
    /// Deploy on every source change
    Watch,
}

impl TaskCommand {
    /// The task graph node this command runs; `None` for commands outside the graph
    pub fn pipeline_task(&self) -> Option<Task> {
        match self {
            TaskCommand::Clean => Some(Task::Clean),
            TaskCommand::Copy => Some(Task::Copy),
            TaskCommand::Sass => Some(Task::Sass),
            TaskCommand::Heml => Some(Task::Heml),
            TaskCommand::Cleanup => Some(Task::Cleanup),
            TaskCommand::Bundle => Some(Task::Bundle),
            TaskCommand::Build => Some(Task::Build),
            TaskCommand::Deploy => Some(Task::Deploy),
            TaskCommand::Package => Some(Task::Package),
            TaskCommand::Compile { .. } | TaskCommand::Watch => None,
        }
    }
}

/// Project descriptor, usually the project's package.json
#[derive(Deserialize, Debug, Default)]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub theme: Option<ThemeSection>,
}

/// The namespaced `theme` section of the project descriptor
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSection {
    pub mautic_base_path: Option<PathBuf>,
    #[serde(default)]
    pub enable_minifier: bool,
    #[serde(default)]
    pub themes: Vec<ThemeEntry>,
    pub sass_binary: Option<String>,
    pub heml_binary: Option<String>,
    pub template_output_dir: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
}

/// One entry of `theme.themes`
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ThemeEntry {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub email_pattern: Option<String>,
}

/// Runtime configuration, loaded once and passed to every stage
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory layout derived from the project root
    pub layout: Layout,
    /// Descriptor file the configuration came from (used in hints)
    pub descriptor_name: String,
    /// Themes in declaration order
    pub themes: Vec<Theme>,
    /// Mautic installation root, if deployment is configured
    pub deploy_base: Option<PathBuf>,
    /// Minify compiled templates
    pub minify: bool,
    /// Sass compiler program
    pub sass_binary: String,
    /// HEML compiler program
    pub heml_binary: String,
    /// Compiled template directory relative to the staging tree
    pub template_dir: PathBuf,
    /// Manifest path relative to each theme directory
    pub manifest: PathBuf,
    /// Number of parallel packaging workers
    pub jobs: usize,
    /// Enable verbose output
    pub verbose: bool,
}

impl Config {
    /// Load configuration for the given CLI arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, BuildError> {
        let root = cli.root.canonicalize().unwrap_or_else(|_| cli.root.clone());
        let descriptor_path = root.join(&cli.config);
        let descriptor = read_descriptor(&descriptor_path)?;
        let descriptor_name = cli
            .config
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.json".to_string());

        let mut config = Self::from_descriptor(descriptor, &root, &descriptor_name)?;
        config.jobs = cli.jobs.max(1);
        config.verbose = cli.verbose;
        Ok(config)
    }

    /// Build configuration from an already parsed descriptor
    pub fn from_descriptor(
        descriptor: ProjectDescriptor,
        root: &Path,
        descriptor_name: &str,
    ) -> Result<Self, BuildError> {
        let missing = |key: &str| BuildError::MissingConfig {
            key: key.to_string(),
            file: descriptor_name.to_string(),
        };
        let invalid = |reason: String| BuildError::InvalidConfig {
            path: root.join(descriptor_name),
            reason,
        };

        let section = descriptor.theme.ok_or_else(|| missing("theme"))?;
        if section.themes.is_empty() {
            return Err(missing("theme.themes"));
        }

        let mut themes = Vec::with_capacity(section.themes.len());
        let mut seen = HashSet::new();
        for (index, entry) in section.themes.into_iter().enumerate() {
            let name = entry
                .name
                .ok_or_else(|| missing(&format!("theme.themes[{index}].name")))?;
            let email = entry
                .email
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| missing(&format!("theme.themes[{index}].email")))?;
            let name = ThemeName::validated(&name).map_err(invalid)?;
            if !seen.insert(name.clone()) {
                return Err(invalid(format!("duplicate theme name '{name}'")));
            }
            let display_name = entry.display_name.unwrap_or_else(|| name.to_string());
            let pattern = entry
                .email_pattern
                .unwrap_or_else(|| DEFAULT_EMAIL_PATTERN.to_string());

            themes.push(Theme::new(index, name, display_name, email, &pattern).map_err(invalid)?);
        }

        let template_dir = section.template_output_dir.unwrap_or_default();
        if !is_contained_relative(&template_dir) {
            return Err(invalid(format!(
                "theme.templateOutputDir must be a relative path inside the build: {}",
                template_dir.display()
            )));
        }
        let template_dir = without_cur_dir(&template_dir);
        // Cleanup deletes the staged heml sources before bundling
        if template_dir.starts_with(STAGED_HEML_DIR) {
            return Err(invalid(format!(
                "theme.templateOutputDir must not be inside {STAGED_HEML_DIR}/, which is removed before bundling: {}",
                template_dir.display()
            )));
        }

        let manifest = section
            .manifest
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST));
        if manifest.as_os_str().is_empty() || !is_contained_relative(&manifest) {
            return Err(invalid(format!(
                "theme.manifest must be a relative path inside the theme: {}",
                manifest.display()
            )));
        }

        Ok(Config {
            layout: Layout::new(root),
            descriptor_name: descriptor_name.to_string(),
            themes,
            deploy_base: section.mautic_base_path.map(|p| root.join(p)),
            minify: section.enable_minifier,
            sass_binary: section
                .sass_binary
                .unwrap_or_else(|| DEFAULT_SASS_BINARY.to_string()),
            heml_binary: section
                .heml_binary
                .unwrap_or_else(|| DEFAULT_HEML_BINARY.to_string()),
            template_dir,
            manifest,
            jobs: num_cpus::get().max(1),
            verbose: false,
        })
    }

    /// Directory themes are deployed into: `<mauticBasePath>/themes`
    pub fn deploy_dir(&self) -> Result<PathBuf, BuildError> {
        self.deploy_base
            .as_ref()
            .map(|base| base.join("themes"))
            .ok_or_else(|| BuildError::MissingConfig {
                key: "theme.mauticBasePath".to_string(),
                file: self.descriptor_name.clone(),
            })
    }
}

/// Read and parse the project descriptor
pub fn read_descriptor(path: &Path) -> Result<ProjectDescriptor, BuildError> {
    let content = fs::read_to_string(path).map_err(|e| BuildError::InvalidConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| BuildError::InvalidConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Drop `.` components so the path compares equal to walked relative paths
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Relative path with no root, prefix or parent components
fn is_contained_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
