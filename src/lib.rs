//! # HEML Theme Build
//!
//! Build pipeline for Mautic email themes written in HEML.
//!
//! Sources under `src/` are staged into `build/theme/`, compiled (Sass to CSS,
//! HEML to Twig-compatible HTML), split into one output directory per
//! configured theme and finally zipped or copied into a Mautic installation.
//!
//! ## Features
//!
//! - Small task graph (`build`, `deploy`, `package`, ...) over on-disk stages
//! - `@include` resolution with JSON parameters for HEML partials
//! - Per-theme main template selection and manifest patching
//! - Reproducible zip archives built on a bounded worker pool
//! - Debounced watch mode
//!
//! ## Usage
//!
//! ```ignore
//! use heml_theme_build::pipeline::{Pipeline, Task};
//! use heml_theme_build::styles::SassCommand;
//! use heml_theme_build::templates::HemlCommand;
//!
//! let sass = SassCommand::new(&config.sass_binary);
//! let heml = HemlCommand::new(&config.heml_binary);
//! Pipeline::new(&config, &sass, &heml).run(Task::Package)?;
//! ```

/// Per-theme output assembly and manifest patching
pub mod bundler;

/// CLI configuration and project descriptor loading
pub mod config;

/// File copying and removal helpers
pub mod copier;

/// Copying themes into a Mautic installation
pub mod deployer;

/// Error types for build operations
pub mod error;

/// Zip packaging of bundled themes
pub mod packager;

/// Task graph and stage orchestration
pub mod pipeline;

/// Glob-based source discovery
pub mod scanner;

/// Sass compilation
pub mod styles;

/// HEML template compilation
pub mod templates;

/// Theme names and main template naming rules
pub mod theme;

/// Debounced watch mode
pub mod watcher;

/// Build directory layout and workspace stages
pub mod workspace;
