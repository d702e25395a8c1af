//! Task graph and stage orchestration.
//!
//! A task expands into an ordered list of primitive stages which run one
//! after another, each committing its output to disk before the next starts.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

use crate::bundler::bundle_themes;
use crate::config::Config;
use crate::deployer::deploy;
use crate::error::BuildError;
use crate::packager::package_themes;
use crate::styles::{compile_styles, StyleCompiler};
use crate::templates::{compile_email, compile_templates, MarkupCompiler, TemplateOptions};
use crate::workspace::{cleanup, reset, stage};

/// Usage line printed when `compile` is run without an email name
pub const COMPILE_USAGE: &str = "Usage: heml-theme-build compile --email welcome-email";

/// A node of the build task graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Clean,
    Copy,
    Sass,
    Heml,
    Cleanup,
    Bundle,
    Build,
    Deploy,
    Package,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Clean => "clean",
            Task::Copy => "copy",
            Task::Sass => "sass",
            Task::Heml => "heml",
            Task::Cleanup => "cleanup",
            Task::Bundle => "bundle",
            Task::Build => "build",
            Task::Deploy => "deploy",
            Task::Package => "package",
        }
    }

    /// Tasks that must complete first, in execution order
    pub fn dependencies(&self) -> &'static [Task] {
        match self {
            Task::Build => &[
                Task::Clean,
                Task::Copy,
                Task::Sass,
                Task::Heml,
                Task::Cleanup,
                Task::Bundle,
            ],
            Task::Deploy | Task::Package => &[Task::Build],
            _ => &[],
        }
    }

    /// Aggregate tasks only group their dependencies
    pub fn is_composite(&self) -> bool {
        matches!(self, Task::Build)
    }

    /// Whether this task writes into the Mautic installation
    pub fn needs_deploy_target(&self) -> bool {
        plan(*self).contains(&Task::Deploy)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expand `task` into primitive stages, dependencies first, each stage once
pub fn plan(task: Task) -> Vec<Task> {
    fn visit(task: Task, out: &mut Vec<Task>) {
        for dep in task.dependencies() {
            visit(*dep, out);
        }
        if !task.is_composite() && !out.contains(&task) {
            out.push(task);
        }
    }

    let mut out = Vec::new();
    visit(task, &mut out);
    out
}

/// Outcome of running a task
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Stages executed, in order
    pub stages: Vec<Task>,
    /// Archives written by the package stage
    pub archives: Vec<PathBuf>,
    /// Files copied into the Mautic installation
    pub deployed_files: u64,
    pub duration: Duration,
}

/// Runs tasks against one configuration with a fixed pair of compilers
pub struct Pipeline<'a> {
    config: &'a Config,
    styles: &'a dyn StyleCompiler,
    markup: &'a dyn MarkupCompiler,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        styles: &'a dyn StyleCompiler,
        markup: &'a dyn MarkupCompiler,
    ) -> Self {
        Self {
            config,
            styles,
            markup,
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    fn template_options(&self) -> TemplateOptions {
        TemplateOptions {
            minify: self.config.minify,
        }
    }

    /// Run `task` and everything it depends on.
    ///
    /// Tasks that deploy check for a deployment target before any stage runs.
    pub fn run(&self, task: Task) -> Result<RunSummary, BuildError> {
        if task.needs_deploy_target() {
            self.config.deploy_dir()?;
        }

        let start = Instant::now();
        let mut summary = RunSummary::default();
        for step in plan(task) {
            info!("Starting '{}'", step);
            let step_start = Instant::now();
            self.run_stage(step, &mut summary)?;
            info!(
                "Finished '{}' after {:.2}s",
                step,
                step_start.elapsed().as_secs_f64()
            );
            summary.stages.push(step);
        }
        summary.duration = start.elapsed();
        Ok(summary)
    }

    fn run_stage(&self, step: Task, summary: &mut RunSummary) -> Result<(), BuildError> {
        let config = self.config;
        let layout = &config.layout;

        match step {
            Task::Clean => reset(layout)?,
            Task::Copy => {
                stage(layout)?;
            }
            Task::Sass => {
                compile_styles(&layout.staged_assets(), self.styles)?;
            }
            Task::Heml => {
                compile_templates(
                    &layout.staged_heml(),
                    &layout.staging.join(&config.template_dir),
                    self.markup,
                    self.template_options(),
                )?;
            }
            Task::Cleanup => {
                cleanup(layout)?;
            }
            Task::Bundle => {
                bundle_themes(config)?;
            }
            Task::Package => {
                summary.archives = package_themes(config)?
                    .into_iter()
                    .map(|r| r.archive)
                    .collect();
            }
            Task::Deploy => {
                summary.deployed_files = deploy(config)?.stats.files;
            }
            Task::Build => {}
        }
        Ok(())
    }

    /// Compile one preview email. `None` is a usage error and writes nothing.
    pub fn compile_email(&self, email: Option<&str>) -> Result<PathBuf, BuildError> {
        let name = email
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BuildError::Usage {
                message: format!("Parameter --email is missing.\n{COMPILE_USAGE}"),
            })?;
        compile_email(
            &self.config.layout,
            name,
            self.markup,
            self.template_options(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectDescriptor;
    use crate::templates::MarkupOutput;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    struct FakeSass;

    impl StyleCompiler for FakeSass {
        fn compile(&self, source: &Path) -> Result<String, BuildError> {
            Ok(fs::read_to_string(source)?)
        }
    }

    struct FakeHeml;

    impl MarkupCompiler for FakeHeml {
        fn compile(&self, markup: &str, _source: &Path) -> Result<MarkupOutput, BuildError> {
            Ok(MarkupOutput {
                html: format!("<html>{}</html>", markup.trim()),
                warnings: Vec::new(),
            })
        }
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn project(root: &Path, theme: &str) -> Config {
        let descriptor: ProjectDescriptor =
            serde_json::from_str(&format!(r#"{{"theme": {theme}}}"#)).unwrap();
        let mut config = Config::from_descriptor(descriptor, root, "package.json").unwrap();
        config.jobs = 2;
        config
    }

    fn source_fixture(root: &Path) {
        write(
            &root.join("src/config.json"),
            r#"{"name": "Base", "author": "Logicify"}"#,
        );
        write(&root.join("src/assets/css/main.scss"), "p{color:red}");
        write(&root.join("src/assets/img/logo.png"), "png");
        write(
            &root.join("src/heml/welcome.heml"),
            "<body>@include('partials/footer.heml', {\"year\": \"2024\"})</body>",
        );
        write(&root.join("src/heml/partials/footer.heml"), "<p>@year</p>");
        write(&root.join("src/heml/email-news.heml.twig"), "<body>news</body>");
        write(&root.join("src/heml/emails/welcome-email.heml"), "<p>hi</p>");
    }

    fn run(config: &Config, task: Task) -> Result<RunSummary, BuildError> {
        Pipeline::new(config, &FakeSass, &FakeHeml).run(task)
    }

    // ==================== plan tests ====================

    #[test]
    fn test_plan_build() {
        assert_eq!(
            plan(Task::Build),
            vec![
                Task::Clean,
                Task::Copy,
                Task::Sass,
                Task::Heml,
                Task::Cleanup,
                Task::Bundle
            ]
        );
    }

    #[test]
    fn test_plan_package_runs_build_first() {
        let stages = plan(Task::Package);
        assert_eq!(stages.last(), Some(&Task::Package));
        assert_eq!(stages.len(), 7);
        assert_eq!(stages[0], Task::Clean);
    }

    #[test]
    fn test_plan_single_stage() {
        assert_eq!(plan(Task::Sass), vec![Task::Sass]);
    }

    #[test]
    fn test_needs_deploy_target() {
        assert!(Task::Deploy.needs_deploy_target());
        assert!(!Task::Package.needs_deploy_target());
        assert!(!Task::Build.needs_deploy_target());
    }

    // ==================== end-to-end tests ====================

    #[test]
    fn test_build_single_theme() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"themes": [{"name": "promo", "displayName": "Promo", "email": "welcome.heml"}]}"#,
        );

        let summary = run(&config, Task::Build).unwrap();

        assert_eq!(summary.stages, plan(Task::Build));
        let theme = temp.path().join("build/themes/promo");
        assert_eq!(
            fs::read_to_string(theme.join("email.html.twig")).unwrap(),
            "<html><body><p>2024</p></body></html>"
        );
        assert!(!theme.join("welcome.html.twig").exists());
        assert!(!theme.join("email-news.html.twig").exists());
        assert!(!theme.join("heml").exists());
        assert!(!theme.join("assets/css/main.scss").exists());
        assert!(!theme.join("assets/css/main.css").exists());
        assert!(theme.join("assets/img/logo.png").exists());

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(theme.join("config.json")).unwrap()).unwrap();
        assert_eq!(manifest["name"], "Promo");
        assert_eq!(manifest["author"], "Logicify");

        assert!(!config.layout.staging.exists());
    }

    #[test]
    fn test_build_with_dotted_template_dir() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"templateOutputDir": "./html", "themes": [{"name": "promo", "email": "welcome.heml"}]}"#,
        );

        run(&config, Task::Build).unwrap();

        let theme = temp.path().join("build/themes/promo");
        assert_eq!(
            fs::read_to_string(theme.join("html/email.html.twig")).unwrap(),
            "<html><body><p>2024</p></body></html>"
        );
        assert!(!theme.join("html/welcome.html.twig").exists());
    }

    #[test]
    fn test_package_two_themes() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"themes": [
                {"name": "promo", "email": "welcome.heml"},
                {"name": "newsletter", "email": "email-news.heml.twig"}
            ]}"#,
        );

        let summary = run(&config, Task::Package).unwrap();

        assert_eq!(
            summary.archives,
            vec![
                temp.path().join("build/promo.zip"),
                temp.path().join("build/newsletter.zip")
            ]
        );
        let news = temp.path().join("build/themes/newsletter");
        assert_eq!(
            fs::read_to_string(news.join("email.html.twig")).unwrap(),
            "<html><body>news</body></html>"
        );
        assert!(!news.join("email-news.html.twig").exists());
    }

    #[test]
    fn test_package_is_reproducible() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"themes": [{"name": "promo", "email": "welcome.heml"}]}"#,
        );
        let archive = temp.path().join("build/promo.zip");

        run(&config, Task::Package).unwrap();
        let first = fs::read(&archive).unwrap();
        run(&config, Task::Package).unwrap();
        let second = fs::read(&archive).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_template_produces_no_archives() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"themes": [{"name": "promo", "email": "missing.heml"}]}"#,
        );

        let err = run(&config, Task::Package).unwrap_err();

        assert!(matches!(err, BuildError::MainTemplateNotFound { .. }));
        assert!(!temp.path().join("build/promo.zip").exists());
        assert!(!temp.path().join("build/themes").exists());
    }

    #[test]
    fn test_deploy_requires_base_path_before_any_stage() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        write(&temp.path().join("build/marker"), "keep");
        let config = project(
            temp.path(),
            r#"{"themes": [{"name": "promo", "email": "welcome.heml"}]}"#,
        );

        let err = run(&config, Task::Deploy).unwrap_err();

        assert!(err.is_config_error());
        // Clean never ran
        assert!(temp.path().join("build/marker").exists());
    }

    #[test]
    fn test_deploy_copies_into_mautic() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"mauticBasePath": "mautic", "themes": [{"name": "promo", "email": "welcome.heml"}]}"#,
        );

        let summary = run(&config, Task::Deploy).unwrap();

        assert!(summary.deployed_files > 0);
        assert!(temp
            .path()
            .join("mautic/themes/promo/email.html.twig")
            .exists());
    }

    // ==================== compile tests ====================

    #[test]
    fn test_compile_email() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"themes": [{"name": "promo", "email": "welcome.heml"}]}"#,
        );
        let pipeline = Pipeline::new(&config, &FakeSass, &FakeHeml);

        let target = pipeline.compile_email(Some("welcome-email")).unwrap();

        assert_eq!(
            target,
            temp.path().join("build/emails/welcome-email.html.twig")
        );
        assert_eq!(fs::read_to_string(target).unwrap(), "<html><p>hi</p></html>");
    }

    #[test]
    fn test_compile_email_without_name_is_usage_error() {
        let temp = TempDir::new().unwrap();
        source_fixture(temp.path());
        let config = project(
            temp.path(),
            r#"{"themes": [{"name": "promo", "email": "welcome.heml"}]}"#,
        );
        let pipeline = Pipeline::new(&config, &FakeSass, &FakeHeml);

        let err = pipeline.compile_email(None).unwrap_err();

        assert!(err.is_config_error());
        assert!(err.to_string().contains(COMPILE_USAGE));
        assert!(!temp.path().join("build").exists());
    }
}
