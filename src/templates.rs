//! HEML template compilation.
//!
//! Each template goes through four steps:
//! - include resolution (`@include('partial.heml', {"var": "value"})`)
//! - HEML to HTML compilation with soft validation
//! - optional minification
//! - renaming to the Twig naming convention (`email.heml.twig` -> `email.html.twig`)
//!
//! Unlike style compilation, a failing template aborts the whole batch.

use minify_html::Cfg;
use regex::Regex;
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

use crate::copier::write_file;
use crate::error::BuildError;
use crate::scanner::scan_template_sources;
use crate::theme::compiled_file_name;
use crate::workspace::Layout;

/// Nesting limit for includes; deeper chains are treated as circular
pub const MAX_INCLUDE_DEPTH: usize = 32;

const INCLUDE_PATTERN: &str =
    r#"@include\(\s*(?:'([^']+)'|"([^"]+)")\s*(?:,\s*(\{[\s\S]*?\})\s*)?\)"#;

/// Inlines `@include` directives, relative to the including file
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    directive: Regex,
}

impl IncludeResolver {
    pub fn new() -> Result<Self, BuildError> {
        let directive = Regex::new(INCLUDE_PATTERN).map_err(|e| BuildError::Pattern(e.to_string()))?;
        Ok(Self { directive })
    }

    /// Read `path` and expand all includes it references
    pub fn resolve_file(&self, path: &Path) -> Result<String, BuildError> {
        let text = fs::read_to_string(path)?;
        self.expand(&text, path, &Map::new(), 0)
    }

    /// Expand includes in `text`, which was read from `file`
    pub fn resolve_str(&self, text: &str, file: &Path) -> Result<String, BuildError> {
        self.expand(text, file, &Map::new(), 0)
    }

    fn expand(
        &self,
        text: &str,
        file: &Path,
        vars: &Map<String, Value>,
        depth: usize,
    ) -> Result<String, BuildError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(BuildError::IncludeDepth {
                path: file.to_path_buf(),
                limit: MAX_INCLUDE_DEPTH,
            });
        }

        let text = substitute_vars(text, vars);
        let base = file.parent().unwrap_or_else(|| Path::new(""));
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in self.directive.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(target) = caps.get(1).or_else(|| caps.get(2)) else {
                continue;
            };

            out.push_str(&text[last..whole.start()]);

            let mut child_vars = vars.clone();
            if let Some(params) = caps.get(3) {
                match serde_json::from_str::<Value>(params.as_str()) {
                    Ok(Value::Object(map)) => child_vars.extend(map),
                    Ok(_) => {}
                    Err(e) => {
                        return Err(BuildError::TemplateCompile {
                            path: file.to_path_buf(),
                            message: format!("invalid include parameters: {e}"),
                        })
                    }
                }
            }

            let included = base.join(target.as_str());
            let content = fs::read_to_string(&included).map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    BuildError::IncludeNotFound {
                        path: included.clone(),
                        from: file.to_path_buf(),
                    }
                } else {
                    BuildError::Io(e)
                }
            })?;

            out.push_str(&self.expand(&content, &included, &child_vars, depth + 1)?);
            last = whole.end();
        }

        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// Replace `@name` with the variable's value; longer names first so that
/// `@title` never clobbers `@titleColor`
fn substitute_vars(text: &str, vars: &Map<String, Value>) -> String {
    if vars.is_empty() {
        return text.to_string();
    }

    let mut keys: Vec<&String> = vars.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut result = text.to_string();
    for key in keys {
        let value = match &vars[key.as_str()] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        result = result.replace(&format!("@{key}"), &value);
    }
    result
}

/// Validation level passed to the HEML compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validation {
    Strict,
    /// Validation problems are reported as warnings
    #[default]
    Soft,
    None,
}

impl Validation {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Validation::Strict => "strict",
            Validation::Soft => "soft",
            Validation::None => "none",
        }
    }
}

/// HTML produced by a markup compiler, with non-fatal diagnostics
#[derive(Debug, Default, Clone)]
pub struct MarkupOutput {
    pub html: String,
    pub warnings: Vec<String>,
}

/// Compiles resolved HEML markup to HTML
pub trait MarkupCompiler: Send + Sync {
    /// `source` is the template the markup was read from, for diagnostics
    fn compile(&self, markup: &str, source: &Path) -> Result<MarkupOutput, BuildError>;
}

/// Runs the external `heml` CLI
#[derive(Debug, Clone)]
pub struct HemlCommand {
    program: String,
    validation: Validation,
}

impl HemlCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            validation: Validation::default(),
        }
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Command-line arguments for compiling `input` into `output`
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            OsString::from("build"),
            input.as_os_str().to_os_string(),
            OsString::from("--output"),
            output.as_os_str().to_os_string(),
            OsString::from("--validate"),
            OsString::from(self.validation.as_str()),
        ]
    }
}

impl MarkupCompiler for HemlCommand {
    fn compile(&self, markup: &str, source: &Path) -> Result<MarkupOutput, BuildError> {
        let input = tempfile::Builder::new()
            .prefix("heml-input-")
            .suffix(".heml")
            .tempfile()?;
        fs::write(input.path(), markup)?;
        let output_file = tempfile::Builder::new()
            .prefix("heml-output-")
            .suffix(".html")
            .tempfile()?;

        let output = Command::new(&self.program)
            .args(self.args(input.path(), output_file.path()))
            .output()
            .map_err(|e| BuildError::CompilerUnavailable {
                program: self.program.clone(),
                source: e,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(BuildError::TemplateCompile {
                path: source.to_path_buf(),
                message: stderr.trim().to_string(),
            });
        }

        let warnings = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();

        Ok(MarkupOutput {
            html: fs::read_to_string(output_file.path())?,
            warnings,
        })
    }
}

/// Template compilation settings
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateOptions {
    /// Minify compiled HTML
    pub minify: bool,
}

/// Conservative HTML minification: whitespace collapsing that respects
/// inline content, minified `<style>` blocks, and untouched closing tags,
/// comments (Outlook conditionals) and Twig syntax
pub fn minify(html: &str) -> String {
    let mut cfg = Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = true;
    cfg.minify_css = true;
    cfg.preserve_brace_template_syntax = true;

    String::from_utf8_lossy(&minify_html::minify(html.as_bytes(), &cfg)).into_owned()
}

/// Compile one template into `output_dir`, returning the written path
pub fn compile_template(
    source: &Path,
    output_dir: &Path,
    resolver: &IncludeResolver,
    compiler: &dyn MarkupCompiler,
    options: TemplateOptions,
) -> Result<PathBuf, BuildError> {
    let markup = resolver.resolve_file(source)?;
    let compiled = compiler.compile(&markup, source)?;
    for warning in &compiled.warnings {
        warn!("{}: {}", source.display(), warning);
    }

    let html = if options.minify {
        minify(&compiled.html)
    } else {
        compiled.html
    };

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = output_dir.join(compiled_file_name(&file_name));
    write_file(&target, html.as_bytes())?;
    debug!("Compiled {} -> {}", source.display(), target.display());
    Ok(target)
}

/// Compile every top-level template under `input_dir` into `output_dir`,
/// keeping each template's directory relative to `input_dir`.
/// The first failure aborts the batch.
pub fn compile_templates(
    input_dir: &Path,
    output_dir: &Path,
    compiler: &dyn MarkupCompiler,
    options: TemplateOptions,
) -> Result<Vec<PathBuf>, BuildError> {
    let resolver = IncludeResolver::new()?;
    let mut written = Vec::new();

    for source in scan_template_sources(input_dir)? {
        let relative_dir = source
            .strip_prefix(input_dir)
            .ok()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new(""));
        let target_dir = output_dir.join(relative_dir);
        written.push(compile_template(
            &source,
            &target_dir,
            &resolver,
            compiler,
            options,
        )?);
    }

    info!(
        "Compiled {} template(s) into {}",
        written.len(),
        output_dir.display()
    );
    Ok(written)
}

/// Compile `src/heml/emails/<name>.heml` into `build/emails/` for preview
pub fn compile_email(
    layout: &Layout,
    name: &str,
    compiler: &dyn MarkupCompiler,
    options: TemplateOptions,
) -> Result<PathBuf, BuildError> {
    let source = layout.emails_source().join(format!("{name}.heml"));
    if !source.is_file() {
        return Err(BuildError::SourceNotFound { path: source });
    }

    let resolver = IncludeResolver::new()?;
    let target = compile_template(&source, &layout.emails, &resolver, compiler, options)?;
    info!("Compiled email {} -> {}", name, target.display());
    Ok(target)
}
