//! Theme descriptors and template naming rules.
//!
//! Provides a validated theme name newtype using `Arc<str>`, the per-theme
//! settings loaded from the project descriptor, and the file naming
//! convention shared by the template compiler and the theme bundler.

use globset::{Glob, GlobMatcher};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name the designated main template receives inside every theme
pub const MAIN_TEMPLATE_NAME: &str = "email.html.twig";

/// Default glob for the family of main-template candidates
pub const DEFAULT_EMAIL_PATTERN: &str = "email*.html.twig";

/// Theme name used as output directory and archive name (e.g., "promo").
/// Newtype wrapper so only single path components reach the filesystem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThemeName(Arc<str>);

impl ThemeName {
    /// Create a validated ThemeName, returning error for names that are not
    /// a single plain path component
    pub fn validated(s: &str) -> Result<Self, String> {
        if Self::validate_format(s) {
            Ok(Self(Arc::from(s)))
        } else {
            Err(format!(
                "invalid theme name '{}': expected a plain directory name (e.g., promo)",
                s
            ))
        }
    }

    #[inline]
    fn validate_format(s: &str) -> bool {
        !s.is_empty()
            && s != "."
            && s != ".."
            && !s.contains(|c: char| c == '/' || c == '\\')
            && !s.chars().any(char::is_control)
    }

    /// Get the inner string reference
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Archive file name for this theme
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.0)
    }
}

impl fmt::Display for ThemeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A theme declared in the project descriptor
#[derive(Debug, Clone)]
pub struct Theme {
    /// Position in the descriptor's theme list (used in error hints)
    pub index: usize,
    /// Directory and archive name
    pub name: ThemeName,
    /// Human-readable name written into the manifest
    pub display_name: String,
    /// Source template file name under the heml directory
    pub email: String,
    /// Candidates matching this pattern are dropped unless designated
    pub email_pattern: GlobMatcher,
}

impl Theme {
    /// Build a theme, compiling its email pattern
    pub fn new(
        index: usize,
        name: ThemeName,
        display_name: String,
        email: String,
        email_pattern: &str,
    ) -> Result<Self, String> {
        let email_pattern = Glob::new(email_pattern)
            .map_err(|e| format!("invalid emailPattern '{}': {}", email_pattern, e))?
            .compile_matcher();
        Ok(Self {
            index,
            name,
            display_name,
            email,
            email_pattern,
        })
    }

    /// File name the configured email template has after compilation
    pub fn compiled_email_name(&self) -> String {
        let file_name = Path::new(&self.email)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.email.clone());
        compiled_file_name(&file_name)
    }

    /// Path of the designated template relative to the theme directory
    pub fn designated_template(&self, template_dir: &Path) -> PathBuf {
        template_dir.join(self.compiled_email_name())
    }

    /// Whether a file name belongs to the main-template candidate family
    pub fn is_email_candidate(&self, file_name: &str) -> bool {
        self.email_pattern.is_match(file_name)
    }
}

/// Output name for a compiled template.
///
/// `email.heml.twig` becomes `email.html.twig`, `welcome.heml` becomes
/// `welcome.html.twig`, anything else gets `.heml` in the stem replaced with
/// `.html` and its extension replaced with `.twig`.
pub fn compiled_file_name(file_name: &str) -> String {
    let (stem, ext) = match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos + 1..]),
        _ => (file_name, ""),
    };

    if ext == "heml" {
        return format!("{stem}.html.twig");
    }

    format!("{}.twig", stem.replacen(".heml", ".html", 1))
}
