//! Watch mode: rebuild and redeploy when sources change.
//!
//! Filesystem events are funnelled through one channel and coalesced with a
//! quiet-period debounce. Rebuilds run on the consumer thread, so a rebuild
//! never starts while another is still running.

use globset::GlobSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::BuildError;
use crate::scanner::build_glob_set;

/// Quiet period before a batch of changes triggers a rebuild
pub const DEBOUNCE: Duration = Duration::from_millis(200);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sources that trigger a rebuild, relative to `src/`
const WATCH_PATTERNS: &[&str] = &["assets/**/*.scss", "heml/**/*.heml", "heml/**/*.heml.twig"];

/// Preview emails are compiled on demand, never by the watcher
const IGNORE_PATTERNS: &[&str] = &["heml/emails/**"];

/// Decides which changed paths are worth a rebuild
#[derive(Debug, Clone)]
pub struct WatchFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl WatchFilter {
    pub fn new() -> Result<Self, BuildError> {
        Ok(Self {
            include: build_glob_set(WATCH_PATTERNS)?,
            exclude: build_glob_set(IGNORE_PATTERNS)?,
        })
    }

    /// `relative` is relative to the watched source root
    pub fn is_relevant(&self, relative: &Path) -> bool {
        if is_editor_temp(relative) || self.exclude.is_match(relative) {
            return false;
        }
        self.include.is_match(relative)
    }
}

/// Swap, backup and probe files written by editors while saving
fn is_editor_temp(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with('~')
        || name.starts_with(".#")
        || name == "4913"
        || [".swp", ".swx", ".tmp"].iter().any(|ext| name.ends_with(ext))
}

/// Pending changes awaiting the quiet period
#[derive(Debug, Default)]
pub struct WatcherState {
    pending: BTreeSet<PathBuf>,
    last_change: Option<Instant>,
}

impl WatcherState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_change(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path);
        self.last_change = Some(at);
    }

    /// True once changes are pending and none arrived during the last `DEBOUNCE`
    pub fn should_flush(&self, now: Instant) -> bool {
        match self.last_change {
            Some(last) => !self.pending.is_empty() && now.duration_since(last) >= DEBOUNCE,
            None => false,
        }
    }

    pub fn take_changes(&mut self) -> Vec<PathBuf> {
        self.last_change = None;
        std::mem::take(&mut self.pending).into_iter().collect()
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

fn run_logged<F>(rebuild: &mut F)
where
    F: FnMut() -> Result<(), BuildError>,
{
    if let Err(e) = rebuild() {
        error!("Rebuild failed: {}", e);
    }
}

/// Watch `source` until `running` is cleared, calling `rebuild` once on
/// start and once per debounced batch of relevant changes.
///
/// A failing rebuild is logged and watching continues.
pub fn watch<F>(source: &Path, running: Arc<AtomicBool>, mut rebuild: F) -> Result<(), BuildError>
where
    F: FnMut() -> Result<(), BuildError>,
{
    if !source.is_dir() {
        return Err(BuildError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }
    let source = source
        .canonicalize()
        .unwrap_or_else(|_| source.to_path_buf());
    let filter = WatchFilter::new()?;

    run_logged(&mut rebuild);

    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                if is_content_change(&event.kind) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| BuildError::Watch {
        path: source.clone(),
        reason: e.to_string(),
    })?;

    watcher
        .watch(&source, RecursiveMode::Recursive)
        .map_err(|e| BuildError::Watch {
            path: source.clone(),
            reason: e.to_string(),
        })?;
    info!("Watching {} for changes (Ctrl+C to stop)", source.display());

    let mut state = WatcherState::new();
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(path) => {
                let relative = path.strip_prefix(&source).unwrap_or(&path);
                if filter.is_relevant(relative) {
                    debug!("Changed: {}", relative.display());
                    state.add_change(path.clone(), Instant::now());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if state.should_flush(Instant::now()) {
            let changes = state.take_changes();
            info!("{} file(s) changed, rebuilding", changes.len());
            run_logged(&mut rebuild);
        }
    }

    info!("Stopped watching {}", source.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== WatchFilter tests ====================

    #[test]
    fn test_filter_accepts_sources() {
        let filter = WatchFilter::new().unwrap();
        assert!(filter.is_relevant(Path::new("assets/css/main.scss")));
        assert!(filter.is_relevant(Path::new("heml/welcome.heml")));
        assert!(filter.is_relevant(Path::new("heml/partials/footer.heml")));
        assert!(filter.is_relevant(Path::new("heml/email.heml.twig")));
    }

    #[test]
    fn test_filter_ignores_preview_emails() {
        let filter = WatchFilter::new().unwrap();
        assert!(!filter.is_relevant(Path::new("heml/emails/welcome-email.heml")));
    }

    #[test]
    fn test_filter_ignores_other_files() {
        let filter = WatchFilter::new().unwrap();
        assert!(!filter.is_relevant(Path::new("config.json")));
        assert!(!filter.is_relevant(Path::new("assets/img/logo.png")));
        assert!(!filter.is_relevant(Path::new("main.scss")));
    }

    #[test]
    fn test_filter_ignores_editor_temp_files() {
        let filter = WatchFilter::new().unwrap();
        assert!(!filter.is_relevant(Path::new("heml/welcome.heml~")));
        assert!(!filter.is_relevant(Path::new("heml/.welcome.heml.swp")));
        assert!(!filter.is_relevant(Path::new("heml/.#welcome.heml")));
        assert!(!filter.is_relevant(Path::new("heml/4913")));
        assert!(is_editor_temp(Path::new("assets/x.tmp")));
    }

    // ==================== WatcherState tests ====================

    #[test]
    fn test_state_waits_for_quiet_period() {
        let mut state = WatcherState::new();
        let t0 = Instant::now();
        assert!(!state.should_flush(t0));

        state.add_change(PathBuf::from("a.heml"), t0);
        assert!(!state.should_flush(t0 + Duration::from_millis(100)));

        // A new event restarts the quiet period
        state.add_change(PathBuf::from("b.heml"), t0 + Duration::from_millis(150));
        assert!(!state.should_flush(t0 + Duration::from_millis(300)));
        assert!(state.should_flush(t0 + Duration::from_millis(350)));
    }

    #[test]
    fn test_state_coalesces_duplicates() {
        let mut state = WatcherState::new();
        let t0 = Instant::now();
        state.add_change(PathBuf::from("a.heml"), t0);
        state.add_change(PathBuf::from("a.heml"), t0);
        state.add_change(PathBuf::from("b.scss"), t0);

        let changes = state.take_changes();

        assert_eq!(changes, vec![PathBuf::from("a.heml"), PathBuf::from("b.scss")]);
        assert!(!state.should_flush(t0 + DEBOUNCE));
    }

    #[test]
    fn test_watch_missing_source() {
        let running = Arc::new(AtomicBool::new(false));
        let result = watch(Path::new("/definitely/not/here"), running, || Ok(()));
        assert!(matches!(result, Err(BuildError::SourceNotFound { .. })));
    }

    #[test]
    fn test_watch_runs_initial_rebuild_and_stops() {
        let temp = tempfile::TempDir::new().unwrap();
        let running = Arc::new(AtomicBool::new(false));
        let mut calls = 0;

        watch(temp.path(), running, || {
            calls += 1;
            Err(BuildError::Usage {
                message: "ignored".to_string(),
            })
        })
        .unwrap();

        assert_eq!(calls, 1);
    }
}
