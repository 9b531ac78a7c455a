//! Watch mode for automatic rebuilds on file changes
//!
//! Provides file system watching with debouncing for `themesmith --watch`.
//!
//! The debouncer runs on its own thread and forwards batches of changed paths
//! into a channel. The rebuild loop consumes that channel one generation at a
//! time: changes that arrive while a generation is running stay queued, and
//! everything queued is folded into exactly one following generation.

use crate::build::progress::ProgressEvent;
use crate::build::{expand_braces, BuildError, Generation, GenerationReport, Orchestrator};
use crate::config::schema::WatchConfig;
use glob::{MatchOptions, Pattern};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Error during watch mode
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("Failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("Failed to watch path: {0}")]
    WatchPath(#[source] notify::Error),
    /// The watcher stopped delivering events
    #[error("Watch channel closed")]
    ChannelClosed,
    /// Source directory not found
    #[error("Source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// The startup asset copy failed
    #[error("Startup failed: {0}")]
    Startup(#[source] BuildError),
}

/// Tracks files with errors across generations for recovery detection
#[derive(Debug, Default)]
pub struct ErrorTracker {
    /// Files that failed in the previous generation
    files_with_errors: HashSet<PathBuf>,
}

impl ErrorTracker {
    /// Create a new error tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Update tracker with a generation result, returns list of fixed files
    pub fn update(&mut self, result: &Result<GenerationReport, BuildError>) -> Vec<PathBuf> {
        let current: HashSet<PathBuf> = match result {
            Ok(_) => HashSet::new(),
            Err(e) => e.failing_path().map(Path::to_path_buf).into_iter().collect(),
        };

        let mut fixed: Vec<PathBuf> = self.files_with_errors.difference(&current).cloned().collect();
        fixed.sort();
        self.files_with_errors = current;
        fixed
    }

    /// Check if there are any tracked errors
    pub fn has_errors(&self) -> bool {
        !self.files_with_errors.is_empty()
    }

    /// Get the number of files with errors
    pub fn error_count(&self) -> usize {
        self.files_with_errors.len()
    }
}

/// Options for watch mode
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Debounce delay
    pub debounce: Duration,
    /// Clear terminal between rebuilds
    pub clear_screen: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::from(&WatchConfig::default())
    }
}

impl From<&WatchConfig> for WatchOptions {
    fn from(config: &WatchConfig) -> Self {
        Self { debounce: Duration::from_millis(u64::from(config.debounce_ms)), clear_screen: config.clear_screen }
    }
}

/// Decides which changed paths start a new generation.
///
/// A path qualifies if it was matched at the last refresh, or if it matches
/// one of the watched patterns now (files created since the refresh).
#[derive(Debug)]
pub struct WatchFilter {
    src: PathBuf,
    known: BTreeSet<PathBuf>,
    patterns: Vec<Pattern>,
}

impl WatchFilter {
    /// Build the filter from the orchestrator's current watch set.
    pub fn new(orchestrator: &Orchestrator) -> Result<Self, BuildError> {
        let config = orchestrator.context().config();
        let patterns = [&config.styles.pattern, &config.scripts.pattern]
            .into_iter()
            .chain(&config.templates.patterns)
            .chain(&config.watch.include)
            .flat_map(|p| expand_braces(p))
            .filter_map(|p| Pattern::new(&p).ok())
            .collect();

        Ok(Self { src: orchestrator.context().src_dir(), known: orchestrator.watch_set()?, patterns })
    }

    /// Number of files currently matched.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether no file is currently matched.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Whether a change to `path` should trigger a rebuild.
    pub fn is_relevant(&self, path: &Path) -> bool {
        if self.known.contains(path) {
            return true;
        }
        let Ok(relative) = path.strip_prefix(&self.src) else {
            return false;
        };
        let options = MatchOptions { require_literal_separator: true, ..MatchOptions::new() };
        self.patterns.iter().any(|p| p.matches_path_with(relative, options))
    }
}

/// Clear the terminal screen
fn clear_screen() {
    // ANSI escape code to clear screen and move cursor to top-left
    print!("\x1B[2J\x1B[1;1H");
}

fn report_fixed(orchestrator: &Orchestrator, fixed: Vec<PathBuf>) {
    for path in fixed {
        orchestrator.progress().report(ProgressEvent::Fixed { path: path.display().to_string() });
    }
}

fn refresh(orchestrator: &Orchestrator, current: Option<WatchFilter>) -> Option<WatchFilter> {
    match WatchFilter::new(orchestrator) {
        Ok(filter) => {
            tracing::debug!(files = filter.len(), "watch set refreshed");
            Some(filter)
        }
        Err(e) => {
            orchestrator.progress().report(ProgressEvent::Warning {
                path: e.failing_path().map(|p| p.display().to_string()),
                message: format!("Could not refresh watch set: {}", e),
            });
            current
        }
    }
}

/// Run the startup generation, then one generation per batch of changes.
///
/// `changes` yields batches of changed paths. Returns only when the channel
/// closes or when the startup asset copy fails.
pub async fn rebuild_loop(
    orchestrator: &Orchestrator,
    options: &WatchOptions,
    mut changes: UnboundedReceiver<Vec<PathBuf>>,
) -> Result<(), WatchError> {
    let mut tracker = ErrorTracker::new();
    let mut generation = Generation::first();

    if options.clear_screen {
        clear_screen();
    }
    let copy_assets = orchestrator.context().mode().copies_assets();
    match orchestrator.run_generation(generation, copy_assets).await {
        Err(e @ BuildError::Copy(_)) => return Err(WatchError::Startup(e)),
        result => {
            tracker.update(&result);
        }
    }

    let mut filter = refresh(orchestrator, None);
    tracing::info!(src = %orchestrator.context().src_dir().display(), "watching for changes");

    loop {
        let mut batch = changes.recv().await.ok_or(WatchError::ChannelClosed)?;
        while let Ok(more) = changes.try_recv() {
            batch.extend(more);
        }

        let changed: BTreeSet<PathBuf> = match &filter {
            Some(filter) => batch.into_iter().filter(|p| filter.is_relevant(p)).collect(),
            None => batch.into_iter().collect(),
        };
        if changed.is_empty() {
            continue;
        }

        if options.clear_screen {
            clear_screen();
        }
        orchestrator.progress().report(ProgressEvent::FilesChanged {
            paths: changed.iter().map(|p| p.display().to_string()).collect(),
        });

        generation = generation.next();
        let result = orchestrator.run_generation(generation, false).await;
        report_fixed(orchestrator, tracker.update(&result));
        filter = refresh(orchestrator, filter);
    }
}

/// Watch the source root and rebuild on every qualifying change.
///
/// Runs until the process is interrupted. Generation failures are reported
/// and watching continues; only setup failures return an error.
///
/// # Example
/// ```ignore
/// let orchestrator = Orchestrator::new(context, collaborators).with_progress(progress);
/// watch_and_rebuild(&orchestrator, WatchOptions::from(&config.watch)).await?;
/// ```
pub async fn watch_and_rebuild(orchestrator: &Orchestrator, options: WatchOptions) -> Result<(), WatchError> {
    let src = orchestrator.context().src_dir();
    if !src.is_dir() {
        return Err(WatchError::SourceNotFound(src));
    }

    let (tx, rx) = unbounded_channel();
    let mut debouncer = new_debouncer(options.debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            let paths: Vec<PathBuf> = events
                .into_iter()
                .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                .map(|e| e.path)
                .collect();
            if !paths.is_empty() {
                let _ = tx.send(paths);
            }
        }
        Err(error) => tracing::warn!(error = ?error, "watch error, continuing"),
    })
    .map_err(WatchError::WatcherInit)?;

    debouncer.watcher().watch(&src, RecursiveMode::Recursive).map_err(WatchError::WatchPath)?;

    rebuild_loop(orchestrator, &options, rx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::progress::ProgressReporter;
    use crate::build::{BuildContext, BuildMode, Collaborators, CompileError, Compiler, HtmlMinifier, MinifyError};
    use crate::build::SvgOptimizer;
    use crate::config::ThemeConfig;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct CopyCompiler;

    #[async_trait]
    impl Compiler for CopyCompiler {
        fn name(&self) -> &str {
            "copy"
        }

        async fn compile(&self, source: &Path, dest: &Path) -> Result<(), CompileError> {
            tokio::fs::copy(source, dest).await.map(|_| ()).map_err(|e| CompileError::Other(e.to_string()))
        }
    }

    /// Fails its first compile, then copies.
    struct FailOnce(AtomicBool);

    #[async_trait]
    impl Compiler for FailOnce {
        fn name(&self) -> &str {
            "fail-once"
        }

        async fn compile(&self, source: &Path, dest: &Path) -> Result<(), CompileError> {
            if self.0.swap(false, Ordering::SeqCst) {
                return Err(CompileError::Other("syntax error".to_string()));
            }
            CopyCompiler.compile(source, dest).await
        }
    }

    struct Identity;

    impl HtmlMinifier for Identity {
        fn minify(&self, html: &str) -> Result<String, MinifyError> {
            Ok(html.to_string())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn generations(&self) -> Vec<(u64, bool)> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::GenerationCompleted { generation, success, .. } => Some((*generation, *success)),
                    _ => None,
                })
                .collect()
        }

        fn fixed(&self) -> Vec<String> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::Fixed { path } => Some(path.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    fn setup(vendor_missing: bool) -> (TempDir, Orchestrator, Arc<Recorder>) {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("assets/stylesheets")).unwrap();
        fs::write(src.join("assets/stylesheets/main.scss"), "body{}").unwrap();
        fs::write(src.join("base.html"), "<p></p>").unwrap();

        let mut config = ThemeConfig::default();
        if !vendor_missing {
            config.vendor.clear();
        }
        let recorder = Arc::new(Recorder::default());
        let collaborators = Collaborators {
            style_compiler: Arc::new(CopyCompiler),
            script_compiler: Arc::new(CopyCompiler),
            svg: Arc::new(SvgOptimizer::new()),
            minifier: Arc::new(Identity),
        };
        let context =
            BuildContext::new(config, temp.path().to_path_buf()).with_mode(BuildMode::new(true, false, false));
        let orchestrator = Orchestrator::new(context, collaborators).with_progress(recorder.clone());
        (temp, orchestrator, recorder)
    }

    #[test]
    fn test_watch_options_from_config() {
        let options = WatchOptions::from(&WatchConfig { debounce_ms: 250, ..WatchConfig::default() });
        assert_eq!(options.debounce, Duration::from_millis(250));
        assert!(!options.clear_screen);
        assert_eq!(WatchOptions::default().debounce, Duration::from_millis(100));
    }

    #[test]
    fn test_error_tracker_detects_fixed_files() {
        let mut tracker = ErrorTracker::new();
        let failed: Result<GenerationReport, BuildError> =
            Err(BuildError::Copy(crate::build::CopyError::MissingSource(PathBuf::from("icons"))));
        assert!(tracker.update(&failed).is_empty());
        assert!(tracker.has_errors());
        assert_eq!(tracker.error_count(), 1);

        let ok = Ok(GenerationReport::new(Generation::first()));
        assert_eq!(tracker.update(&ok), vec![PathBuf::from("icons")]);
        assert!(!tracker.has_errors());
    }

    #[test]
    fn test_watch_filter_relevance() {
        let (temp, orchestrator, _) = setup(false);
        let filter = WatchFilter::new(&orchestrator).unwrap();
        let src = temp.path().join("src");

        assert!(filter.is_relevant(&src.join("assets/stylesheets/main.scss")));
        assert!(filter.is_relevant(&src.join("base.html")));
        // created after the refresh, matched by pattern
        assert!(filter.is_relevant(&src.join("partials/new.html")));
        assert!(filter.is_relevant(&src.join("assets/stylesheets/_new.scss")));
        assert!(!filter.is_relevant(&src.join("assets/images/logo.png")));
        assert!(!filter.is_relevant(&temp.path().join("material/base.html")));
    }

    #[tokio::test]
    async fn test_rebuild_loop_coalesces_queued_changes() {
        let (temp, orchestrator, recorder) = setup(false);
        let main = temp.path().join("src/assets/stylesheets/main.scss");

        let (tx, rx) = unbounded_channel();
        tx.send(vec![main.clone()]).unwrap();
        tx.send(vec![main.clone(), temp.path().join("src/base.html")]).unwrap();
        drop(tx);

        let result = rebuild_loop(&orchestrator, &WatchOptions::default(), rx).await;
        assert!(matches!(result, Err(WatchError::ChannelClosed)));
        assert_eq!(recorder.generations(), vec![(1, true), (2, true)]);
    }

    #[tokio::test]
    async fn test_rebuild_loop_ignores_irrelevant_changes() {
        let (temp, orchestrator, recorder) = setup(false);
        let (tx, rx) = unbounded_channel();
        tx.send(vec![temp.path().join("src/README.txt")]).unwrap();
        drop(tx);

        let _ = rebuild_loop(&orchestrator, &WatchOptions::default(), rx).await;
        assert_eq!(recorder.generations(), vec![(1, true)]);
    }

    #[tokio::test]
    async fn test_rebuild_loop_survives_failure_and_reports_fix() {
        let (temp, orchestrator, recorder) = setup(false);
        let collaborators = Collaborators {
            style_compiler: Arc::new(FailOnce(AtomicBool::new(true))),
            script_compiler: Arc::new(CopyCompiler),
            svg: Arc::new(SvgOptimizer::new()),
            minifier: Arc::new(Identity),
        };
        let orchestrator =
            Orchestrator::new(orchestrator.context().clone(), collaborators).with_progress(recorder.clone());

        let (tx, rx) = unbounded_channel();
        tx.send(vec![temp.path().join("src/assets/stylesheets/main.scss")]).unwrap();
        drop(tx);

        let result = rebuild_loop(&orchestrator, &WatchOptions::default(), rx).await;
        assert!(matches!(result, Err(WatchError::ChannelClosed)));
        assert_eq!(recorder.generations(), vec![(1, false), (2, true)]);
        assert_eq!(recorder.fixed(), vec!["assets/stylesheets/main.scss".to_string()]);
    }

    #[tokio::test]
    async fn test_rebuild_loop_startup_copy_failure_is_fatal() {
        let (_temp, orchestrator, _) = setup(true);
        let (_tx, rx) = unbounded_channel();
        let result = rebuild_loop(&orchestrator, &WatchOptions::default(), rx).await;
        assert!(matches!(result, Err(WatchError::Startup(BuildError::Copy(_)))));
    }

    #[tokio::test]
    async fn test_watch_missing_source() {
        let (temp, orchestrator, _) = setup(false);
        fs::remove_dir_all(temp.path().join("src")).unwrap();
        let result = watch_and_rebuild(&orchestrator, WatchOptions::default()).await;
        assert!(matches!(result, Err(WatchError::SourceNotFound(_))));
    }
}
