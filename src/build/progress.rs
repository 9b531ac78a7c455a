//! Build progress reporting.
//!
//! User-facing output for generations and their phases. Reporters are
//! swappable: [`ConsoleProgress`] prints coloured lines for humans,
//! [`JsonProgress`] emits one JSON object per event for tooling, and
//! [`NullProgress`] discards everything (tests, embedding).
//!
//! # Example
//!
//! ```ignore
//! use themesmith::build::progress::{ConsoleProgress, ProgressEvent, ProgressReporter};
//! use themesmith::build::Phase;
//!
//! let reporter = ConsoleProgress::new();
//! reporter.report(ProgressEvent::GenerationStarted { generation: 1, mode: "optimize".to_string() });
//! reporter.report(ProgressEvent::PhaseStarted { phase: Phase::Transforming });
//! reporter.report(ProgressEvent::PhaseCompleted { phase: Phase::Transforming, files: 4, duration_ms: 830 });
//! ```

use crate::build::pipeline::Phase;
use std::io::Write;
use std::sync::Mutex;

/// Events that can be reported during a build.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A generation started
    GenerationStarted {
        /// Generation number
        generation: u64,
        /// Active mode flags
        mode: String,
    },
    /// A phase started
    PhaseStarted {
        /// The phase
        phase: Phase,
    },
    /// A phase completed
    PhaseCompleted {
        /// The phase
        phase: Phase,
        /// Number of files the phase wrote
        files: usize,
        /// Duration in milliseconds
        duration_ms: u64,
    },
    /// A generation finished
    GenerationCompleted {
        /// Generation number
        generation: u64,
        /// Whether every phase succeeded
        success: bool,
        /// One-line summary of the outputs
        summary: String,
        /// Total duration in milliseconds
        duration_ms: u64,
    },
    /// Watched files changed (watch mode)
    FilesChanged {
        /// Changed paths
        paths: Vec<String>,
    },
    /// A file that failed in an earlier generation built cleanly
    Fixed {
        /// The file
        path: String,
    },
    /// A warning was generated
    Warning {
        /// File that generated the warning (if applicable)
        path: Option<String>,
        /// Warning message
        message: String,
    },
    /// An error occurred
    Error {
        /// File that caused the error (if applicable)
        path: Option<String>,
        /// Error message
        message: String,
    },
}

/// Trait for progress reporters.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event.
    fn report(&self, event: ProgressEvent);
}

/// A progress reporter that discards all events.
#[derive(Debug, Default)]
pub struct NullProgress;

impl NullProgress {
    /// Create a new null progress reporter.
    pub fn new() -> Self {
        Self
    }
}

impl ProgressReporter for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Console progress reporter with optional colors.
pub struct ConsoleProgress {
    /// Whether to use colors
    use_colors: bool,
    /// Whether to prefix lines with the wall-clock time
    timestamps: bool,
    /// Whether to show verbose output
    verbose: bool,
    /// Output writer (for testing)
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for ConsoleProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleProgress")
            .field("use_colors", &self.use_colors)
            .field("timestamps", &self.timestamps)
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl ConsoleProgress {
    /// Create a new console progress reporter on stderr.
    pub fn new() -> Self {
        Self { use_colors: true, timestamps: true, verbose: false, output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a console progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { use_colors: false, timestamps: false, verbose: false, output: Mutex::new(Box::new(output)) }
    }

    /// Set whether to use colors.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Set whether to prefix lines with the time of day.
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn color(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    fn green(&self, text: &str) -> String {
        self.color(text, "\x1b[32m")
    }

    fn yellow(&self, text: &str) -> String {
        self.color(text, "\x1b[33m")
    }

    fn red(&self, text: &str) -> String {
        self.color(text, "\x1b[31m")
    }

    fn cyan(&self, text: &str) -> String {
        self.color(text, "\x1b[36m")
    }

    fn dim(&self, text: &str) -> String {
        self.color(text, "\x1b[2m")
    }

    /// Write a line to output.
    fn writeln(&self, line: &str) {
        let line = if self.timestamps { format!("{} {}", self.dim(&clock()), line) } else { line.to_string() };
        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", line);
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::GenerationStarted { generation, mode } => {
                self.writeln(&format!("{} Generation {} ({})", self.cyan("[build]"), generation, mode));
            }
            ProgressEvent::PhaseStarted { phase } => {
                if self.verbose {
                    self.writeln(&format!("{} {}...", self.cyan("[build]"), phase));
                }
            }
            ProgressEvent::PhaseCompleted { phase, files, duration_ms } => {
                self.writeln(&format!(
                    "{} {} {} ({} file{}, {})",
                    self.cyan("[build]"),
                    self.green("ok"),
                    phase,
                    files,
                    if files == 1 { "" } else { "s" },
                    format_duration(duration_ms)
                ));
            }
            ProgressEvent::GenerationCompleted { generation, success, summary, duration_ms } => {
                if success {
                    self.writeln(&format!(
                        "{} Generation {}: {} in {}",
                        self.green("[done]"),
                        generation,
                        summary,
                        format_duration(duration_ms)
                    ));
                } else {
                    self.writeln(&format!(
                        "{} Generation {} failed after {}",
                        self.red("[error]"),
                        generation,
                        format_duration(duration_ms)
                    ));
                }
            }
            ProgressEvent::FilesChanged { paths } => {
                if self.verbose || paths.len() <= 3 {
                    for path in &paths {
                        self.writeln(&format!("{} Changed: {}", self.cyan("[watch]"), path));
                    }
                } else {
                    self.writeln(&format!("{} {} files changed", self.cyan("[watch]"), paths.len()));
                }
            }
            ProgressEvent::Fixed { path } => {
                self.writeln(&format!("{} Fixed: {}", self.green("[watch]"), path));
            }
            ProgressEvent::Warning { path, message } => {
                let prefix = path.map(|p| format!("{}: ", p)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.yellow("[warn]"), prefix, message));
            }
            ProgressEvent::Error { path, message } => {
                let prefix = path.map(|p| format!("{}: ", p)).unwrap_or_default();
                self.writeln(&format!("{} {}{}", self.red("[error]"), prefix, message));
            }
        }
    }
}

/// JSON progress reporter for machine-readable output.
pub struct JsonProgress {
    /// Output writer
    output: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for JsonProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonProgress").finish()
    }
}

impl JsonProgress {
    /// Create a new JSON progress reporter writing to stderr.
    pub fn new() -> Self {
        Self { output: Mutex::new(Box::new(std::io::stderr())) }
    }

    /// Create a JSON progress reporter that writes to a custom output.
    pub fn with_output<W: Write + Send + 'static>(output: W) -> Self {
        Self { output: Mutex::new(Box::new(output)) }
    }
}

impl Default for JsonProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        use serde_json::json;

        let value = match event {
            ProgressEvent::GenerationStarted { generation, mode } => {
                json!({ "event": "generation_started", "generation": generation, "mode": mode })
            }
            ProgressEvent::PhaseStarted { phase } => {
                json!({ "event": "phase_started", "phase": phase.to_string() })
            }
            ProgressEvent::PhaseCompleted { phase, files, duration_ms } => json!({
                "event": "phase_completed",
                "phase": phase.to_string(),
                "files": files,
                "duration_ms": duration_ms,
            }),
            ProgressEvent::GenerationCompleted { generation, success, summary, duration_ms } => json!({
                "event": "generation_completed",
                "generation": generation,
                "success": success,
                "summary": summary,
                "duration_ms": duration_ms,
            }),
            ProgressEvent::FilesChanged { paths } => json!({ "event": "files_changed", "paths": paths }),
            ProgressEvent::Fixed { path } => json!({ "event": "fixed", "path": path }),
            ProgressEvent::Warning { path, message } => {
                json!({ "event": "warning", "path": path, "message": message })
            }
            ProgressEvent::Error { path, message } => json!({ "event": "error", "path": path, "message": message }),
        };

        if let Ok(mut output) = self.output.lock() {
            let _ = writeln!(output, "{}", value);
        }
    }
}

/// Local time of day as `HH:MM:SS`.
fn clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Format a duration in milliseconds to a human-readable string.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        format!("{}m {}s", minutes, seconds)
    }
}
