//! Build context containing configuration and mode flags for a build.

use crate::config::ThemeConfig;
use std::path::{Path, PathBuf};

/// Mode flags selected on the command line.
///
/// The flags combine freely. With none set the build is a one-shot full
/// build. `dirty` skips the asset copy phase, `optimize` turns on
/// content-hashed outputs and manifest-based literal rewriting in templates,
/// and `watch` keeps rebuilding on file changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildMode {
    /// Rebuild continuously on file changes
    pub watch: bool,
    /// Skip the asset copy phase
    pub dirty: bool,
    /// Hash outputs and rewrite template references
    pub optimize: bool,
}

impl BuildMode {
    /// Create a mode from the three flags.
    pub fn new(watch: bool, dirty: bool, optimize: bool) -> Self {
        Self { watch, dirty, optimize }
    }

    /// Whether no flag is set.
    pub fn is_normal(&self) -> bool {
        !self.watch && !self.dirty && !self.optimize
    }

    /// Whether the asset copy phase runs.
    pub fn copies_assets(&self) -> bool {
        !self.dirty
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_normal() {
            return write!(f, "normal");
        }
        let flags: Vec<&str> = [(self.watch, "watch"), (self.dirty, "dirty"), (self.optimize, "optimize")]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();
        write!(f, "{}", flags.join("+"))
    }
}

/// Build context containing configuration and paths for a build operation.
///
/// The context is constructed once at startup and handed to the orchestrator;
/// leaf components only ever see the paths and flags derived from it.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// The loaded configuration
    config: ThemeConfig,
    /// Project root directory (where themesmith.toml is located)
    project_root: PathBuf,
    /// Selected build mode
    mode: BuildMode,
}

impl BuildContext {
    /// Create a new build context in normal mode.
    pub fn new(config: ThemeConfig, project_root: PathBuf) -> Self {
        Self { config, project_root, mode: BuildMode::default() }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the source root (resolved to absolute path).
    pub fn src_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.src)
    }

    /// Get the output root (resolved to absolute path).
    pub fn out_dir(&self) -> PathBuf {
        self.resolve_path(&self.config.project.out)
    }

    /// Get the build mode.
    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Set the build mode.
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BuildContext {
        BuildContext::new(ThemeConfig::default(), PathBuf::from("/project"))
    }

    #[test]
    fn test_build_context_new() {
        let ctx = context();
        assert_eq!(ctx.project_root(), Path::new("/project"));
        assert!(ctx.mode().is_normal());
    }

    #[test]
    fn test_build_context_dirs() {
        let ctx = context();
        assert_eq!(ctx.src_dir(), PathBuf::from("/project/src"));
        assert_eq!(ctx.out_dir(), PathBuf::from("/project/material"));
    }

    #[test]
    fn test_build_context_resolve_path_absolute() {
        let ctx = context();
        assert_eq!(ctx.resolve_path(Path::new("/other/path")), PathBuf::from("/other/path"));
    }

    #[test]
    fn test_build_context_with_mode() {
        let ctx = context().with_mode(BuildMode::new(true, false, true));
        assert!(ctx.mode().watch);
        assert!(ctx.mode().optimize);
        assert!(ctx.mode().copies_assets());
    }

    #[test]
    fn test_build_mode_display() {
        assert_eq!(BuildMode::default().to_string(), "normal");
        assert_eq!(BuildMode::new(false, true, false).to_string(), "dirty");
        assert_eq!(BuildMode::new(true, true, true).to_string(), "watch+dirty+optimize");
    }

    #[test]
    fn test_dirty_skips_copy() {
        assert!(!BuildMode::new(false, true, false).copies_assets());
        assert!(BuildMode::new(false, false, true).copies_assets());
    }
}
