//! Asset copy passes.
//!
//! A [`CopyPass`] copies the files matching one glob pattern from a source
//! directory to a destination directory, optionally through a
//! [`ByteTransform`]. [`copy_all`] runs a set of passes concurrently and
//! returns only once every pass has finished.

use crate::build::discovery::{ResolveError, Resolver};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Error from an asset copy pass.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CopyError {
    /// The pass's source directory does not exist
    #[error("Copy source directory not found: {}", .0.display())]
    MissingSource(PathBuf),
    /// The pattern could not be resolved
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Reading or writing a file failed
    #[error("IO error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The byte transform rejected a file
    #[error("Failed to transform {}: {message}", path.display())]
    Transform { path: PathBuf, message: String },
    /// A copy task panicked or was cancelled
    #[error("Copy task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CopyError {
    /// The file or directory that failed, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            CopyError::MissingSource(path) => Some(path),
            CopyError::Io { path, .. } | CopyError::Transform { path, .. } => Some(path),
            CopyError::Resolve(ResolveError::MissingRoot(path)) => Some(path),
            _ => None,
        }
    }
}

/// Rewrites file contents on their way to the destination.
pub trait ByteTransform: Send + Sync {
    /// Transform the bytes read from `path`.
    fn transform(&self, path: &Path, data: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Destination of a matched file: `rel` under `to`, with leading `..` and `.`
/// segments dropped.
pub fn mirrored_path(to: &Path, rel: &Path) -> PathBuf {
    let kept: PathBuf = rel
        .components()
        .skip_while(|c| matches!(c, Component::ParentDir | Component::CurDir))
        .collect();
    to.join(kept)
}

/// One glob pattern copied from one directory to another.
#[derive(Clone)]
pub struct CopyPass {
    label: String,
    pattern: String,
    from: PathBuf,
    to: PathBuf,
    transform: Option<Arc<dyn ByteTransform>>,
}

impl CopyPass {
    /// Create a verbatim copy pass.
    pub fn new(pattern: impl Into<String>, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let pattern = pattern.into();
        Self { label: pattern.clone(), pattern, from: from.into(), to: to.into(), transform: None }
    }

    /// Pass every file through a byte transform.
    pub fn with_transform(mut self, transform: Arc<dyn ByteTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Set the label used in logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Copy every match and return the written paths.
    pub async fn run(&self) -> Result<Vec<PathBuf>, CopyError> {
        if !self.from.is_dir() {
            return Err(CopyError::MissingSource(self.from.clone()));
        }

        let matches = Resolver::new(&self.from, &self.pattern).resolve()?;
        let mut written = Vec::with_capacity(matches.len());

        for file in matches {
            let source = file.absolute(&self.from);
            let dest = mirrored_path(&self.to, file.path());

            let mut data = tokio::fs::read(&source)
                .await
                .map_err(|e| CopyError::Io { path: source.clone(), source: e })?;
            if let Some(transform) = &self.transform {
                data = transform
                    .transform(&source, data)
                    .map_err(|message| CopyError::Transform { path: source.clone(), message })?;
            }

            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CopyError::Io { path: parent.to_path_buf(), source: e })?;
            }
            tokio::fs::write(&dest, data).await.map_err(|e| CopyError::Io { path: dest.clone(), source: e })?;
            written.push(dest);
        }

        tracing::debug!(pass = %self.label, pattern = %self.pattern, count = written.len(), "copy pass complete");
        Ok(written)
    }
}

impl std::fmt::Debug for CopyPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyPass")
            .field("label", &self.label)
            .field("pattern", &self.pattern)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Run all passes concurrently; returns once every pass has finished.
///
/// The written paths of all passes are returned sorted. If any pass fails the
/// first failure (in pass order) is returned.
pub async fn copy_all(passes: Vec<CopyPass>) -> Result<Vec<PathBuf>, CopyError> {
    let mut tasks = JoinSet::new();
    for (index, pass) in passes.into_iter().enumerate() {
        tasks.spawn(async move { (index, pass.run().await) });
    }

    let mut results = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(index, _)| *index);

    let mut written = Vec::new();
    for (_, result) in results {
        written.extend(result?);
    }
    written.sort();
    Ok(written)
}
