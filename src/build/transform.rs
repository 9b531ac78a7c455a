//! Per-file transform stages for stylesheets and scripts.
//!
//! A [`TransformStage`] hands each source file to a [`Compiler`] and reports
//! the [`OutputMapping`] it produced. The actual CSS/JS transformation lives
//! behind the [`Compiler`] trait; [`CommandCompiler`] runs an external program
//! such as `sass` or `esbuild`.

use crate::build::discovery::SourceFile;
use crate::build::manifest::{OutputMapping, StageBatch};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Error reported by a compiler collaborator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompileError {
    /// The compiler argv is empty
    #[error("Compiler command is empty")]
    EmptyCommand,
    /// The compiler program could not be started
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The compiler ran and reported failure
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed { program: String, status: String, stderr: String },
    /// Any other collaborator failure
    #[error("{0}")]
    Other(String),
}

/// Error from a transform stage, carrying the offending source file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransformError {
    /// Compiler failure for one file
    #[error("Failed to compile {}: {source}", path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: CompileError,
    },
    /// Filesystem failure around the compiler call
    #[error("IO error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A transform task panicked or was cancelled
    #[error("Transform task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TransformError {
    /// The file that failed, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            TransformError::Compile { path, .. } | TransformError::Io { path, .. } => Some(path),
            TransformError::Join(_) => None,
        }
    }
}

/// External CSS/JS compiler.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    /// Compile `source` and write the result to `dest`.
    async fn compile(&self, source: &Path, dest: &Path) -> Result<(), CompileError>;
}

/// Runs a configured argv, substituting `{src}` and `{dest}` in each argument.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    argv: Vec<String>,
}

impl CommandCompiler {
    /// Create a compiler from an argv template.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// The argv with placeholders filled in.
    pub fn command_line(&self, source: &Path, dest: &Path) -> Vec<String> {
        let src = source.to_string_lossy();
        let dst = dest.to_string_lossy();
        self.argv.iter().map(|arg| arg.replace("{src}", &src).replace("{dest}", &dst)).collect()
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("<empty>")
    }

    async fn compile(&self, source: &Path, dest: &Path) -> Result<(), CompileError> {
        let args = self.command_line(source, dest);
        let (program, rest) = args.split_first().ok_or(CompileError::EmptyCommand)?;

        tracing::debug!(program = %program, args = ?rest, "spawning compiler");
        let output = tokio::process::Command::new(program)
            .args(rest)
            .output()
            .await
            .map_err(|source| CompileError::Spawn { program: program.clone(), source })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CompileError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Which asset family a stage compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// `.scss` to `.css`
    Style,
    /// `.ts` to `.js`
    Script,
}

impl StageKind {
    /// Extension of the compiled output.
    pub fn output_extension(&self) -> &'static str {
        match self {
            StageKind::Style => "css",
            StageKind::Script => "js",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Style => write!(f, "styles"),
            StageKind::Script => write!(f, "scripts"),
        }
    }
}

/// Compute the content-addressed name `<stem>.<hash8>.min.<ext>` for an output.
pub fn fingerprint_path(dest: &Path, contents: &[u8]) -> PathBuf {
    let digest = format!("{:x}", Sha256::digest(contents));
    let stem = dest.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = dest.extension().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    dest.with_file_name(format!("{}.{}.min.{}", stem, &digest[..8], ext))
}

/// Compiles every file of one asset family.
pub struct TransformStage {
    kind: StageKind,
    root: PathBuf,
    out_root: PathBuf,
    compiler: Arc<dyn Compiler>,
    content_hash: bool,
}

impl TransformStage {
    /// Create a stage compiling files under `root` into `out_root`.
    pub fn new(
        kind: StageKind,
        root: impl Into<PathBuf>,
        out_root: impl Into<PathBuf>,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        Self { kind, root: root.into(), out_root: out_root.into(), compiler, content_hash: false }
    }

    /// Rename outputs to content-addressed names.
    pub fn with_content_hash(mut self, content_hash: bool) -> Self {
        self.content_hash = content_hash;
        self
    }

    /// Stage kind.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Output path for a source file, before any fingerprinting.
    pub fn dest_path(&self, file: &SourceFile) -> PathBuf {
        self.out_root.join(file.path().with_extension(self.kind.output_extension()))
    }

    /// Compile one file and report its mapping.
    pub async fn transform(&self, file: &SourceFile) -> Result<OutputMapping, TransformError> {
        let source = file.absolute(&self.root);
        let dest = self.dest_path(file);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TransformError::Io { path: parent.to_path_buf(), source })?;
        }

        self.compiler
            .compile(&source, &dest)
            .await
            .map_err(|e| TransformError::Compile { path: file.path().to_path_buf(), source: e })?;

        let output = if self.content_hash { self.fingerprint(&dest).await? } else { dest };
        tracing::debug!(stage = %self.kind, source = %file, output = %output.display(), "compiled");
        Ok(OutputMapping::new(file.path(), output))
    }

    async fn fingerprint(&self, dest: &Path) -> Result<PathBuf, TransformError> {
        let io_err = |source| TransformError::Io { path: dest.to_path_buf(), source };
        let contents = tokio::fs::read(dest).await.map_err(io_err)?;
        let hashed = fingerprint_path(dest, &contents);
        tokio::fs::rename(dest, &hashed).await.map_err(io_err)?;
        Ok(hashed)
    }

    /// Compile all files concurrently and return the complete batch.
    ///
    /// Every task is awaited even after a failure, so nothing is still writing
    /// once this returns. The first failure in source order is reported.
    pub async fn run(self: &Arc<Self>, files: Vec<SourceFile>) -> Result<StageBatch, TransformError> {
        let mut tasks = JoinSet::new();
        for (index, file) in files.into_iter().enumerate() {
            let stage = Arc::clone(self);
            tasks.spawn(async move { (index, stage.transform(&file).await) });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined?);
        }
        results.sort_by_key(|(index, _)| *index);

        let mappings = results.into_iter().map(|(_, r)| r).collect::<Result<Vec<_>, _>>()?;
        tracing::info!(stage = %self.kind, count = mappings.len(), "stage complete");
        Ok(StageBatch::new(self.kind, mappings))
    }
}

impl std::fmt::Debug for TransformStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformStage")
            .field("kind", &self.kind)
            .field("root", &self.root)
            .field("out_root", &self.out_root)
            .field("compiler", &self.compiler.name())
            .field("content_hash", &self.content_hash)
            .finish()
    }
}
