//! Build pipeline orchestration.
//!
//! The [`Orchestrator`] drives one generation through its phases:
//!
//! ```text
//! Idle → CopyingAssets → Transforming → Aggregating → RewritingTemplates → Idle
//! ```
//!
//! Each phase is a barrier: copy passes all finish before any compiler runs,
//! both transform stages deliver their complete batches before the manifest is
//! folded, and templates are only rewritten with the finished manifest of the
//! same generation. `CopyingAssets` is skipped in dirty mode and runs at most
//! once per process.

use crate::build::context::BuildContext;
use crate::build::copy::{copy_all, ByteTransform, CopyError, CopyPass};
use crate::build::discovery::{ResolveError, Resolver};
use crate::build::manifest::{aggregate, Generation, Manifest, ManifestError, StageBatch};
use crate::build::minify::{HtmlMinifier, MarkupMinifier, MinifyOptions};
use crate::build::progress::{NullProgress, ProgressEvent, ProgressReporter};
use crate::build::result::{GenerationReport, PhaseResult};
use crate::build::svg::SvgOptimizer;
use crate::build::template::{RewriteError, TemplateRewriter};
use crate::build::transform::{CommandCompiler, Compiler, StageKind, TransformError, TransformStage};
use crate::config::{ConfigError, CopyConfig, ThemeConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No generation running
    Idle,
    /// Copying vendor and local assets
    CopyingAssets,
    /// Compiling stylesheets and scripts
    Transforming,
    /// Folding stage batches into the manifest
    Aggregating,
    /// Rewriting templates with the manifest
    RewritingTemplates,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::CopyingAssets => write!(f, "copying assets"),
            Phase::Transforming => write!(f, "transforming"),
            Phase::Aggregating => write!(f, "aggregating"),
            Phase::RewritingTemplates => write!(f, "rewriting templates"),
        }
    }
}

/// Error during build execution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    /// Source listing failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// A stylesheet or script failed to compile
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// An asset copy pass failed
    #[error(transparent)]
    Copy(#[from] CopyError),
    /// A template failed to rewrite
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    /// The manifest could not be written
    #[error("Failed to write manifest: {0}")]
    Manifest(#[from] ManifestError),
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// The file or directory that caused the failure, when known.
    pub fn failing_path(&self) -> Option<&Path> {
        match self {
            BuildError::Resolve(ResolveError::MissingRoot(path)) => Some(path),
            BuildError::Transform(e) => e.path(),
            BuildError::Copy(e) => e.path(),
            BuildError::Rewrite(e) => e.path(),
            _ => None,
        }
    }
}

/// External collaborators the pipeline delegates to.
#[derive(Clone)]
pub struct Collaborators {
    /// Compiles `.scss` to `.css`
    pub style_compiler: Arc<dyn Compiler>,
    /// Compiles `.ts` to `.js`
    pub script_compiler: Arc<dyn Compiler>,
    /// Byte transform for copy passes with `optimize_svg`
    pub svg: Arc<dyn ByteTransform>,
    /// Template minifier
    pub minifier: Arc<dyn HtmlMinifier>,
}

impl Collaborators {
    /// Built-in collaborators driven by the configuration.
    pub fn from_config(config: &ThemeConfig) -> Self {
        Self {
            style_compiler: Arc::new(CommandCompiler::new(config.styles.compiler.clone())),
            script_compiler: Arc::new(CommandCompiler::new(config.scripts.compiler.clone())),
            svg: Arc::new(SvgOptimizer::new()),
            minifier: Arc::new(MarkupMinifier::new(MinifyOptions::default())),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("style_compiler", &self.style_compiler.name())
            .field("script_compiler", &self.script_compiler.name())
            .finish()
    }
}

/// Sequences the build phases for one generation at a time.
pub struct Orchestrator {
    context: BuildContext,
    collaborators: Collaborators,
    progress: Arc<dyn ProgressReporter>,
    phase: Mutex<Phase>,
}

impl Orchestrator {
    /// Create an orchestrator that reports nothing.
    pub fn new(context: BuildContext, collaborators: Collaborators) -> Self {
        Self { context, collaborators, progress: Arc::new(NullProgress::new()), phase: Mutex::new(Phase::Idle) }
    }

    /// Set the progress reporter.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// The build context.
    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// The progress reporter.
    pub fn progress(&self) -> &dyn ProgressReporter {
        self.progress.as_ref()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase.lock().map(|p| *p).unwrap_or(Phase::Idle)
    }

    fn enter(&self, phase: Phase) -> Instant {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase;
        }
        if phase != Phase::Idle {
            tracing::info!(phase = %phase, "phase started");
            self.progress.report(ProgressEvent::PhaseStarted { phase });
        }
        Instant::now()
    }

    fn complete(&self, phase: Phase, started: Instant, outputs: Vec<PathBuf>, files: usize) -> PhaseResult {
        let duration = started.elapsed();
        tracing::info!(phase = %phase, files, elapsed_ms = duration.as_millis() as u64, "phase complete");
        self.progress.report(ProgressEvent::PhaseCompleted { phase, files, duration_ms: duration.as_millis() as u64 });
        PhaseResult::new(phase, outputs, duration)
    }

    fn copy_pass(&self, group: &CopyConfig, from_root: &Path, pattern: &str) -> CopyPass {
        let pass = CopyPass::new(pattern, from_root.join(&group.from), self.context.out_dir().join(&group.to))
            .with_label(format!("{}:{}", group.label(), pattern));
        if group.optimize_svg {
            pass.with_transform(Arc::clone(&self.collaborators.svg))
        } else {
            pass
        }
    }

    /// Every configured copy pass: local assets first, then vendor sets.
    ///
    /// Local `from` paths are relative to the source root, vendor `from`
    /// paths to the project root.
    pub fn copy_passes(&self) -> Vec<CopyPass> {
        let config = self.context.config();
        let src = self.context.src_dir();
        let root = self.context.project_root().to_path_buf();

        let local = config.assets.iter().map(|group| (group, &src));
        let vendor = config.vendor.iter().map(|group| (group, &root));
        local
            .chain(vendor)
            .flat_map(|(group, from_root)| {
                group.patterns.iter().map(move |pattern| self.copy_pass(group, from_root, pattern))
            })
            .collect()
    }

    /// Run every copy pass and wait for all of them.
    pub async fn copy_assets(&self) -> Result<PhaseResult, BuildError> {
        let started = self.enter(Phase::CopyingAssets);
        let written = copy_all(self.copy_passes()).await?;
        let count = written.len();
        Ok(self.complete(Phase::CopyingAssets, started, written, count))
    }

    fn stage(&self, kind: StageKind) -> Arc<TransformStage> {
        let compiler = match kind {
            StageKind::Style => Arc::clone(&self.collaborators.style_compiler),
            StageKind::Script => Arc::clone(&self.collaborators.script_compiler),
        };
        Arc::new(
            TransformStage::new(kind, self.context.src_dir(), self.context.out_dir(), compiler)
                .with_content_hash(self.context.mode().optimize),
        )
    }

    /// Resolve and compile stylesheets and scripts concurrently.
    ///
    /// Both stages always run to completion. Returns the two complete batches,
    /// or the first failure (styles before scripts).
    pub async fn transform(&self) -> Result<(StageBatch, StageBatch), BuildError> {
        let config = self.context.config();
        let src = self.context.src_dir();
        let style_files = Resolver::new(&src, &config.styles.pattern).resolve()?;
        let script_files = Resolver::new(&src, &config.scripts.pattern).resolve()?;

        let styles = self.stage(StageKind::Style);
        let scripts = self.stage(StageKind::Script);
        let (styles, scripts) = tokio::join!(styles.run(style_files), scripts.run(script_files));
        Ok((styles?, scripts?))
    }

    /// Rewrite every template pattern with a finished manifest.
    pub async fn rewrite_templates(
        &self,
        manifest: &Manifest,
        generation: Generation,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let rewriter = TemplateRewriter::new(
            self.context.src_dir(),
            self.context.out_dir(),
            Arc::clone(&self.collaborators.minifier),
        );
        let optimize = self.context.mode().optimize;

        let mut written = BTreeSet::new();
        for pattern in &self.context.config().templates.patterns {
            written.extend(rewriter.rewrite(pattern, manifest, generation, optimize).await?);
        }
        Ok(written.into_iter().collect())
    }

    async fn execute(&self, generation: Generation, copy_assets: bool) -> Result<GenerationReport, BuildError> {
        let mut report = GenerationReport::new(generation);

        if copy_assets {
            report.push_phase(self.copy_assets().await?);
        }

        let started = self.enter(Phase::Transforming);
        let (styles, scripts) = self.transform().await?;
        report.styles = styles.len();
        report.scripts = scripts.len();
        let compiled: Vec<PathBuf> =
            styles.mappings.iter().chain(&scripts.mappings).map(|m| m.output.clone()).collect();
        let count = compiled.len();
        report.push_phase(self.complete(Phase::Transforming, started, compiled, count));

        let started = self.enter(Phase::Aggregating);
        let manifest = aggregate(generation, &self.context.out_dir(), [styles, scripts]);
        report.push_phase(self.complete(Phase::Aggregating, started, Vec::new(), manifest.len()));

        let started = self.enter(Phase::RewritingTemplates);
        let templates = self.rewrite_templates(&manifest, generation).await?;
        manifest.write_to_dir(&self.context.out_dir()).await?;
        let count = templates.len();
        report.push_phase(self.complete(Phase::RewritingTemplates, started, templates, count));

        report.manifest = manifest;
        Ok(report)
    }

    /// Run one generation, copying assets first when `copy_assets` is set.
    ///
    /// The pipeline is back in [`Phase::Idle`] when this returns, whether the
    /// generation succeeded or not.
    pub async fn run_generation(
        &self,
        generation: Generation,
        copy_assets: bool,
    ) -> Result<GenerationReport, BuildError> {
        let start = Instant::now();
        tracing::info!(generation = %generation, mode = %self.context.mode(), "generation started");
        self.progress.report(ProgressEvent::GenerationStarted {
            generation: generation.get(),
            mode: self.context.mode().to_string(),
        });

        let result = self.execute(generation, copy_assets).await;
        self.enter(Phase::Idle);
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                let report = report.with_duration(start.elapsed());
                self.progress.report(ProgressEvent::GenerationCompleted {
                    generation: generation.get(),
                    success: true,
                    summary: report.summary(),
                    duration_ms,
                });
                Ok(report)
            }
            Err(e) => {
                tracing::error!(generation = %generation, error = %e, "generation failed");
                self.progress.report(ProgressEvent::Error {
                    path: e.failing_path().map(|p| p.display().to_string()),
                    message: e.to_string(),
                });
                self.progress.report(ProgressEvent::GenerationCompleted {
                    generation: generation.get(),
                    success: false,
                    summary: String::new(),
                    duration_ms,
                });
                Err(e)
            }
        }
    }

    /// One-shot build: a single generation, copying assets unless dirty.
    pub async fn run(&self) -> Result<GenerationReport, BuildError> {
        self.run_generation(Generation::first(), self.context.mode().copies_assets()).await
    }

    /// Absolute paths whose changes should start a new generation.
    ///
    /// Computed from the current state of the source tree; files created
    /// later are only picked up by the next call.
    pub fn watch_set(&self) -> Result<BTreeSet<PathBuf>, BuildError> {
        let config = self.context.config();
        let src = self.context.src_dir();

        let patterns = [&config.styles.pattern, &config.scripts.pattern]
            .into_iter()
            .chain(&config.templates.patterns)
            .chain(&config.watch.include);

        let mut set = BTreeSet::new();
        for pattern in patterns {
            set.extend(Resolver::new(&src, pattern).resolve_absolute()?);
        }
        Ok(set)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("context", &self.context)
            .field("collaborators", &self.collaborators)
            .field("phase", &self.phase())
            .finish()
    }
}
