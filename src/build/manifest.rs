//! Path-rewrite manifest built once per generation.
//!
//! Every transform stage reports one [`OutputMapping`] per compiled file. At
//! the end of the transform phase the [`ManifestAggregator`] folds the complete
//! batches of all stages into a fresh [`Manifest`], which the template
//! rewriter then uses to point quoted asset references at their outputs.
//!
//! A manifest is never carried over between generations: output paths can
//! change from one generation to the next (content hashes), so each one is
//! derived from scratch and tagged with the generation that produced it.
//!
//! # Manifest Format
//!
//! After each successful generation the manifest is written to
//! `.themesmith-manifest.json` in the output root:
//!
//! ```json
//! {
//!   "generation": 3,
//!   "entries": {
//!     "assets/javascripts/bundle.ts": "assets/javascripts/bundle.1c2f9a4e.min.js",
//!     "assets/stylesheets/main.scss": "assets/stylesheets/main.77d3c5ab.min.css"
//!   }
//! }
//! ```

use crate::build::discovery::to_slash;
use crate::build::transform::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Default manifest filename.
pub const MANIFEST_FILENAME: &str = ".themesmith-manifest.json";

/// Error during manifest persistence.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Build generation counter.
///
/// One generation is one pass through transform, aggregate and rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The first generation of a process.
    pub fn first() -> Self {
        Self(1)
    }

    /// The generation following this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One compiled file as reported by a transform stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMapping {
    /// Source path relative to the source root, original extension
    pub source: PathBuf,
    /// Path of the written output (usually absolute, under the output root)
    pub output: PathBuf,
}

impl OutputMapping {
    /// Create a mapping.
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self { source: source.into(), output: output.into() }
    }

    /// Manifest key: the source path with `/` separators.
    pub fn key(&self) -> String {
        to_slash(&self.source)
    }

    /// Manifest value: the output path relative to `out_root`, `/` separators.
    pub fn value(&self, out_root: &Path) -> String {
        to_slash(self.output.strip_prefix(out_root).unwrap_or(&self.output))
    }
}

/// Every output of one stage for one generation.
///
/// A batch is only produced once the stage has finished all of its files,
/// which is what lets the aggregator fold whole batches only.
#[derive(Debug, Clone)]
pub struct StageBatch {
    /// Stage that produced the batch
    pub kind: StageKind,
    /// Outputs in source order
    pub mappings: Vec<OutputMapping>,
}

impl StageBatch {
    /// Create a batch.
    pub fn new(kind: StageKind, mappings: Vec<OutputMapping>) -> Self {
        Self { kind, mappings }
    }

    /// Number of compiled files.
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether the stage compiled nothing.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Mapping from source path to output path, valid for one generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Generation that produced the entries
    generation: Generation,
    /// Key to value, ordered by key
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// An empty manifest for a generation.
    pub fn empty(generation: Generation) -> Self {
        Self { generation, entries: BTreeMap::new() }
    }

    /// Generation that produced this manifest.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Look up the output path for a source path.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a manifest from a file.
    ///
    /// Returns `Ok(None)` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ManifestError> {
        if !path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Write the manifest as pretty JSON to [`MANIFEST_FILENAME`] in the
    /// output root, creating the root if needed.
    pub async fn write_to_dir(&self, out_dir: &Path) -> Result<PathBuf, ManifestError> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::create_dir_all(out_dir).await?;
        let path = out_dir.join(MANIFEST_FILENAME);
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

/// Folds complete stage batches into a new manifest.
///
/// An aggregator is created per generation and consumed by [`finish`], so no
/// mapping can leak from one generation into the next.
///
/// [`finish`]: ManifestAggregator::finish
#[derive(Debug)]
pub struct ManifestAggregator {
    generation: Generation,
    out_root: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ManifestAggregator {
    /// Start an empty fold for a generation.
    pub fn new(generation: Generation, out_root: impl Into<PathBuf>) -> Self {
        Self { generation, out_root: out_root.into(), entries: BTreeMap::new() }
    }

    /// Fold one complete batch. Later keys overwrite earlier ones.
    pub fn fold(mut self, batch: StageBatch) -> Self {
        tracing::debug!(generation = %self.generation, stage = %batch.kind, count = batch.len(), "folding batch");
        for mapping in batch.mappings {
            let value = mapping.value(&self.out_root);
            self.entries.insert(mapping.key(), value);
        }
        self
    }

    /// Finish the fold.
    pub fn finish(self) -> Manifest {
        Manifest { generation: self.generation, entries: self.entries }
    }
}

/// Build the manifest for a generation from its stage batches.
pub fn aggregate(
    generation: Generation,
    out_root: &Path,
    batches: impl IntoIterator<Item = StageBatch>,
) -> Manifest {
    batches
        .into_iter()
        .fold(ManifestAggregator::new(generation, out_root), ManifestAggregator::fold)
        .finish()
}
