//! Build result types.
//!
//! Contains types for representing the outcome of one build generation.

use crate::build::manifest::{Generation, Manifest};
use crate::build::pipeline::Phase;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one completed phase.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    /// The phase
    pub phase: Phase,
    /// Files written by the phase
    pub outputs: Vec<PathBuf>,
    /// Phase duration
    pub duration: Duration,
}

impl PhaseResult {
    /// Create a phase result.
    pub fn new(phase: Phase, outputs: Vec<PathBuf>, duration: Duration) -> Self {
        Self { phase, outputs, duration }
    }
}

/// Result of a complete, successful generation.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Generation number
    pub generation: Generation,
    /// Phases in the order they ran
    pub phases: Vec<PhaseResult>,
    /// Number of compiled stylesheets
    pub styles: usize,
    /// Number of compiled scripts
    pub scripts: usize,
    /// The manifest the templates were rewritten with
    pub manifest: Manifest,
    /// Total generation duration
    pub total_duration: Duration,
}

impl GenerationReport {
    /// Create an empty report for a generation.
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            phases: Vec::new(),
            styles: 0,
            scripts: 0,
            manifest: Manifest::empty(generation),
            total_duration: Duration::ZERO,
        }
    }

    /// Record a completed phase.
    pub fn push_phase(&mut self, result: PhaseResult) {
        self.phases.push(result);
    }

    /// Set the total duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.total_duration = duration;
        self
    }

    /// The phases in execution order.
    pub fn phase_order(&self) -> Vec<Phase> {
        self.phases.iter().map(|p| p.phase).collect()
    }

    /// Files written by a phase, if it ran.
    pub fn outputs(&self, phase: Phase) -> Option<&[PathBuf]> {
        self.phases.iter().find(|p| p.phase == phase).map(|p| p.outputs.as_slice())
    }

    /// Number of copied asset files.
    pub fn copied_count(&self) -> usize {
        self.outputs(Phase::CopyingAssets).map_or(0, <[PathBuf]>::len)
    }

    /// Number of rewritten templates.
    pub fn template_count(&self) -> usize {
        self.outputs(Phase::RewritingTemplates).map_or(0, <[PathBuf]>::len)
    }

    /// Format a one-line summary of the generation.
    pub fn summary(&self) -> String {
        let plural = |n: usize, word: &str| format!("{} {}{}", n, word, if n == 1 { "" } else { "s" });
        let mut parts = Vec::new();
        if self.outputs(Phase::CopyingAssets).is_some() {
            parts.push(format!("{} copied", plural(self.copied_count(), "asset")));
        }
        parts.push(plural(self.styles, "style"));
        parts.push(plural(self.scripts, "script"));
        parts.push(plural(self.template_count(), "template"));
        parts.join(", ")
    }
}
