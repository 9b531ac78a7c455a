//! Build pipeline module for themesmith
//!
//! Builds the distributable asset tree of a documentation-site theme: vendor
//! icon sets and local assets are copied, stylesheets and scripts compiled,
//! and templates rewritten against a manifest of the compiled outputs.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Resolution**: List source files with glob patterns from config
//! - **Copying**: Mirror assets into the output root, optionally through a byte transform
//! - **Transforming**: Compile styles and scripts concurrently, one task per file
//! - **Aggregating**: Fold the compiled outputs into a per-generation manifest
//! - **Rewriting**: Point template references at compiled outputs, minify, mark as generated
//!
//! # Example
//!
//! ```ignore
//! use themesmith::build::{BuildContext, BuildMode, Collaborators, Orchestrator};
//! use themesmith::config::load_config;
//!
//! let config = load_config(None)?;
//! let collaborators = Collaborators::from_config(&config);
//! let context = BuildContext::new(config, project_root).with_mode(BuildMode::new(false, false, true));
//!
//! let report = Orchestrator::new(context, collaborators).run().await?;
//! println!("{}", report.summary());
//! ```

pub mod context;
pub mod copy;
pub mod discovery;
pub mod manifest;
pub mod minify;
pub mod pipeline;
pub mod progress;
pub mod result;
pub mod svg;
pub mod template;
pub mod transform;

pub use context::*;
pub use copy::*;
pub use discovery::*;
pub use manifest::*;
pub use minify::*;
pub use pipeline::*;
pub use result::*;
pub use svg::*;
pub use template::*;
pub use transform::*;
