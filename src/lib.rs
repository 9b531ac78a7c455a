//! themesmith - Asset build pipeline for documentation-site themes
//!
//! This library provides functionality to:
//! - Copy vendor icon sets and local assets into the theme's output root
//! - Compile stylesheets and scripts through external compilers
//! - Rewrite templates against a manifest of the compiled outputs
//! - Rebuild continuously on source changes

pub mod build;
pub mod cli;
pub mod config;
pub mod watch;
