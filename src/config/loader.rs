//! Configuration loading and discovery for `themesmith.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{ProjectConfig, ThemeConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file searched for in the project tree.
pub const CONFIG_FILENAME: &str = "themesmith.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse themesmith.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override output directory
    pub out: Option<PathBuf>,
    /// Override source directory
    pub src: Option<PathBuf>,
}

/// Find themesmith.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find themesmith.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILENAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a themesmith.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses `find_config()`
/// to locate the config file. If no config file is found, returns a default
/// configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(None)?;
/// let config = load_config(Some(Path::new("theme/themesmith.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<ThemeConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
fn load_config_file(path: &Path) -> Result<ThemeConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: ThemeConfig = toml::from_str(&contents)?;
    check(&config)?;
    tracing::debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Validate a configuration, folding field errors into a single `ConfigError`.
pub fn check(config: &ThemeConfig) -> Result<(), ConfigError> {
    let errors = config.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()))
    }
}

/// Create a default configuration when no themesmith.toml is found.
///
/// The project name is taken from the current directory name.
pub fn default_config() -> ThemeConfig {
    let name = env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "theme".to_string());

    ThemeConfig { project: ProjectConfig { name, ..ProjectConfig::default() }, ..ThemeConfig::default() }
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut ThemeConfig, overrides: &CliOverrides) {
    if let Some(ref out) = overrides.out {
        config.project.out = out.clone();
    }
    if let Some(ref src) = overrides.src {
        config.project.src = src.clone();
    }
}

/// Get the project root directory from a config file path.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent()
}
