//! Configuration schema types for `themesmith.toml`
//!
//! Defines the structure and validation rules for a theme build. Every
//! section has defaults matching the layout of a Material-style MkDocs theme,
//! so an empty file (or no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    #[serde(default = "default_name")]
    pub name: String,
    /// Source root containing styles, scripts and templates
    #[serde(default = "default_src")]
    pub src: PathBuf,
    /// Output root of the distributable theme
    #[serde(default = "default_out")]
    pub out: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name(), src: default_src(), out: default_out() }
    }
}

fn default_name() -> String {
    "theme".to_string()
}

fn default_src() -> PathBuf {
    PathBuf::from("src")
}

fn default_out() -> PathBuf {
    PathBuf::from("material")
}

/// Stylesheet stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylesConfig {
    /// Glob pattern selecting stylesheet entry points (partials excluded)
    #[serde(default = "default_style_pattern")]
    pub pattern: String,
    /// Compiler command; `{src}` and `{dest}` are substituted per file
    #[serde(default = "default_style_compiler")]
    pub compiler: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self { pattern: default_style_pattern(), compiler: default_style_compiler() }
    }
}

fn default_style_pattern() -> String {
    "**/[!_]*.scss".to_string()
}

fn default_style_compiler() -> Vec<String> {
    ["sass", "--no-source-map", "--style=compressed", "--load-path=node_modules", "{src}", "{dest}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Script stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Glob pattern selecting script entry points
    #[serde(default = "default_script_pattern")]
    pub pattern: String,
    /// Compiler command; `{src}` and `{dest}` are substituted per file
    #[serde(default = "default_script_compiler")]
    pub compiler: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self { pattern: default_script_pattern(), compiler: default_script_compiler() }
    }
}

fn default_script_pattern() -> String {
    "**/{bundle,search}.ts".to_string()
}

fn default_script_compiler() -> Vec<String> {
    ["esbuild", "{src}", "--bundle", "--minify", "--format=iife", "--outfile={dest}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Template rewrite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Glob patterns selecting templates under the source root
    #[serde(default = "default_template_patterns")]
    pub patterns: Vec<String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self { patterns: default_template_patterns() }
    }
}

fn default_template_patterns() -> Vec<String> {
    vec!["**/*.html".to_string(), "**/*.xml".to_string()]
}

/// One group of copy passes.
///
/// Each pattern becomes an independent pass. For `[[assets]]` entries `from`
/// is relative to the source root; for `[[vendor]]` entries it is relative to
/// the project root. `to` is always relative to the output root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Label used in progress output
    #[serde(default)]
    pub name: Option<String>,
    /// Directory the patterns are resolved against
    #[serde(default)]
    pub from: PathBuf,
    /// Destination directory
    #[serde(default)]
    pub to: PathBuf,
    /// Glob patterns, one copy pass each
    pub patterns: Vec<String>,
    /// Run copied bytes through the SVG optimizer
    #[serde(default)]
    pub optimize_svg: bool,
}

impl CopyConfig {
    fn vendor(name: &str, from: &str, to: &str, patterns: &[&str]) -> Self {
        Self {
            name: Some(name.to_string()),
            from: PathBuf::from(from),
            to: PathBuf::from(to),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            optimize_svg: true,
        }
    }

    /// Label for progress output.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.from.display().to_string())
    }
}

/// Images, icons and configuration files shipped from the source root.
pub fn default_assets() -> Vec<CopyConfig> {
    vec![CopyConfig {
        name: Some("theme".to_string()),
        from: PathBuf::new(),
        to: PathBuf::new(),
        patterns: vec![
            ".icons/*.svg".to_string(),
            "assets/images/*".to_string(),
            "**/*.{py,yml}".to_string(),
        ],
        optimize_svg: false,
    }]
}

/// Vendor icon sets and their licence files.
///
/// Licence file names differ per package, and some live above the icon
/// directory; leading `../` segments are dropped when mirroring.
pub fn default_vendor() -> Vec<CopyConfig> {
    vec![
        CopyConfig::vendor(
            "material",
            "node_modules/@mdi/svg/svg",
            ".icons/material",
            &["*.svg", "../LICENSE"],
        ),
        CopyConfig::vendor(
            "octicons",
            "node_modules/@primer/octicons/build/svg",
            ".icons/octicons",
            &["*.svg", "../../LICENSE"],
        ),
        CopyConfig::vendor(
            "fontawesome",
            "node_modules/@fortawesome/fontawesome-free/svgs",
            ".icons/fontawesome",
            &["**/*.svg", "../LICENSE.txt"],
        ),
        CopyConfig::vendor(
            "simple",
            "node_modules/simple-icons/icons",
            ".icons/simple",
            &["*.svg", "../LICENSE.md"],
        ),
    ]
}

/// Watch mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u32,
    /// Clear terminal between rebuilds
    #[serde(default)]
    pub clear_screen: bool,
    /// Extra patterns under the source root whose changes trigger a rebuild
    /// (stylesheet partials, script modules)
    #[serde(default = "default_watch_include")]
    pub include: Vec<String>,
}

fn default_debounce_ms() -> u32 {
    100
}

fn default_watch_include() -> Vec<String> {
    vec!["**/*.scss".to_string(), "**/*.ts".to_string()]
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: default_debounce_ms(), clear_screen: false, include: default_watch_include() }
    }
}

/// Complete themesmith.toml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Project metadata
    #[serde(default)]
    pub project: ProjectConfig,
    /// Stylesheet stage
    #[serde(default)]
    pub styles: StylesConfig,
    /// Script stage
    #[serde(default)]
    pub scripts: ScriptsConfig,
    /// Template rewriting
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Copy passes from the source root
    #[serde(default = "default_assets")]
    pub assets: Vec<CopyConfig>,
    /// Copy passes for vendor icon sets
    #[serde(default = "default_vendor")]
    pub vendor: Vec<CopyConfig>,
    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            styles: StylesConfig::default(),
            scripts: ScriptsConfig::default(),
            templates: TemplatesConfig::default(),
            assets: default_assets(),
            vendor: default_vendor(),
            watch: WatchConfig::default(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "vendor[2].to")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "themesmith.toml: '{}' {}", self.field, self.message)
    }
}

impl ThemeConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        if self.project.name.is_empty() {
            push("project.name".to_string(), "must be a non-empty string");
        }
        if overlaps(&self.project.src, &self.project.out) {
            push("project.out".to_string(), "must not overlap project.src");
        }

        if self.styles.pattern.is_empty() {
            push("styles.pattern".to_string(), "must be a non-empty glob pattern");
        }
        if self.styles.compiler.is_empty() {
            push("styles.compiler".to_string(), "must name a program to run");
        }
        if self.scripts.pattern.is_empty() {
            push("scripts.pattern".to_string(), "must be a non-empty glob pattern");
        }
        if self.scripts.compiler.is_empty() {
            push("scripts.compiler".to_string(), "must name a program to run");
        }
        if self.templates.patterns.is_empty() {
            push("templates.patterns".to_string(), "must contain at least one glob pattern");
        }

        for (section, passes) in [("assets", &self.assets), ("vendor", &self.vendor)] {
            for (i, pass) in passes.iter().enumerate() {
                if pass.patterns.is_empty() {
                    push(format!("{}[{}].patterns", section, i), "must contain at least one glob pattern");
                }
                if !is_contained(&pass.to) {
                    push(format!("{}[{}].to", section, i), "must be a relative path inside the output root");
                }
            }
        }

        if self.watch.debounce_ms == 0 {
            push("watch.debounce_ms".to_string(), "must be a positive integer");
        }

        errors
    }

    /// Check if the configuration is valid
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

/// A destination must stay inside the output root.
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Whether one root lies inside the other, compared component-wise.
fn overlaps(a: &Path, b: &Path) -> bool {
    let a: PathBuf = a.components().filter(|c| !matches!(c, Component::CurDir)).collect();
    let b: PathBuf = b.components().filter(|c| !matches!(c, Component::CurDir)).collect();
    a.starts_with(&b) || b.starts_with(&a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ThemeConfig = toml::from_str("").unwrap();
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.project.out, PathBuf::from("material"));
        assert_eq!(config.styles.pattern, "**/[!_]*.scss");
        assert_eq!(config.scripts.pattern, "**/{bundle,search}.ts");
        assert_eq!(config.templates.patterns, vec!["**/*.html", "**/*.xml"]);
        assert_eq!(config.vendor.len(), 4);
        assert!(config.is_valid());
    }

    #[test]
    fn test_vendor_licence_names() {
        let vendor = default_vendor();
        let licences: Vec<_> =
            vendor.iter().filter_map(|v| v.patterns.iter().find(|p| p.contains("LICENSE"))).collect();
        assert!(licences.iter().any(|p| p.ends_with("/LICENSE")));
        assert!(licences.iter().any(|p| p.ends_with("LICENSE.txt")));
        assert!(licences.iter().any(|p| p.ends_with("LICENSE.md")));
        assert!(vendor.iter().all(|v| v.optimize_svg));
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config: ThemeConfig = toml::from_str(
            r#"
            [styles]
            pattern = "assets/**/[!_]*.scss"

            [project]
            out = "dist"
            "#,
        )
        .unwrap();
        assert_eq!(config.styles.pattern, "assets/**/[!_]*.scss");
        assert_eq!(config.styles.compiler[0], "sass");
        assert_eq!(config.project.src, PathBuf::from("src"));
        assert_eq!(config.project.out, PathBuf::from("dist"));
    }

    #[test]
    fn test_explicit_vendor_replaces_defaults() {
        let config: ThemeConfig = toml::from_str(
            r#"
            [[vendor]]
            from = "icons"
            to = ".icons/custom"
            patterns = ["*.svg"]
            "#,
        )
        .unwrap();
        assert_eq!(config.vendor.len(), 1);
        assert!(!config.vendor[0].optimize_svg);
        assert_eq!(config.vendor[0].label(), "icons");
    }

    #[test]
    fn test_validate_rejects_escaping_destination() {
        let mut config = ThemeConfig::default();
        config.vendor[0].to = PathBuf::from("../elsewhere");
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "vendor[0].to");
    }

    #[test]
    fn test_validate_rejects_nested_roots() {
        let mut config = ThemeConfig::default();
        config.project.src = PathBuf::from("theme");
        config.project.out = PathBuf::from("theme/dist");
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "project.out");

        config.project.src = PathBuf::from("./build/src");
        config.project.out = PathBuf::from("build");
        assert!(!config.is_valid());

        config.project.src = PathBuf::from("src");
        config.project.out = PathBuf::from("./src");
        assert!(!config.is_valid());
    }

    #[test]
    fn test_validate_accepts_sibling_roots() {
        let mut config = ThemeConfig::default();
        config.project.src = PathBuf::from("theme");
        config.project.out = PathBuf::from("themes/dist");
        assert!(config.is_valid());
    }

    #[test]
    fn test_validate_rejects_empty_compiler() {
        let mut config = ThemeConfig::default();
        config.scripts.compiler.clear();
        config.watch.debounce_ms = 0;
        let fields: Vec<_> = config.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"scripts.compiler".to_string()));
        assert!(fields.contains(&"watch.debounce_ms".to_string()));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigValidationError {
            field: "styles.pattern".to_string(),
            message: "must be a non-empty glob pattern".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "themesmith.toml: 'styles.pattern' must be a non-empty glob pattern"
        );
    }
}
