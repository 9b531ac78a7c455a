//! Template rewriting.
//!
//! Every template under the source root is copied to the output root after
//! five steps: manifest literal substitution (optimize mode only), line ending
//! normalization, the generated-file banner, minification and blank line
//! removal.

use crate::build::discovery::{ResolveError, Resolver};
use crate::build::manifest::{Generation, Manifest};
use crate::build::minify::{HtmlMinifier, MinifyError};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// Marker placed at the top of every rewritten template.
pub const GENERATED_BANNER: &str = "{#-\n  This file was automatically generated - do not edit\n-#}\n";

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[\r\n]").expect("valid regex"));

/// Error during template rewriting.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RewriteError {
    /// The manifest was built for a different generation
    #[error("Manifest for generation {found} handed to generation {expected}")]
    StaleManifest { expected: Generation, found: Generation },
    /// Template listing failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// Reading or writing a template failed
    #[error("IO error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The minifier rejected a template
    #[error("Failed to minify {}: {source}", path.display())]
    Minify {
        path: PathBuf,
        #[source]
        source: MinifyError,
    },
    /// The manifest keys could not be compiled into a pattern
    #[error("Invalid manifest pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl RewriteError {
    /// The template that failed, when known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            RewriteError::Io { path, .. } | RewriteError::Minify { path, .. } => Some(path),
            RewriteError::Resolve(ResolveError::MissingRoot(path)) => Some(path),
            _ => None,
        }
    }
}

/// Replaces quoted manifest keys with their equally quoted values.
///
/// Only complete literals match: `"main.scss"` is rewritten, `"x/main.scss"`
/// and `"main.scss.map"` are not.
#[derive(Debug)]
pub struct LiteralRewriter<'m> {
    manifest: &'m Manifest,
    pattern: Option<Regex>,
}

impl<'m> LiteralRewriter<'m> {
    /// Compile the manifest keys into a single pattern.
    pub fn new(manifest: &'m Manifest) -> Result<Self, regex::Error> {
        if manifest.is_empty() {
            return Ok(Self { manifest, pattern: None });
        }
        let keys = manifest.iter().map(|(key, _)| regex::escape(key)).collect::<Vec<_>>().join("|");
        let pattern = Regex::new(&format!(r#"'({keys})'|"({keys})""#))?;
        Ok(Self { manifest, pattern: Some(pattern) })
    }

    /// Rewrite every matching literal in `text`.
    pub fn rewrite<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let Some(pattern) = &self.pattern else {
            return Cow::Borrowed(text);
        };
        pattern.replace_all(text, |caps: &Captures| {
            let (quote, key) = match (caps.get(1), caps.get(2)) {
                (Some(key), _) => ('\'', key.as_str()),
                (None, Some(key)) => ('"', key.as_str()),
                (None, None) => return caps[0].to_string(),
            };
            match self.manifest.get(key) {
                Some(value) => format!("{quote}{value}{quote}"),
                None => caps[0].to_string(),
            }
        })
    }
}

/// Rewrites templates from one root into another.
pub struct TemplateRewriter {
    from: PathBuf,
    to: PathBuf,
    minifier: Arc<dyn HtmlMinifier>,
}

impl TemplateRewriter {
    /// Create a rewriter from the source root into the output root.
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>, minifier: Arc<dyn HtmlMinifier>) -> Self {
        Self { from: from.into(), to: to.into(), minifier }
    }

    /// Apply the rewrite steps to one template's text.
    pub fn render(&self, source: &str, literals: Option<&LiteralRewriter<'_>>) -> Result<String, MinifyError> {
        let text = match literals {
            Some(literals) => literals.rewrite(source),
            None => Cow::Borrowed(source),
        };
        let text = text.replace("\r\n", "\n");
        let minified = self.minifier.minify(&format!("{GENERATED_BANNER}{text}"))?;
        Ok(BLANK_LINES.replace_all(&minified, "").into_owned())
    }

    /// Rewrite every template matching `pattern`.
    ///
    /// The manifest must belong to `generation`. Returns the written paths.
    pub async fn rewrite(
        &self,
        pattern: &str,
        manifest: &Manifest,
        generation: Generation,
        optimize: bool,
    ) -> Result<Vec<PathBuf>, RewriteError> {
        if manifest.generation() != generation {
            return Err(RewriteError::StaleManifest { expected: generation, found: manifest.generation() });
        }

        let literals = if optimize { Some(LiteralRewriter::new(manifest)?) } else { None };
        let templates = Resolver::new(&self.from, pattern).resolve()?;
        let mut written = Vec::with_capacity(templates.len());

        for template in templates {
            let source = template.absolute(&self.from);
            let dest = template.absolute(&self.to);

            let text = tokio::fs::read_to_string(&source)
                .await
                .map_err(|e| RewriteError::Io { path: source.clone(), source: e })?;
            let rendered = self
                .render(&text, literals.as_ref())
                .map_err(|e| RewriteError::Minify { path: source.clone(), source: e })?;

            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RewriteError::Io { path: parent.to_path_buf(), source: e })?;
            }
            tokio::fs::write(&dest, rendered).await.map_err(|e| RewriteError::Io { path: dest.clone(), source: e })?;
            tracing::debug!(template = %template, "rewrote template");
            written.push(dest);
        }

        Ok(written)
    }
}

impl std::fmt::Debug for TemplateRewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRewriter").field("from", &self.from).field("to", &self.to).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::manifest::{aggregate, OutputMapping, StageBatch};
    use crate::build::minify::MarkupMinifier;
    use crate::build::transform::StageKind;
    use std::fs;
    use tempfile::TempDir;

    /// Returns its input unchanged.
    struct Identity;

    impl HtmlMinifier for Identity {
        fn minify(&self, html: &str) -> Result<String, MinifyError> {
            Ok(html.to_string())
        }
    }

    fn manifest(generation: Generation, pairs: &[(&str, &str)]) -> Manifest {
        let out = Path::new("/out");
        let batch = StageBatch::new(
            StageKind::Style,
            pairs.iter().map(|(s, o)| OutputMapping::new(*s, out.join(o))).collect(),
        );
        aggregate(generation, out, [batch])
    }

    fn rewriter(from: &Path, to: &Path) -> TemplateRewriter {
        TemplateRewriter::new(from, to, Arc::new(Identity))
    }

    #[test]
    fn test_literal_rewrite_preserves_quotes() {
        let manifest = manifest(
            Generation::first(),
            &[("assets/stylesheets/main.scss", "assets/stylesheets/main.1a2b3c4d.min.css")],
        );
        let literals = LiteralRewriter::new(&manifest).unwrap();

        let text = r#"<link href="{{ 'assets/stylesheets/main.scss' | url }}"> "assets/stylesheets/main.scss""#;
        assert_eq!(
            literals.rewrite(text),
            r#"<link href="{{ 'assets/stylesheets/main.1a2b3c4d.min.css' | url }}"> "assets/stylesheets/main.1a2b3c4d.min.css""#
        );
    }

    #[test]
    fn test_literal_rewrite_whole_literals_only() {
        let manifest = manifest(Generation::first(), &[("main.scss", "main.css")]);
        let literals = LiteralRewriter::new(&manifest).unwrap();

        let text = r#""x/main.scss" 'main.scss.map' main.scss "main.scss'"#;
        assert_eq!(literals.rewrite(text), text);
    }

    #[test]
    fn test_literal_rewrite_escapes_keys() {
        let manifest = manifest(Generation::first(), &[("a+b.scss", "a+b.css")]);
        let literals = LiteralRewriter::new(&manifest).unwrap();
        assert_eq!(literals.rewrite("'a+b.scss' 'aab.scss'"), "'a+b.css' 'aab.scss'");
    }

    #[test]
    fn test_literal_rewrite_empty_manifest() {
        let manifest = Manifest::empty(Generation::first());
        let literals = LiteralRewriter::new(&manifest).unwrap();
        assert!(matches!(literals.rewrite("'a.scss'"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_render_steps() {
        let rewriter = rewriter(Path::new("src"), Path::new("out"));
        let rendered = rewriter.render("<div>\r\n\r\n   \r\n  <p>x</p>\r\n</div>\r\n", None).unwrap();
        assert_eq!(rendered, format!("{}<div>\n  <p>x</p>\n</div>\n", GENERATED_BANNER));
    }

    #[test]
    fn test_render_with_markup_minifier() {
        let rewriter = TemplateRewriter::new("src", "out", Arc::new(MarkupMinifier::default()));
        let rendered = rewriter.render("<!-- note -->\n<input disabled=\"disabled\">\n", None).unwrap();
        assert!(rendered.starts_with(GENERATED_BANNER));
        assert!(rendered.ends_with("<input disabled>\n"));
    }

    #[tokio::test]
    async fn test_rewrite_writes_templates() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(src.join("partials")).unwrap();
        fs::write(src.join("base.html"), "<link href=\"{{ 'main.scss' | url }}\">").unwrap();
        fs::write(src.join("partials/footer.html"), "<footer></footer>").unwrap();
        fs::write(src.join("notes.md"), "not a template").unwrap();

        let manifest = manifest(Generation::first(), &[("main.scss", "main.css")]);
        let written = rewriter(&src, &out).rewrite("**/*.html", &manifest, Generation::first(), true).await.unwrap();

        assert_eq!(written.len(), 2);
        let base = fs::read_to_string(out.join("base.html")).unwrap();
        assert!(base.starts_with(GENERATED_BANNER));
        assert!(base.contains("'main.css'"));
        assert!(out.join("partials/footer.html").exists());
        assert!(!out.join("notes.md").exists());
    }

    #[tokio::test]
    async fn test_rewrite_without_optimize_keeps_literals() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("base.html"), "'main.scss'").unwrap();

        let manifest = manifest(Generation::first(), &[("main.scss", "main.css")]);
        rewriter(&src, &temp.path().join("out"))
            .rewrite("*.html", &manifest, Generation::first(), false)
            .await
            .unwrap();
        let base = fs::read_to_string(temp.path().join("out/base.html")).unwrap();
        assert!(base.ends_with("'main.scss'"));
    }

    #[tokio::test]
    async fn test_rewrite_rejects_stale_manifest() {
        let temp = TempDir::new().unwrap();
        let stale = manifest(Generation::first(), &[]);
        let err = rewriter(temp.path(), temp.path())
            .rewrite("*.html", &stale, Generation::first().next(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::StaleManifest { .. }));
    }

    #[tokio::test]
    async fn test_rewrite_minify_error_names_template() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("broken.html"), "<div><!-- never closed").unwrap();

        let rewriter = TemplateRewriter::new(&src, temp.path().join("out"), Arc::new(MarkupMinifier::default()));
        let err = rewriter
            .rewrite("*.html", &Manifest::empty(Generation::first()), Generation::first(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RewriteError::Minify { .. }));
        assert!(err.path().unwrap().ends_with("broken.html"));
        assert!(!temp.path().join("out/broken.html").exists());
    }
}
