//! Source file resolution for the build system.
//!
//! A [`Resolver`] lists the files under a source root that match a glob
//! pattern. Listings are recomputed on every call, so the same resolver is
//! reused for each generation of a watch session and always reflects the
//! current state of the tree.

use glob::{glob, Pattern};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Error during source resolution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The root directory does not exist
    #[error("Source root not found: {}", .0.display())]
    MissingRoot(PathBuf),
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// A file path relative to a source root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceFile(PathBuf);

impl SourceFile {
    /// Wrap a root-relative path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The root-relative path.
    pub fn path(&self) -> &Path {
        &self.0
    }

    /// The root-relative path with `/` separators.
    pub fn to_slash(&self) -> String {
        to_slash(&self.0)
    }

    /// Join the relative path onto a root.
    pub fn absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl std::fmt::Display for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_slash())
    }
}

/// Render a relative path with forward slashes regardless of host convention.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Expand `{a,b}` alternation into one pattern per alternative.
///
/// The `glob` crate has no alternation support. Groups are expanded left to
/// right; nested groups are not supported.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };
    let Some(close) = pattern[open..].find('}').map(|i| open + i) else {
        return vec![pattern.to_string()];
    };

    let head = &pattern[..open];
    let tail = &pattern[close + 1..];
    pattern[open + 1..close]
        .split(',')
        .flat_map(|alt| expand_braces(&format!("{}{}{}", head, alt, tail)))
        .collect()
}

/// Discover files matching a glob pattern under a base directory.
///
/// Returns absolute paths, sorted and de-duplicated across brace expansions.
/// Directories are skipped.
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, ResolveError> {
    let base = Pattern::escape(&base_dir.to_string_lossy());
    let mut files = BTreeSet::new();

    for alternative in expand_braces(pattern) {
        let full_pattern = format!("{}/{}", base.trim_end_matches('/'), alternative);
        let paths = glob(&full_pattern).map_err(|source| ResolveError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => {
                    files.insert(path);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(pattern, error = %e, "unreadable path during discovery"),
            }
        }
    }

    Ok(files.into_iter().collect())
}

/// Lists files under a root matching a glob pattern.
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    pattern: String,
}

impl Resolver {
    /// Create a resolver for `pattern` rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self { root: root.into(), pattern: pattern.into() }
    }

    /// The root the pattern is resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The glob pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Resolve the current listing as root-relative paths.
    ///
    /// A missing root is an error rather than an empty listing.
    pub fn resolve(&self) -> Result<Vec<SourceFile>, ResolveError> {
        if !self.root.is_dir() {
            return Err(ResolveError::MissingRoot(self.root.clone()));
        }

        let files = discover_files(&self.root, &self.pattern)?
            .into_iter()
            .filter_map(|path| path.strip_prefix(&self.root).ok().map(SourceFile::new))
            .collect::<Vec<_>>();

        tracing::debug!(root = %self.root.display(), pattern = %self.pattern, count = files.len(), "resolved");
        Ok(files)
    }

    /// Resolve the current listing as absolute paths.
    pub fn resolve_absolute(&self) -> Result<Vec<PathBuf>, ResolveError> {
        Ok(self.resolve()?.iter().map(|f| f.absolute(&self.root)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap().write_all(b"/* */").unwrap();
        path
    }

    fn names(files: &[SourceFile]) -> Vec<String> {
        files.iter().map(|f| f.to_slash()).collect()
    }

    #[test]
    fn test_discover_files_simple() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "main.scss");
        create_test_file(temp.path(), "other.txt");

        let files = discover_files(temp.path(), "*.scss").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("main.scss"));
    }

    #[test]
    fn test_discover_files_skips_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("dir.scss")).unwrap();
        create_test_file(temp.path(), "a.scss");

        let files = discover_files(temp.path(), "*.scss").unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_resolve_excludes_partials() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "assets/stylesheets/main.scss");
        create_test_file(temp.path(), "assets/stylesheets/palette.scss");
        create_test_file(temp.path(), "assets/stylesheets/_typeset.scss");
        create_test_file(temp.path(), "assets/stylesheets/main/_colors.scss");

        let files = Resolver::new(temp.path(), "**/[!_]*.scss").resolve().unwrap();
        assert_eq!(
            names(&files),
            vec!["assets/stylesheets/main.scss", "assets/stylesheets/palette.scss"]
        );
    }

    #[test]
    fn test_resolve_brace_alternation() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "assets/javascripts/bundle.ts");
        create_test_file(temp.path(), "assets/javascripts/workers/search.ts");
        create_test_file(temp.path(), "assets/javascripts/utils.ts");

        let files = Resolver::new(temp.path(), "**/{bundle,search}.ts").resolve().unwrap();
        assert_eq!(
            names(&files),
            vec!["assets/javascripts/bundle.ts", "assets/javascripts/workers/search.ts"]
        );
    }

    #[test]
    fn test_resolve_parent_pattern() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "pkg/LICENSE");
        create_test_file(temp.path(), "pkg/svg/account.svg");

        let files = Resolver::new(temp.path().join("pkg/svg"), "../LICENSE").resolve().unwrap();
        assert_eq!(names(&files), vec!["../LICENSE"]);
    }

    #[test]
    fn test_resolve_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = Resolver::new(temp.path().join("nope"), "**/*.html").resolve();
        assert!(matches!(result, Err(ResolveError::MissingRoot(_))));
    }

    #[test]
    fn test_resolve_invalid_pattern() {
        let temp = TempDir::new().unwrap();
        let result = Resolver::new(temp.path(), "**/[.scss").resolve();
        assert!(matches!(result, Err(ResolveError::InvalidPattern { .. })));
    }

    #[test]
    fn test_resolve_is_restartable() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "a.html");
        let resolver = Resolver::new(temp.path(), "*.html");
        assert_eq!(resolver.resolve().unwrap().len(), 1);

        create_test_file(temp.path(), "b.html");
        assert_eq!(resolver.resolve().unwrap().len(), 2);
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(expand_braces("*.html"), vec!["*.html"]);
        assert_eq!(expand_braces("**/*.{py,yml}"), vec!["**/*.py", "**/*.yml"]);
        assert_eq!(
            expand_braces("{a,b}/{c,d}.ts"),
            vec!["a/c.ts", "a/d.ts", "b/c.ts", "b/d.ts"]
        );
        assert_eq!(expand_braces("unclosed{a,b"), vec!["unclosed{a,b"]);
    }

    #[test]
    fn test_to_slash() {
        let path: PathBuf = ["assets", "stylesheets", "main.css"].iter().collect();
        assert_eq!(to_slash(&path), "assets/stylesheets/main.css");
        assert_eq!(to_slash(Path::new("./a/../b")), "a/../b");
    }
}
