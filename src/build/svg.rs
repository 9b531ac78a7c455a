//! Lightweight SVG optimizer used for icon sets.
//!
//! Only markup that actually contains an `<svg` element is touched; licence
//! files and anything else flowing through the same copy pass come out
//! byte-for-byte identical.

use crate::build::copy::ByteTransform;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static XML_DECLARATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<\?xml[^>]*\?>").expect("valid regex"));
static DOCTYPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<!DOCTYPE[^>]*>").expect("valid regex"));
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata>|<metadata\b[^>]*/>").expect("valid regex"));
static INTER_TAG_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));

/// Strips declarations, comments, metadata and inter-tag whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgOptimizer;

impl SvgOptimizer {
    /// Create an optimizer.
    pub fn new() -> Self {
        Self
    }

    /// Optimize markup. Returns `None` for text that is not SVG.
    pub fn optimize_str(&self, text: &str) -> Option<String> {
        if !text.contains("<svg") {
            return None;
        }
        let text = XML_DECLARATION.replace_all(text, "");
        let text = DOCTYPE.replace_all(&text, "");
        let text = COMMENT.replace_all(&text, "");
        let text = METADATA.replace_all(&text, "");
        let text = INTER_TAG_SPACE.replace_all(&text, "><");
        Some(text.trim().to_string())
    }
}

impl ByteTransform for SvgOptimizer {
    fn transform(&self, _path: &Path, data: Vec<u8>) -> Result<Vec<u8>, String> {
        let optimized = std::str::from_utf8(&data).ok().and_then(|text| self.optimize_str(text));
        Ok(optimized.map(String::into_bytes).unwrap_or(data))
    }
}
