//! Markup minification for rewritten templates.
//!
//! Templates are Jinja-flavoured HTML/XML, so the minifier never touches
//! anything between `{{ }}`, `{% %}` or `{# #}` delimiters that it cannot
//! leave verbatim: embedded stylesheets containing template markup are kept
//! as they are, and attribute values containing `{` are never collapsed.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[A-Za-z][^<>]*>").expect("valid regex"));
static RAW_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(script|style)(?:[\s/][^>]*)?>").expect("valid regex"));
static SCRIPT_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</script\s*>").expect("valid regex"));
static STYLE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</style\s*>").expect("valid regex"));
static LINK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^<link[\s/>]").expect("valid regex"));
/// One attribute of a start tag: name, then an optional quoted or bare value.
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+([^\s"'=<>/]+)(?:\s*=\s*("[^"]*"|'[^']*'|[^\s>]+))?"#).expect("valid regex")
});

const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "allowfullscreen",
    "async",
    "autofocus",
    "checked",
    "controls",
    "default",
    "defer",
    "disabled",
    "hidden",
    "ismap",
    "loop",
    "multiple",
    "muted",
    "nomodule",
    "novalidate",
    "open",
    "readonly",
    "required",
    "reversed",
    "selected",
];
const SCRIPT_TYPES: &[&str] = &["text/javascript", "application/javascript"];
const CSS_TYPES: &[&str] = &["text/css"];

/// Error from the markup minifier.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MinifyError {
    /// `<!--` without a matching `-->`
    #[error("Unterminated comment starting on line {line}")]
    UnterminatedComment { line: usize },
    /// `<script>` or `<style>` without a closing tag
    #[error("Unclosed <{tag}> element starting on line {line}")]
    UnclosedElement { tag: String, line: usize },
    /// Embedded stylesheet could not be minified
    #[error("Invalid CSS in <style> on line {line}: {message}")]
    Css { line: usize, message: String },
}

/// Minifies template markup.
pub trait HtmlMinifier: Send + Sync {
    /// Minify a complete template.
    fn minify(&self, html: &str) -> Result<String, MinifyError>;
}

/// Minifier switches.
///
/// Missing `<html>`, `<head>` or `<body>` tags are never inserted, since
/// templates are fragments extended by other templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinifyOptions {
    /// `disabled="disabled"` becomes `disabled`
    pub collapse_boolean_attributes: bool,
    /// Minify embedded `<style>` bodies
    pub minify_css: bool,
    /// Trim embedded `<script>` bodies
    pub minify_js: bool,
    /// Drop `<!-- -->` comments
    pub remove_comments: bool,
    /// Drop `type="text/javascript"` from `<script>`
    pub remove_script_type_attributes: bool,
    /// Drop `type="text/css"` from `<style>` and `<link>`
    pub remove_style_link_type_attributes: bool,
}

impl Default for MinifyOptions {
    fn default() -> Self {
        Self {
            collapse_boolean_attributes: true,
            minify_css: true,
            minify_js: true,
            remove_comments: true,
            remove_script_type_attributes: true,
            remove_style_link_type_attributes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Script,
    Style,
}

#[derive(Debug)]
enum Segment<'a> {
    Markup(&'a str),
    Comment(&'a str),
    Raw { kind: RawKind, open: &'a str, body: &'a str, close: &'a str, line: usize },
}

/// 1-based line of a byte offset.
fn line_of(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

fn has_template_markup(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

/// Split markup into comments, raw `<script>`/`<style>` elements and the rest.
fn segments(html: &str) -> Result<Vec<Segment<'_>>, MinifyError> {
    let mut segments = Vec::new();
    let mut pos = 0;

    loop {
        let comment = html[pos..].find("<!--").map(|i| pos + i);
        let raw = RAW_OPEN.captures_at(html, pos);
        let raw_start = raw.as_ref().and_then(|c| c.get(0)).map(|m| m.start());

        match (comment, raw_start) {
            (Some(start), r) if r.map_or(true, |r| start < r) => {
                segments.push(Segment::Markup(&html[pos..start]));
                let end = html[start + 4..]
                    .find("-->")
                    .map(|i| start + 4 + i + 3)
                    .ok_or(MinifyError::UnterminatedComment { line: line_of(html, start) })?;
                segments.push(Segment::Comment(&html[start..end]));
                pos = end;
            }
            (_, Some(start)) => {
                let Some(caps) = raw else { break };
                let open = &caps[0];
                let kind = if caps[1].eq_ignore_ascii_case("script") { RawKind::Script } else { RawKind::Style };
                let body_start = start + open.len();
                let closing = match kind {
                    RawKind::Script => &*SCRIPT_CLOSE,
                    RawKind::Style => &*STYLE_CLOSE,
                };
                let close = closing.find_at(html, body_start).ok_or_else(|| MinifyError::UnclosedElement {
                    tag: caps[1].to_ascii_lowercase(),
                    line: line_of(html, start),
                })?;

                segments.push(Segment::Markup(&html[pos..start]));
                segments.push(Segment::Raw {
                    kind,
                    open: &html[start..body_start],
                    body: &html[body_start..close.start()],
                    close: close.as_str(),
                    line: line_of(html, body_start),
                });
                pos = close.end();
            }
            _ => break,
        }
    }

    segments.push(Segment::Markup(&html[pos..]));
    Ok(segments)
}

/// Minify a stylesheet with lightningcss.
pub fn minify_css(css: &str) -> Result<String, String> {
    use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

    let mut sheet = StyleSheet::parse(css, ParserOptions::default()).map_err(|e| e.to_string())?;
    sheet.minify(MinifyOptions::default()).map_err(|e| e.to_string())?;
    let result = sheet
        .to_css(PrinterOptions { minify: true, ..PrinterOptions::default() })
        .map_err(|e| e.to_string())?;
    Ok(result.code)
}

/// Regex-driven minifier for Jinja templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupMinifier {
    options: MinifyOptions,
}

impl MarkupMinifier {
    /// Create a minifier with the given options.
    pub fn new(options: MinifyOptions) -> Self {
        Self { options }
    }

    /// The active options.
    pub fn options(&self) -> &MinifyOptions {
        &self.options
    }

    /// Rewrite the attributes of one start tag.
    ///
    /// A `type` attribute whose value is in `redundant_types` is dropped.
    /// Values containing `{` are never touched.
    fn rewrite_tag(&self, tag: &str, redundant_types: &[&str]) -> String {
        ATTRIBUTE
            .replace_all(tag, |caps: &Captures| {
                let name = &caps[1];
                let Some(value) = caps.get(2).map(|v| v.as_str().trim_matches(|c| c == '"' || c == '\'')) else {
                    return caps[0].to_string();
                };
                if value.contains('{') {
                    caps[0].to_string()
                } else if name.eq_ignore_ascii_case("type") && redundant_types.iter().any(|t| value.eq_ignore_ascii_case(t)) {
                    String::new()
                } else if self.options.collapse_boolean_attributes
                    && BOOLEAN_ATTRIBUTES.iter().any(|b| name.eq_ignore_ascii_case(b))
                {
                    format!(" {}", name)
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    fn rewrite_markup(&self, markup: &str) -> String {
        TAG.replace_all(markup, |caps: &Captures| {
            let tag = &caps[0];
            if self.options.remove_style_link_type_attributes && LINK_TAG.is_match(tag) {
                self.rewrite_tag(tag, CSS_TYPES)
            } else {
                self.rewrite_tag(tag, &[])
            }
        })
        .into_owned()
    }

    fn rewrite_raw(&self, kind: RawKind, open: &str, body: &str, line: usize) -> Result<(String, String), MinifyError> {
        let rewritten = match kind {
            RawKind::Script => {
                let types: &[&str] = if self.options.remove_script_type_attributes { SCRIPT_TYPES } else { &[] };
                let open = self.rewrite_tag(open, types);
                let body = if self.options.minify_js {
                    body.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join("\n")
                } else {
                    body.to_string()
                };
                (open, body)
            }
            RawKind::Style => {
                let types: &[&str] = if self.options.remove_style_link_type_attributes { CSS_TYPES } else { &[] };
                let open = self.rewrite_tag(open, types);
                let body = if self.options.minify_css && !body.trim().is_empty() && !has_template_markup(body) {
                    minify_css(body).map_err(|message| MinifyError::Css { line, message })?
                } else {
                    body.to_string()
                };
                (open, body)
            }
        };
        Ok(rewritten)
    }
}

impl HtmlMinifier for MarkupMinifier {
    fn minify(&self, html: &str) -> Result<String, MinifyError> {
        let mut out = String::with_capacity(html.len());
        for segment in segments(html)? {
            match segment {
                Segment::Markup(markup) => out.push_str(&self.rewrite_markup(markup)),
                Segment::Comment(comment) => {
                    if !self.options.remove_comments {
                        out.push_str(comment);
                    }
                }
                Segment::Raw { kind, open, body, close, line } => {
                    let (open, body) = self.rewrite_raw(kind, open, body, line)?;
                    out.push_str(&open);
                    out.push_str(&body);
                    out.push_str(close);
                }
            }
        }
        Ok(out)
    }
}
