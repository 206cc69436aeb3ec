//! Rendering assembler: translated Markdown → styled HTML → PDF bytes.
//!
//! The Markdown is cut back into pages at its `# Page N` lines. Each page
//! becomes a `.page-container` block; images on that page get the size they
//! had on the source page (in points, from the rendered bounding box) and
//! their stored locator is swapped for an inline `data:` URI.
//!
//! The HTML→PDF step itself is delegated to an [`HtmlRenderer`]. The default
//! [`CommandRenderer`] shells out to an external tool (weasyprint unless
//! configured otherwise) and runs inside `spawn_blocking`.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::markdown::RE_PLACEHOLDER;
use crate::model::ImageRecord;
use crate::store::ImageResolver;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::fmt::Write as _;
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[ \t]+Page[ \t]+(\d+)[ \t]*\r?$").unwrap());

// Offline marker line, `[ko→en]`.
static RE_LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\[\]\n]+→[^\[\]\n]+\][ \t]*\r?$").unwrap());

static RE_TRAILING_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*---[ \t]*\s*$").unwrap());

/// One page's worth of Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBlock<'a> {
    /// `None` for text that precedes the first page marker.
    pub page_number: Option<usize>,
    pub markdown: &'a str,
}

/// Cuts Markdown at its `# Page N` lines.
///
/// Each block starts at its marker line and keeps it. A `[src→tgt]` line
/// right above a marker starts the block instead, so it travels with its
/// page. Markers inside code fences are text. The page separator that
/// closes a page (`---`) is dropped because page containers already break.
/// Blank preambles are dropped; a non-blank one becomes a block with no
/// page number.
pub fn split_pages(markdown: &str) -> Vec<PageBlock<'_>> {
    let markers = page_markers(markdown);

    let mut blocks = Vec::with_capacity(markers.len() + 1);
    let first = markers.first().map_or(markdown.len(), |(start, _)| *start);
    let preamble = strip_separator(&markdown[..first]);
    if !preamble.trim().is_empty() {
        blocks.push(PageBlock {
            page_number: None,
            markdown: preamble,
        });
    }

    for (i, (start, n)) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map_or(markdown.len(), |(next, _)| *next);
        blocks.push(PageBlock {
            page_number: Some(*n),
            markdown: strip_separator(&markdown[*start..end]),
        });
    }
    blocks
}

/// `(block start, page number)` for every page marker outside code fences.
fn page_markers(markdown: &str) -> Vec<(usize, usize)> {
    let mut markers = Vec::new();
    let mut offset = 0;
    let mut in_fence = false;
    let mut tag_start: Option<usize> = None;

    for line in markdown.split_inclusive('\n') {
        let body = line.strip_suffix('\n').unwrap_or(line);
        let trimmed = body.trim_start();
        let mut is_tag = false;
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some(n) = RE_PAGE_MARKER
                .captures(body)
                .and_then(|caps| caps[1].parse().ok())
            {
                markers.push((tag_start.unwrap_or(offset), n));
            }
            is_tag = RE_LANGUAGE_TAG.is_match(body);
        }
        tag_start = is_tag.then_some(offset);
        offset += line.len();
    }
    markers
}

fn strip_separator(s: &str) -> &str {
    match RE_TRAILING_SEPARATOR.find(s) {
        Some(m) => s[..m.start()].trim_end(),
        None => s.trim_end(),
    }
}

/// Builds the complete HTML document handed to the renderer.
pub fn assemble_html(
    markdown: &str,
    title: Option<&str>,
    lang: &str,
    records: &[ImageRecord],
    resolver: &dyn ImageResolver,
) -> String {
    let mut body = String::new();
    for block in split_pages(markdown) {
        let page_records: Vec<&ImageRecord> = match block.page_number {
            Some(n) => records.iter().filter(|r| r.page_number == n).collect(),
            None => Vec::new(),
        };
        let inner = page_to_html(block.markdown, &page_records, records, resolver);
        match block.page_number {
            Some(n) => {
                let _ = write!(body, "<div class=\"page-container\" data-page=\"{n}\">\n{inner}</div>\n");
            }
            None => {
                let _ = write!(body, "<div class=\"page-container\">\n{inner}</div>\n");
            }
        }
    }

    let title = title.unwrap_or("Translated Document");
    format!(
        "<!DOCTYPE html>\n<html lang=\"{lang}\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{title_html}</title>\n<style>\n{page_rule}{STYLESHEET}</style>\n</head>\n\
         <body>\n{body}</body>\n</html>\n",
        lang = escape_html(lang),
        title_html = escape_html(title),
        page_rule = page_rule(title),
    )
}

/// Markdown of one page to HTML, with images sized and inlined.
fn page_to_html(
    markdown: &str,
    page_records: &[&ImageRecord],
    all_records: &[ImageRecord],
    resolver: &dyn ImageResolver,
) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);

    let mut events: Vec<Event> = Vec::new();
    // (dest, title, alt) of the image currently being read.
    let mut image: Option<(CowStr, CowStr, String)> = None;

    for event in Parser::new_ext(markdown, options) {
        if let Some((_, _, alt)) = image.as_mut() {
            match event {
                Event::Text(t) | Event::Code(t) => alt.push_str(&t),
                Event::End(TagEnd::Image) => {
                    if let Some((dest, title, alt)) = image.take() {
                        let tag = image_tag(&dest, &title, &alt, page_records, all_records, resolver);
                        events.push(Event::InlineHtml(tag.into()));
                    }
                }
                _ => {}
            }
            continue;
        }
        match event {
            Event::Start(Tag::Image {
                dest_url, title, ..
            }) => image = Some((dest_url, title, String::new())),
            // Line breaks inside a paragraph are kept as breaks.
            Event::SoftBreak => events.push(Event::HardBreak),
            other => events.push(other),
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

fn image_tag(
    dest: &str,
    title: &str,
    alt: &str,
    page_records: &[&ImageRecord],
    all_records: &[ImageRecord],
    resolver: &dyn ImageResolver,
) -> String {
    let record = page_records
        .iter()
        .copied()
        .find(|r| refers_to(dest, r))
        .or_else(|| all_records.iter().find(|r| refers_to(dest, r)));

    let src = if dest.starts_with("data:") {
        dest.to_string()
    } else {
        match resolver.resolve(dest) {
            Some(uri) => uri,
            None => {
                warn!("Image '{}' could not be resolved, leaving the reference as is", dest);
                dest.to_string()
            }
        }
    };

    let mut tag = String::from("<img");
    if let Some(r) = record {
        let _ = write!(
            tag,
            " class=\"positioned\" style=\"width:{}pt;height:{}pt\"",
            r.width(),
            r.height()
        );
    }
    let _ = write!(tag, " src=\"{}\" alt=\"{}\"", escape_html(&src), escape_html(alt));
    if !title.is_empty() {
        let _ = write!(tag, " title=\"{}\"", escape_html(title));
    }
    tag.push_str(" />");
    tag
}

/// True when an image destination points at this record, either through its
/// stored locator or through an unresolved placeholder.
fn refers_to(dest: &str, record: &ImageRecord) -> bool {
    dest == record.locator
        || RE_PLACEHOLDER
            .captures(dest)
            .is_some_and(|caps| caps[1] == record.key)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `@page` rule with the title in the running header.
fn page_rule(title: &str) -> String {
    let css_title: String = title
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            '<' => vec!['\\', '3', 'c', ' '],
            c => vec![c],
        })
        .collect();
    format!(
        "@page {{\n  size: A4;\n  margin: 2.5cm 2cm;\n  \
         @top-center {{ content: \"{css_title}\"; font-size: 10pt; color: #666; }}\n  \
         @bottom-center {{ content: counter(page); font-size: 10pt; color: #666; }}\n}}\n"
    )
}

const STYLESHEET: &str = r#"body {
  font-family: "Noto Sans", "Noto Sans CJK KR", "Malgun Gothic", Arial, sans-serif;
  font-size: 11pt;
  line-height: 1.6;
  color: #333;
}
h1 { font-size: 24pt; margin: 20pt 0 12pt; color: #222; page-break-after: avoid; }
h2 { font-size: 18pt; margin: 16pt 0 10pt; page-break-after: avoid; }
h3 { font-size: 14pt; margin: 12pt 0 8pt; color: #444; page-break-after: avoid; }
h4, h5, h6 { font-size: 12pt; margin: 10pt 0 6pt; color: #555; page-break-after: avoid; }
p { margin: 0 0 10pt; text-align: justify; }
ul, ol { margin: 6pt 0 10pt; padding-left: 20pt; }
li { margin-bottom: 4pt; }
table { width: 100%; border-collapse: collapse; margin: 10pt 0; page-break-inside: avoid; }
th { background-color: #f5f5f5; border: 1px solid #ddd; padding: 8pt; text-align: left; font-weight: bold; }
td { border: 1px solid #ddd; padding: 8pt; }
code { background-color: #f5f5f5; padding: 2pt 4pt; border-radius: 3px; font-family: "Courier New", monospace; font-size: 9pt; }
pre { background-color: #f5f5f5; padding: 10pt; border-radius: 5px; page-break-inside: avoid; }
pre code { background-color: transparent; padding: 0; }
blockquote { border-left: 4px solid #ddd; padding-left: 12pt; margin-left: 0; color: #666; font-style: italic; }
hr { border: none; border-top: 1px solid #ddd; margin: 20pt 0; }
a { color: #0066cc; text-decoration: none; }
img { max-width: 100%; height: auto; page-break-inside: avoid; }
img.positioned { display: block; max-width: none; margin: 6pt 0; }
.page-container { page-break-after: always; }
.page-container:last-child { page-break-after: auto; }
"#;

// ── Renderers ────────────────────────────────────────────────────────────

/// HTML document in, PDF bytes out.
pub trait HtmlRenderer: Send + Sync {
    fn render(&self, html: &str) -> Result<Vec<u8>, PipelineError>;
}

/// Runs an external HTML→PDF command such as `weasyprint {input} {output}`.
///
/// The HTML is written to a temporary directory; `{input}` and `{output}`
/// in the command are replaced with the HTML and PDF paths.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    command: String,
}

impl CommandRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.renderer_command.clone())
    }
}

fn render_error(detail: impl Into<String>) -> PipelineError {
    PipelineError::RenderingFailure {
        detail: detail.into(),
    }
}

impl HtmlRenderer for CommandRenderer {
    fn render(&self, html: &str) -> Result<Vec<u8>, PipelineError> {
        let dir = tempfile::tempdir().map_err(|e| render_error(format!("temp dir: {e}")))?;
        let input = dir.path().join("document.html");
        let output = dir.path().join("document.pdf");
        std::fs::write(&input, html).map_err(|e| render_error(format!("writing HTML: {e}")))?;

        let input_str = input.to_string_lossy();
        let output_str = output.to_string_lossy();
        let mut parts = self.command.split_whitespace().map(|arg| {
            arg.replace("{input}", &input_str)
                .replace("{output}", &output_str)
        });
        let program = parts
            .next()
            .ok_or_else(|| render_error("renderer command is empty"))?;
        let args: Vec<String> = parts.collect();

        debug!("Running renderer: {} {:?}", program, args);
        let result = Command::new(&program)
            .args(&args)
            .output()
            .map_err(|e| render_error(format!("could not run '{program}': {e}")))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(render_error(format!(
                "'{program}' exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        let bytes = std::fs::read(&output)
            .map_err(|e| render_error(format!("'{program}' produced no output: {e}")))?;
        if bytes.is_empty() {
            return Err(render_error(format!("'{program}' produced an empty file")));
        }
        Ok(bytes)
    }
}

/// Assembles the HTML, then renders it on the blocking pool.
pub async fn render_document(
    markdown: &str,
    title: Option<&str>,
    lang: &str,
    records: &[ImageRecord],
    resolver: &dyn ImageResolver,
    renderer: Arc<dyn HtmlRenderer>,
) -> Result<Vec<u8>, PipelineError> {
    let html = assemble_html(markdown, title, lang, records, resolver);
    debug!("Assembled {} bytes of HTML", html.len());

    let pdf = tokio::task::spawn_blocking(move || renderer.render(&html))
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task panicked: {}", e)))??;

    info!("Rendered PDF ({} bytes)", pdf.len());
    Ok(pdf)
}
