use docsync_core::topics_from_keywords;
use scraper::{ElementRef, Html, Selector};

use crate::decode::{decode_text, media_type};
use crate::markdown::render_markdown;
use crate::sanitize::{escape_raw_markup, sanitized_html};

/// Page metadata gathered alongside the markdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    /// Normalized topics derived from `<meta name="keywords">`.
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub markdown: String,
    pub metadata: PageMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("content looks binary")]
    Binary,
    #[error("content is not valid {encoding}")]
    Decode { encoding: String },
    #[error("unsupported content type {0}")]
    UnsupportedContentType(String),
    #[error("no extractable content")]
    Empty,
    #[error("rendering failed: {0}")]
    Render(String),
}

/// Turns a fetched body into normalized markdown plus metadata.
///
/// For a given implementation, identical input must produce byte-identical
/// markdown, and executable markup never reaches the output.
pub trait ContentExtractor: Send + Sync {
    fn extract(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
    ) -> Result<ExtractedPage, ExtractionError>;
}

/// Produces final markup for pages that build their content with client-side
/// scripts, e.g. by driving a headless browser.
pub trait PageRenderer: Send + Sync {
    fn render(&self, html: &str) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentFormat {
    Html,
    Text,
}

fn classify(content_type: Option<&str>, text: &str) -> Result<ContentFormat, ExtractionError> {
    let Some(content_type) = content_type else {
        let looks_like_markup = text.trim_start().starts_with('<');
        return Ok(if looks_like_markup {
            ContentFormat::Html
        } else {
            ContentFormat::Text
        });
    };
    match media_type(content_type).as_str() {
        "text/html" | "application/xhtml+xml" => Ok(ContentFormat::Html),
        "text/markdown" | "text/x-markdown" | "text/plain" => Ok(ContentFormat::Text),
        other => Err(ExtractionError::UnsupportedContentType(other.to_string())),
    }
}

/// Default backend: walks the parsed DOM and writes markdown directly.
///
/// The content root is the first `<main>`, then `<article>`, then `<body>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticMarkupExtractor;

impl ContentExtractor for StaticMarkupExtractor {
    fn extract(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
    ) -> Result<ExtractedPage, ExtractionError> {
        let text = decode_text(raw, content_type)?;
        match classify(content_type, &text)? {
            ContentFormat::Html => html_page(&text, render_markdown),
            ContentFormat::Text => text_page(&text),
        }
    }
}

/// Backend built on `html2md`. The content root is sanitized and re-serialized
/// before conversion, since `html2md` keeps unknown markup as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct Html2MdExtractor;

impl ContentExtractor for Html2MdExtractor {
    fn extract(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
    ) -> Result<ExtractedPage, ExtractionError> {
        let text = decode_text(raw, content_type)?;
        match classify(content_type, &text)? {
            ContentFormat::Html => html_page(&text, |root| {
                normalize_text(&html2md::parse_html(&sanitized_html(root)))
            }),
            ContentFormat::Text => text_page(&text),
        }
    }
}

/// Runs an injected [`PageRenderer`] over HTML first, then hands the rendered
/// markup to the static writer, so rendered output is sanitized like any other page.
pub struct RenderingExtractor<R> {
    renderer: R,
}

impl<R: PageRenderer> RenderingExtractor<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }
}

impl<R: PageRenderer> ContentExtractor for RenderingExtractor<R> {
    fn extract(
        &self,
        raw: &[u8],
        content_type: Option<&str>,
    ) -> Result<ExtractedPage, ExtractionError> {
        let text = decode_text(raw, content_type)?;
        match classify(content_type, &text)? {
            ContentFormat::Html => {
                let rendered = self.renderer.render(&text)?;
                html_page(&rendered, render_markdown)
            }
            ContentFormat::Text => text_page(&text),
        }
    }
}

fn html_page(
    html: &str,
    convert: impl Fn(ElementRef) -> String,
) -> Result<ExtractedPage, ExtractionError> {
    let document = Html::parse_document(html);
    let metadata = read_metadata(&document);
    let markdown = convert(content_root(&document));
    if markdown.trim().is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(ExtractedPage { markdown, metadata })
}

fn text_page(text: &str) -> Result<ExtractedPage, ExtractionError> {
    let markdown = normalize_text(&escape_raw_markup(text));
    if markdown.is_empty() {
        return Err(ExtractionError::Empty);
    }
    let title = markdown
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    Ok(ExtractedPage {
        markdown,
        metadata: PageMetadata {
            title,
            ..PageMetadata::default()
        },
    })
}

/// Unix line endings, no trailing whitespace on lines, at most one blank line in a
/// row, and exactly one trailing newline (or nothing for empty input).
fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    let trimmed = out.trim_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn text_of(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    select_first(document, css)
        .and_then(|meta| meta.value().attr("content"))
        .map(|content| content.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|content| !content.is_empty())
}

fn read_metadata(document: &Html) -> PageMetadata {
    let title = select_first(document, "title")
        .map(text_of)
        .filter(|t| !t.is_empty())
        .or_else(|| select_first(document, "h1").map(text_of).filter(|t| !t.is_empty()))
        .or_else(|| meta_content(document, r#"meta[property="og:title"]"#))
        .unwrap_or_default();
    let description = meta_content(document, r#"meta[name="description"]"#)
        .or_else(|| meta_content(document, r#"meta[property="og:description"]"#))
        .unwrap_or_default();
    let keywords = meta_content(document, r#"meta[name="keywords"]"#)
        .map(|raw| topics_from_keywords(&raw))
        .unwrap_or_default();
    PageMetadata {
        title,
        description,
        keywords,
    }
}

fn content_root(document: &Html) -> ElementRef<'_> {
    ["main", "article", r#"[role="main"]"#, "body"]
        .into_iter()
        .find_map(|css| select_first(document, css))
        .unwrap_or_else(|| document.root_element())
}
