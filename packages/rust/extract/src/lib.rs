//! Plain-text extraction from stored HTML pages.
//!
//! A page goes through three steps:
//! 1. Decode the raw bytes with the configured encoding priority list
//! 2. Pick the primary content region by selector priority (falls back to `<body>`)
//! 3. Drop boilerplate subtrees and collect visible text, one line per block element

mod cleanup;
mod decode;

pub use decode::decode_body;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument, warn};

use doki_shared::{Document, DokiError, ExtractionConfig, Result, TextEncoding};

/// Content containers tried in order.
const DEFAULT_CONTENT_SELECTORS: &[&str] = &[
    "article[role='main']",
    "main",
    "div.main-content",
    "div.content",
    "div.body",
];

/// Subtrees removed before text is collected.
const DEFAULT_STRIP_SELECTORS: &[&str] = &["nav", "footer", "script", "style", "aside", "form"];

/// Elements that start a new line in the extracted text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "body", "caption", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li",
    "main", "ol", "p", "pre", "section", "summary", "table", "tbody", "td", "tfoot", "th",
    "thead", "tr", "ul",
];

/// Block elements set off from their neighbours by a blank line.
const PARAGRAPH_ELEMENTS: &[&str] = &[
    "article", "blockquote", "dl", "figure", "h1", "h2", "h3", "h4", "h5", "h6", "ol", "p", "pre",
    "section", "table", "ul",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options for content extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Encodings tried in order before lossy UTF-8.
    pub encodings: Vec<TextEncoding>,
    /// CSS selectors for the primary content region, highest priority first.
    pub content_selectors: Vec<String>,
    /// CSS selectors for subtrees to drop.
    pub strip_selectors: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for ExtractOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            encodings: config.encodings.clone(),
            content_selectors: DEFAULT_CONTENT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            strip_selectors: DEFAULT_STRIP_SELECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Compiled extractor. Build once, reuse for every page.
#[derive(Debug)]
pub struct Extractor {
    encodings: Vec<TextEncoding>,
    content: Vec<Selector>,
    strip: Vec<Selector>,
    body: Selector,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

impl Extractor {
    pub fn new(options: ExtractOptions) -> Result<Self> {
        Ok(Self {
            encodings: options.encodings,
            content: parse_selectors(&options.content_selectors)?,
            strip: parse_selectors(&options.strip_selectors)?,
            body: parse_selector("body")?,
        })
    }

    /// Turn one stored page into a [`Document`].
    ///
    /// Returns `None` when the page has no content region or no visible text.
    #[instrument(skip(self, body), fields(bytes = body.len()))]
    pub fn extract(&self, source: &str, body: &[u8]) -> Option<Document> {
        let (html, encoding) = decode_body(body, &self.encodings);
        match encoding {
            Some(encoding) => debug!(?encoding, "decoded page"),
            None => warn!(source, "no configured encoding matched, decoded lossily"),
        }

        let text = self.extract_text(&html)?;
        debug!(chars = text.chars().count(), "extracted text");

        Some(Document {
            text,
            source: source.to_string(),
        })
    }

    /// Visible text of the primary content region of `html`.
    pub fn extract_text(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);

        let region = self
            .content
            .iter()
            .find_map(|selector| doc.select(selector).next())
            .or_else(|| doc.select(&self.body).next())?;

        let mut raw = String::new();
        self.collect_text(region, false, &mut raw);

        let text = cleanup::run_pipeline(&raw);
        if text.is_empty() { None } else { Some(text) }
    }

    /// Newlines in source text are plain whitespace except under `<pre>`, so
    /// line breaks in the output come only from markup.
    fn collect_text(&self, element: ElementRef<'_>, preformatted: bool, out: &mut String) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) if preformatted => out.push_str(text),
                Node::Text(text) => out.extend(text.chars().map(|c| if c == '\n' { ' ' } else { c })),
                Node::Element(_) => {
                    let Some(child) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.is_stripped(&child) {
                        continue;
                    }

                    let name = child.value().name();
                    if name == "br" {
                        out.push('\n');
                        continue;
                    }

                    let breaks = if PARAGRAPH_ELEMENTS.contains(&name) {
                        2
                    } else if BLOCK_ELEMENTS.contains(&name) {
                        1
                    } else {
                        0
                    };
                    end_line(out, breaks);
                    self.collect_text(child, preformatted || name == "pre", out);
                    end_line(out, breaks);
                }
                _ => {}
            }
        }
    }

    fn is_stripped(&self, element: &ElementRef<'_>) -> bool {
        self.strip.iter().any(|selector| selector.matches(element))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Make `out` end with at least `breaks` newlines, ignoring trailing spaces.
fn end_line(out: &mut String, breaks: usize) {
    if breaks == 0 {
        return;
    }
    out.truncate(out.trim_end_matches([' ', '\t']).len());
    if out.is_empty() {
        return;
    }
    let have = out.len() - out.trim_end_matches('\n').len();
    for _ in have..breaks {
        out.push('\n');
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| DokiError::parse(format!("invalid selector {s:?}: {e}")))
}

fn parse_selectors(list: &[String]) -> Result<Vec<Selector>> {
    list.iter().map(|s| parse_selector(s)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
