//! Plain-text extraction built on `lol_html`.
//!
//! Text inside chrome and non-content elements (scripts, navigation,
//! forms, ...) is skipped; block-level elements become line breaks.

use crate::error::FetchError;
use crate::fetcher::FetchedPage;
use lol_html::html_content::Element;
use lol_html::{element, text, HtmlRewriter, OutputSink, Settings};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Elements whose text never reaches the document
const IGNORE_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "nav", "header", "footer", "aside",
    "form", "button", "select", "iframe",
];

/// Elements that end a line of text
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr",
    "td", "th", "blockquote", "pre", "br", "table", "dd", "dt", "figcaption",
];

/// Text pulled from a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Cleaned plain text
    pub text: String,
    /// `<title>` text, if any
    pub title: Option<String>,
    /// Extra page facts (`description`, `lang`)
    pub metadata: BTreeMap<String, String>,
}

/// Turns fetched bytes into text
pub trait ContentExtractor: Send + Sync {
    /// Extract text, title and metadata
    fn extract_text(&self, page: &FetchedPage) -> Result<ExtractedContent, FetchError>;
}

/// HTML and plain-text extractor
#[derive(Debug, Clone, Copy)]
pub struct HtmlTextExtractor {
    max_chars: usize,
}

impl Default for HtmlTextExtractor {
    fn default() -> Self {
        Self { max_chars: 50_000 }
    }
}

impl HtmlTextExtractor {
    /// Create an extractor that keeps at most `max_chars` characters
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl ContentExtractor for HtmlTextExtractor {
    fn extract_text(&self, page: &FetchedPage) -> Result<ExtractedContent, FetchError> {
        let content_type = page
            .content_type
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase();
        let sniffed_html = content_type.is_empty()
            && page
                .body
                .iter()
                .find(|b| !b.is_ascii_whitespace())
                .is_some_and(|b| *b == b'<');

        let mut content = if content_type.contains("html") || content_type.contains("xml") || sniffed_html {
            extract_html(&page.body)?
        } else if content_type.starts_with("text/plain") || content_type.is_empty() {
            ExtractedContent {
                text: String::from_utf8_lossy(&page.body).into_owned(),
                ..ExtractedContent::default()
            }
        } else {
            return Err(FetchError::UnsupportedContentType(content_type));
        };

        content.text = clean_text(&content.text, self.max_chars);
        content.title = content
            .title
            .map(|t| clean_text(&t, 300).replace('\n', " "))
            .filter(|t| !t.is_empty());
        Ok(content)
    }
}

#[derive(Debug, Default)]
struct State {
    text: String,
    title: String,
    ignore_depth: usize,
    metadata: BTreeMap<String, String>,
}

fn extract_html(body: &[u8]) -> Result<ExtractedContent, FetchError> {
    let state = Arc::new(Mutex::new(State::default()));
    let element_state = Arc::clone(&state);
    let text_state = Arc::clone(&state);
    let title_state = Arc::clone(&state);
    let meta_state = Arc::clone(&state);
    let lang_state = Arc::clone(&state);

    let element_handler = element!("*", move |el: &mut Element<'_, '_>| {
        let tag = el.tag_name().to_ascii_lowercase();
        let ignored = IGNORE_TAGS.contains(&tag.as_str());
        let block = BLOCK_TAGS.contains(&tag.as_str());

        if block {
            element_state.lock().text.push('\n');
        }
        let Some(handlers) = el.end_tag_handlers() else {
            return Ok(());
        };
        if ignored {
            element_state.lock().ignore_depth += 1;
        }
        if ignored || block {
            let end_state = Arc::clone(&element_state);
            handlers.push(Box::new(move |_end| {
                let mut state = end_state.lock();
                if ignored {
                    state.ignore_depth = state.ignore_depth.saturating_sub(1);
                }
                if block {
                    state.text.push('\n');
                }
                Ok(())
            }));
        }
        Ok(())
    });

    let text_handler = text!("*", move |chunk| {
        let mut state = text_state.lock();
        if state.ignore_depth == 0 {
            state.text.push_str(chunk.as_str());
        }
        Ok(())
    });

    let title_handler = text!("title", move |chunk| {
        title_state.lock().title.push_str(chunk.as_str());
        Ok(())
    });

    let meta_handler = element!("meta[name=description], meta[property='og:description']", move |el| {
        if let Some(content) = el.get_attribute("content") {
            meta_state
                .lock()
                .metadata
                .entry("description".into())
                .or_insert(content);
        }
        Ok(())
    });

    let lang_handler = element!("html[lang]", move |el| {
        if let Some(lang) = el.get_attribute("lang") {
            lang_state.lock().metadata.insert("lang".into(), lang);
        }
        Ok(())
    });

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element_handler,
                text_handler,
                title_handler,
                meta_handler,
                lang_handler,
            ],
            ..Settings::default()
        },
        NoopSink,
    );
    rewriter
        .write(body)
        .map_err(|e| FetchError::Extraction(e.to_string()))?;
    rewriter
        .end()
        .map_err(|e| FetchError::Extraction(e.to_string()))?;

    let mut state = state.lock();
    let title = decode_entities(&state.title);
    Ok(ExtractedContent {
        text: decode_entities(&state.text),
        title: (!title.trim().is_empty()).then_some(title),
        metadata: std::mem::take(&mut state.metadata),
    })
}

fn decode_entities(input: &str) -> String {
    html_escape::decode_html_entities(input).into_owned()
}

/// Collapse whitespace per line, drop blank lines and control characters,
/// and cut to `max_chars`
#[must_use]
pub fn clean_text(raw: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(max_chars.saturating_mul(4)));
    let mut count = 0usize;
    for line in raw.lines() {
        let words = line
            .split(|c: char| c.is_whitespace() || c.is_control())
            .filter(|w| !w.is_empty());
        let mut line_started = false;
        for word in words {
            let sep = if line_started {
                Some(' ')
            } else if count > 0 {
                Some('\n')
            } else {
                None
            };
            let needed = word.chars().count() + usize::from(sep.is_some());
            if count + needed > max_chars {
                return out;
            }
            if let Some(sep) = sep {
                out.push(sep);
            }
            out.push_str(word);
            count += needed;
            line_started = true;
        }
    }
    out
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}
