//! Markup parsing: plain text plus embedded media references.
//!
//! The parser is permissive. Malformed markup is repaired by `scraper`'s
//! HTML5 parser and never produces an error; elements without a usable
//! source are skipped.

mod cleanup;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};
use url::Url;

use mediaqa_shared::{MediaKind, MediaReference};

/// Elements whose text never reaches the plain-text output.
const SKIP_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line in the plain-text output.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "title", "tr", "ul",
];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of parsing a document.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Visible text, one block per line, whitespace collapsed.
    pub text: String,
    /// Image and audio references in document order.
    pub media: Vec<MediaReference>,
}

impl ParsedDocument {
    /// References of one kind, in document order.
    pub fn media_of(&self, kind: MediaKind) -> impl Iterator<Item = &MediaReference> {
        self.media.iter().filter(move |m| m.kind == kind)
    }
}

/// Options controlling source resolution.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Base URL relative image sources are resolved against.
    pub media_base: Url,
    /// Also resolve relative audio sources. Off by default: audio sources
    /// are kept exactly as written.
    pub resolve_audio_relative: bool,
}

impl ParseOptions {
    pub fn new(media_base: Url) -> Self {
        Self {
            media_base,
            resolve_audio_relative: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse markup into plain text and media references.
#[instrument(skip_all, fields(base = %opts.media_base, len = raw.len()))]
pub fn parse(raw: &str, opts: &ParseOptions) -> ParsedDocument {
    let doc = Html::parse_document(raw);

    let text = cleanup::run_pipeline(&collect_text(&doc));
    let media = extract_media(&doc, opts);

    debug!(
        text_len = text.len(),
        images = media.iter().filter(|m| m.kind == MediaKind::Image).count(),
        audio = media.iter().filter(|m| m.kind == MediaKind::Audio).count(),
        "document parsed"
    );

    ParsedDocument { text, media }
}

/// Concatenate visible text nodes, breaking lines around block elements.
fn collect_text(doc: &Html) -> String {
    let mut out = String::new();
    push_text(doc.root_element(), &mut out);
    out
}

fn push_text(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    if SKIP_TEXT_TAGS.contains(&name) {
        return;
    }

    // Duplicate breaks collapse in cleanup
    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }

    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    push_text(child, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.push('\n');
    }
}

/// Collect `<img>` and `<audio>` references in document order.
fn extract_media(doc: &Html, opts: &ParseOptions) -> Vec<MediaReference> {
    let media_sel = Selector::parse("img, audio").unwrap();
    let mut media = Vec::new();

    for el in doc.select(&media_sel) {
        let reference = match el.value().name() {
            "img" => image_reference(&el, opts),
            _ => audio_reference(&el, opts),
        };
        if let Some(reference) = reference {
            media.push(reference);
        }
    }

    media
}

fn image_reference(el: &ElementRef, opts: &ParseOptions) -> Option<MediaReference> {
    let Some(src) = non_empty_attr(el, "src") else {
        debug!("image without src, skipping");
        return None;
    };
    let url = resolve(&src, &opts.media_base)?;

    let caption = non_empty_attr(el, "alt").or_else(|| figure_caption(el));

    Some(MediaReference {
        url,
        kind: MediaKind::Image,
        caption,
    })
}

fn audio_reference(el: &ElementRef, opts: &ParseOptions) -> Option<MediaReference> {
    let source_sel = Selector::parse("source[src]").unwrap();

    let src = non_empty_attr(el, "src").or_else(|| {
        el.select(&source_sel)
            .find_map(|source| non_empty_attr(&source, "src"))
    });
    let Some(src) = src else {
        debug!("audio without src, skipping");
        return None;
    };

    let url = if opts.resolve_audio_relative {
        resolve(&src, &opts.media_base)?
    } else {
        src
    };

    Some(MediaReference {
        url,
        kind: MediaKind::Audio,
        caption: figure_caption(el),
    })
}

/// Keep absolute URLs as written; join anything else onto `base`.
///
/// Root-relative sources (`/i/x.png`) stay under the base path instead of
/// jumping to the host root.
fn resolve(src: &str, base: &Url) -> Option<String> {
    if Url::parse(src).is_ok() {
        return Some(src.to_string());
    }
    let relative = if src.starts_with('/') && !src.starts_with("//") {
        src.trim_start_matches('/')
    } else {
        src
    };
    match base.join(relative) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            debug!(src, error = %e, "unresolvable media source, skipping");
            None
        }
    }
}

/// Trimmed attribute value, if present and non-empty.
fn non_empty_attr(el: &ElementRef, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Text of the `<figcaption>` of the nearest enclosing `<figure>`.
fn figure_caption(el: &ElementRef) -> Option<String> {
    let caption_sel = Selector::parse("figcaption").unwrap();

    let figure = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "figure")?;

    figure
        .select(&caption_sel)
        .next()
        .map(|c| cleanup::collapse_spaces(&c.text().collect::<String>()))
        .filter(|c| !c.is_empty())
}
