use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::{NsReader, Reader};
use thiserror::Error;

use crate::util::normalize_text;

/// SEC-003: Maximum element nesting depth accepted from a feed document.
/// Prevents unbounded memory growth from maliciously deep XML.
const MAX_DEPTH: usize = 64;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

const DEFAULT_FEED_TITLE: &str = "Feed";
const DEFAULT_ENTRY_TITLE: &str = "Untitled";

/// Errors that can occur while turning feed bytes into a [`FeedDocument`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes are not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("XML parse error: document has no root element")]
    NoRoot,
    #[error("XML parse error: content after the root element")]
    TrailingContent,
    #[error("XML parse error: unclosed element <{0}>")]
    Unclosed(String),
    #[error("XML parse error: unbound namespace prefix '{0}'")]
    UnboundPrefix(String),
    #[error("XML parse error: unknown encoding '{0}'")]
    UnsupportedEncoding(String),
    /// SEC-003: Nesting depth exceeds safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),
    /// The root is not Atom and has no `channel` child.
    #[error("Invalid RSS feed: missing channel")]
    MissingChannel,
}

/// A single item from an RSS channel or entry from an Atom feed.
///
/// All text fields are already normalized to plain text. `link`, `summary`
/// and `published` may be empty; `published` is the date exactly as the feed
/// wrote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: String,
}

/// Feed title plus entries in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

/// Syndication format, decided once from the root element's namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss,
    Atom,
}

impl FeedFormat {
    fn detect(root: &Element) -> Self {
        if root.namespace.as_deref() == Some(ATOM_NS) {
            FeedFormat::Atom
        } else {
            FeedFormat::Rss
        }
    }
}

/// Parses RSS 2.0 or Atom bytes into a normalized [`FeedDocument`].
///
/// # Security
///
/// - XXE (XML External Entity) attacks are mitigated because `quick-xml` (0.37) does not
///   parse `<!ENTITY>` declarations. Only the predefined XML entities and character
///   references are expanded; anything else is a parse error.
/// - SEC-003: documents nested deeper than 64 elements are rejected.
///
/// The character encoding comes from a byte order mark, else from the XML
/// declaration, else UTF-8.
///
/// # Errors
///
/// Returns [`ParseError`] for malformed XML, or an RSS document lacking `channel`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let text = decode_document(bytes)?;
    let root = read_tree(&text)?;
    let format = FeedFormat::detect(&root);
    tracing::debug!(format = ?format, root = %root.name, "Detected feed format");

    let document = match format {
        FeedFormat::Atom => parse_atom(&root),
        FeedFormat::Rss => parse_rss(&root)?,
    };

    tracing::debug!(title = %document.title, entries = document.entries.len(), "Parsed feed");
    Ok(document)
}

fn parse_rss(root: &Element) -> Result<FeedDocument, ParseError> {
    let channel = root.child(None, "channel").ok_or(ParseError::MissingChannel)?;

    let entries = channel
        .children_named(None, "item")
        .map(|item| {
            let summary = Some(item.child_text(Some(CONTENT_NS), "encoded"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| item.child_text(None, "description"));

            FeedEntry {
                title: or_default(item.child_text(None, "title"), DEFAULT_ENTRY_TITLE),
                link: item.child_text(None, "link"),
                summary,
                published: item.child_text(None, "pubDate"),
            }
        })
        .collect();

    Ok(FeedDocument {
        title: or_default(channel.child_text(None, "title"), DEFAULT_FEED_TITLE),
        entries,
    })
}

fn parse_atom(root: &Element) -> FeedDocument {
    let atom = Some(ATOM_NS);

    let entries = root
        .children_named(atom, "entry")
        .map(|entry| {
            let summary = Some(entry.child_text(atom, "summary"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| entry.child_text(atom, "content"));
            let published = Some(entry.child_text(atom, "updated"))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| entry.child_text(atom, "published"));

            FeedEntry {
                title: or_default(entry.child_text(atom, "title"), DEFAULT_ENTRY_TITLE),
                link: select_atom_link(entry),
                summary,
                published,
            }
        })
        .collect();

    FeedDocument {
        title: or_default(root.child_text(atom, "title"), DEFAULT_FEED_TITLE),
        entries,
    }
}

/// Picks the first `rel="alternate"` link (a missing `rel` counts as alternate),
/// otherwise the first link with a non-empty href.
fn select_atom_link(entry: &Element) -> String {
    let mut fallback: Option<&str> = None;

    for link in entry.children_named(Some(ATOM_NS), "link") {
        let href = link.attr("href").unwrap_or_default().trim();
        if href.is_empty() {
            continue;
        }
        let rel = link.attr("rel").unwrap_or("alternate").trim();
        if rel == "alternate" {
            return href.to_owned();
        }
        if fallback.is_none() {
            fallback = Some(href);
        }
    }

    fallback.unwrap_or_default().to_owned()
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_owned()
    } else {
        value
    }
}

// ============================================================================
// Element tree
// ============================================================================

/// Minimal namespace-aware element tree.
///
/// `text` holds only the character data before the first child element, which
/// is all the field extraction above ever reads.
#[derive(Debug, Default)]
struct Element {
    namespace: Option<String>,
    name: String,
    /// Unprefixed attributes only.
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn is(&self, namespace: Option<&str>, name: &str) -> bool {
        self.namespace.as_deref() == namespace && self.name == name
    }

    fn child(&self, namespace: Option<&str>, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, name))
    }

    fn children_named<'a>(
        &'a self,
        namespace: Option<&'a str>,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(namespace, name))
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Normalized text of the first matching child, or empty.
    fn child_text(&self, namespace: Option<&str>, name: &str) -> String {
        self.child(namespace, name)
            .map(|c| normalize_text(&c.text))
            .unwrap_or_default()
    }

    fn push_text(&mut self, text: &str) {
        if self.children.is_empty() {
            self.text.push_str(text);
        }
    }
}

fn xml_err(e: impl std::fmt::Display) -> ParseError {
    ParseError::Xml(e.to_string())
}

fn utf8(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(xml_err)
}

fn resolve_namespace(resolved: ResolveResult<'_>) -> Result<Option<String>, ParseError> {
    match resolved {
        ResolveResult::Bound(Namespace(ns)) => Ok(Some(utf8(ns)?.to_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(ParseError::UnboundPrefix(
            String::from_utf8_lossy(&prefix).into_owned(),
        )),
    }
}

fn open_element(
    start: &BytesStart<'_>,
    namespace: Option<String>,
    reader: &NsReader<&[u8]>,
) -> Result<Element, ParseError> {
    let name = utf8(start.local_name().as_ref())?.to_owned();
    let decoder = reader.decoder();

    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_namespace_binding().is_some() || attr.key.prefix().is_some() {
            continue;
        }
        let key = utf8(attr.key.local_name().as_ref())?.to_owned();
        let value = attr.decode_and_unescape_value(decoder).map_err(xml_err)?;
        attrs.push((key, value.into_owned()));
    }

    Ok(Element {
        namespace,
        name,
        attrs,
        ..Element::default()
    })
}

/// Attaches a finished element to its parent, or makes it the root.
fn close_element(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ParseError::TrailingContent),
    }
    Ok(())
}

// ============================================================================
// Character encoding
// ============================================================================

/// Transcodes the raw document to UTF-8.
///
/// Bytes that are invalid in the chosen encoding are a parse error, not
/// replaced.
fn decode_document(bytes: &[u8]) -> Result<Cow<'_, str>, ParseError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (sniff_encoding(bytes)?, bytes),
    };
    if encoding != UTF_8 {
        tracing::debug!(encoding = encoding.name(), "Transcoding feed to UTF-8");
    }
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| xml_err(format!("cannot decode input using {}", encoding.name())))
}

/// Encoding of a document without a byte order mark.
fn sniff_encoding(bytes: &[u8]) -> Result<&'static Encoding, ParseError> {
    // "<?" in UTF-16 without a BOM
    match bytes {
        [b'<', 0, b'?', 0, ..] => return Ok(UTF_16LE),
        [0, b'<', 0, b'?', ..] => return Ok(UTF_16BE),
        _ => {}
    }

    let mut reader = Reader::from_reader(bytes);
    let Ok(Event::Decl(decl)) = reader.read_event() else {
        return Ok(UTF_8);
    };
    let Some(label) = decl.encoding() else {
        return Ok(UTF_8);
    };
    let label = label.map_err(xml_err)?;
    let encoding = Encoding::for_label(&label).ok_or_else(|| {
        ParseError::UnsupportedEncoding(String::from_utf8_lossy(&label).into_owned())
    })?;

    // The declaration was readable as ASCII, so a UTF-16 label is wrong; use UTF-8
    Ok(encoding.output_encoding())
}

// ============================================================================
// Tree building
// ============================================================================

fn read_tree(text: &str) -> Result<Element, ParseError> {
    // Already UTF-8, whatever the declaration says
    let mut reader = NsReader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event_into(&mut buf).map_err(xml_err)?;
        // Unbound for everything except prefixed or defaulted element names
        let namespace = resolve_namespace(resolved)?;

        match event {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err(ParseError::TrailingContent);
                }
                // SEC-003: Reject excessively nested documents
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseError::TooDeep(MAX_DEPTH));
                }
                stack.push(open_element(&e, namespace, &reader)?);
            }
            Event::Empty(e) => {
                let element = open_element(&e, namespace, &reader)?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                // quick-xml has already checked the end name matches the open tag
                let element = stack.pop().ok_or_else(|| xml_err("unexpected end tag"))?;
                close_element(element, &mut stack, &mut root)?;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_err)?;
                match stack.last_mut() {
                    Some(current) => current.push_text(&text),
                    None if text.trim().is_empty() => {}
                    None => return Err(xml_err("text outside the root element")),
                }
            }
            Event::CData(e) => {
                let inner = e.into_inner();
                match stack.last_mut() {
                    Some(current) => current.push_text(utf8(&inner)?),
                    None => return Err(xml_err("CDATA outside the root element")),
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, DOCTYPE
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.pop() {
        return Err(ParseError::Unclosed(open.name));
    }
    root.ok_or(ParseError::NoRoot)
}
