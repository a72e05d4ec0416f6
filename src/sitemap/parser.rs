//! Streaming sitemap reader.
//!
//! Elements are matched on their local names only, so `<urlset>`, `<sm:urlset>` and
//! documents using an unexpected namespace URI all parse the same way. Only `loc` and
//! `lastmod` that are direct children of an entry element are read; extension
//! elements such as `<image:image><image:loc>` are ignored.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::ParseError;
use super::types::{SitemapEntry, SitemapKind};

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: entries reference child sitemaps
    Index(Vec<SitemapEntry>),
    /// `<urlset>`: entries reference pages
    UrlSet(Vec<SitemapEntry>),
}

impl SitemapDocument {
    pub fn kind(&self) -> SitemapKind {
        match self {
            SitemapDocument::Index(_) => SitemapKind::Index,
            SitemapDocument::UrlSet(_) => SitemapKind::Leaf,
        }
    }

    pub fn entries(&self) -> &[SitemapEntry] {
        match self {
            SitemapDocument::Index(entries) | SitemapDocument::UrlSet(entries) => entries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Sitemap,
    Url,
}

#[derive(Debug)]
struct PendingEntry {
    kind: EntryKind,
    loc: String,
    lastmod: String,
}

impl PendingEntry {
    fn new(kind: EntryKind) -> Self {
        Self {
            kind,
            loc: String::new(),
            lastmod: String::new(),
        }
    }

    fn finish(self) -> Option<SitemapEntry> {
        let loc = self.loc.trim();
        if loc.is_empty() {
            return None;
        }
        let lastmod = self.lastmod.trim();
        Some(SitemapEntry {
            loc: loc.to_string(),
            lastmod: (!lastmod.is_empty()).then(|| lastmod.to_string()),
        })
    }
}

fn entry_kind(name: &str) -> Option<EntryKind> {
    match name {
        "sitemap" => Some(EntryKind::Sitemap),
        "url" => Some(EntryKind::Url),
        _ => None,
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

/// Parse a sitemap document and classify it by its root element
pub fn parse(xml: &[u8]) -> Result<SitemapDocument, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut root: Option<String> = None;
    let mut stack: Vec<String> = Vec::new();
    let mut current: Option<PendingEntry> = None;
    let mut sitemaps = Vec::new();
    let mut urls = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e.local_name().as_ref());
                if root.is_none() {
                    root = Some(name.clone());
                } else if stack.len() == 1 {
                    current = entry_kind(&name).map(PendingEntry::new);
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if root.is_none() {
                    root = Some(local_name(e.local_name().as_ref()));
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(entry) = current.as_mut() {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(e).into_owned(),
                    };
                    append_field(entry, &stack, &text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(entry) = current.as_mut() {
                    append_field(entry, &stack, &String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                stack.pop();
                if stack.len() == 1 {
                    if let Some(entry) = current.take() {
                        let kind = entry.kind;
                        if let Some(finished) = entry.finish() {
                            match kind {
                                EntryKind::Sitemap => sitemaps.push(finished),
                                EntryKind::Url => urls.push(finished),
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => {
                if !stack.is_empty() {
                    return Err(ParseError::Truncated);
                }
                break;
            }
            Err(e) => {
                return Err(ParseError::Malformed {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                });
            }
            _ => {}
        }
        buf.clear();
    }

    match root.as_deref() {
        None => Err(ParseError::Empty),
        Some("sitemapindex") => Ok(SitemapDocument::Index(sitemaps)),
        Some("urlset") => Ok(SitemapDocument::UrlSet(urls)),
        Some(_) if !sitemaps.is_empty() => Ok(SitemapDocument::Index(sitemaps)),
        Some(_) if !urls.is_empty() => Ok(SitemapDocument::UrlSet(urls)),
        Some(other) => Err(ParseError::UnexpectedRoot(other.to_string())),
    }
}

/// Text inside `<entry><loc>` or `<entry><lastmod>` only
fn append_field(entry: &mut PendingEntry, stack: &[String], text: &str) {
    if stack.len() != 3 {
        return;
    }
    match stack[2].as_str() {
        "loc" => entry.loc.push_str(text),
        "lastmod" => entry.lastmod.push_str(text),
        _ => {}
    }
}
