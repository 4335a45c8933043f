// src/feed.rs
//! Atom feed page -> `Entry` values.
//!
//! The parser walks quick-xml events instead of deserializing into fixed
//! structs so that every direct child of `<entry>` lands in the raw field map
//! and can be targeted by a filter by name.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::counter;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

use crate::entry::Entry;

pub const UPDATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One parsed result page.
#[derive(Debug, Default, Clone)]
pub struct Page {
    pub entries: Vec<Entry>,
    /// Number of `<entry>` elements in the document, including skipped ones.
    /// The pagination cursor advances by this, not by `entries.len()`.
    pub raw_count: usize,
    pub skipped: usize,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.raw_count == 0
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("entry {id:?} has malformed updated field {value:?}")]
    MalformedDateField { id: String, value: String },
    #[error("entry without an id element")]
    MissingId,
    #[error("arXiv API reported an error: {0}")]
    Api(String),
}

pub fn parse_updated(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), UPDATED_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}

#[derive(Default)]
struct RawEntry {
    fields: BTreeMap<String, Vec<String>>,
    authors: Vec<String>,
}

impl RawEntry {
    fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    fn into_entry(self) -> std::result::Result<Entry, FeedError> {
        let id = self.first("id").map(str::trim).unwrap_or_default();
        if id.is_empty() {
            return Err(FeedError::MissingId);
        }
        if id.contains("/api/errors") {
            let msg = self.first("summary").unwrap_or("unknown error").trim();
            return Err(FeedError::Api(msg.to_string()));
        }
        let raw_updated = self.first("updated").unwrap_or_default();
        let updated = parse_updated(raw_updated).ok_or_else(|| FeedError::MalformedDateField {
            id: id.to_string(),
            value: raw_updated.to_string(),
        })?;

        Ok(Entry {
            id: id.to_string(),
            title: self.first("title").unwrap_or_default().trim().to_string(),
            summary: self.first("summary").unwrap_or_default().trim().to_string(),
            authors: self.authors,
            updated,
            fields: self.fields,
        })
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.context("reading xml attribute")?;
        if attr.key.local_name().as_ref() == key {
            let v = attr.unescape_value().context("unescaping xml attribute")?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

/// Value an attribute-only element (`<category term=".."/>`, `<link href=".."/>`)
/// contributes to the field map.
fn attr_fallback(e: &BytesStart) -> Result<Option<String>> {
    if let Some(term) = attr_value(e, b"term")? {
        return Ok(Some(term));
    }
    attr_value(e, b"href")
}

/// Parse one Atom page. Entries with a malformed `updated` field (or no id)
/// are skipped with a warning; an arXiv error entry aborts the page.
pub fn parse_page(xml: &str) -> Result<Page> {
    let mut reader = Reader::from_str(xml);
    let mut page = Page::default();

    let mut current: Option<RawEntry> = None;
    // element names below the current <entry>
    let mut path: Vec<String> = Vec::new();
    // (name, text, attribute fallback) of the direct child being read
    let mut child: Option<(String, String, Option<String>)> = None;
    let mut author_name = String::new();

    loop {
        match reader.read_event().context("reading atom feed")? {
            Event::Start(e) => {
                let name = local_name(&e);
                if current.is_none() {
                    if name == "entry" {
                        current = Some(RawEntry::default());
                        path.clear();
                    }
                    continue;
                }
                if path.is_empty() {
                    child = Some((name.clone(), String::new(), attr_fallback(&e)?));
                }
                if path.len() == 1 && path[0] == "author" && name == "name" {
                    author_name.clear();
                }
                path.push(name);
            }
            Event::Empty(e) => {
                if let (Some(raw), true) = (current.as_mut(), path.is_empty()) {
                    let value = attr_fallback(&e)?.unwrap_or_default();
                    raw.fields.entry(local_name(&e)).or_default().push(value);
                }
            }
            Event::Text(t) => {
                if let Some((_, buf, _)) = child.as_mut() {
                    let text = t.unescape().context("unescaping feed text")?;
                    buf.push_str(&text);
                    if is_author_name(&path) {
                        author_name.push_str(&text);
                    }
                }
            }
            Event::CData(c) => {
                if let Some((_, buf, _)) = child.as_mut() {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    buf.push_str(&text);
                    if is_author_name(&path) {
                        author_name.push_str(&text);
                    }
                }
            }
            Event::End(_) => {
                let Some(raw) = current.as_mut() else {
                    continue;
                };
                if is_author_name(&path) {
                    raw.authors.push(author_name.trim().to_string());
                }
                if path.pop().is_none() {
                    // closing </entry>
                    page.raw_count += 1;
                    if let Some(done) = current.take() {
                        match done.into_entry() {
                            Ok(entry) => page.entries.push(entry),
                            Err(FeedError::Api(msg)) => return Err(FeedError::Api(msg).into()),
                            Err(err) => {
                                tracing::warn!(target: "feed", error = %err, "skipping entry");
                                counter!("feed_entries_skipped_total").increment(1);
                                page.skipped += 1;
                            }
                        }
                    }
                    continue;
                }
                if path.is_empty() {
                    if let Some((name, text, fallback)) = child.take() {
                        let value = match fallback {
                            Some(attr) if text.trim().is_empty() => attr,
                            _ => text,
                        };
                        raw.fields.entry(name).or_default().push(value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(page)
}

fn is_author_name(path: &[String]) -> bool {
    path.len() == 2 && path[0] == "author" && path[1] == "name"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const ONE_ENTRY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <updated>2024-01-08T00:00:00-05:00</updated>
  <entry>
    <id>http://arxiv.org/abs/2401.01234v1</id>
    <updated>2024-01-05T18:00:01Z</updated>
    <published>2024-01-05T18:00:01Z</published>
    <title>Characters of
  finite groups &amp; more</title>
    <summary>  We compute things.
</summary>
    <author>
      <name>Ada Lovelace</name>
      <arxiv:affiliation>Analytical Engines Ltd</arxiv:affiliation>
    </author>
    <author>
      <name>Emmy Noether</name>
    </author>
    <arxiv:comment>12 pages</arxiv:comment>
    <link href="http://arxiv.org/abs/2401.01234v1" rel="alternate" type="text/html"/>
    <arxiv:primary_category term="math.RT" scheme="http://arxiv.org/schemas/atom"/>
    <category term="math.RT" scheme="http://arxiv.org/schemas/atom"/>
    <category term="math.GR" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_typed_and_raw_fields() {
        let page = parse_page(ONE_ENTRY).unwrap();
        assert_eq!(page.raw_count, 1);
        assert_eq!(page.skipped, 0);
        let e = &page.entries[0];
        assert_eq!(e.short_id(), "2401.01234v1");
        assert_eq!(
            e.updated_date(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert_eq!(e.title, "Characters of\n  finite groups & more");
        assert_eq!(e.summary, "We compute things.");
        assert_eq!(e.authors, vec!["Ada Lovelace", "Emmy Noether"]);
        assert_eq!(e.field_values("category"), ["math.RT", "math.GR"]);
        assert_eq!(e.field_values("primary_category"), ["math.RT"]);
        assert_eq!(e.field_values("comment"), ["12 pages"]);
        assert_eq!(e.field_values("author").len(), 2);
        assert!(e.field_values("author")[0].contains("Analytical Engines"));
        // feed-level <updated> is not mistaken for an entry field
        assert_eq!(e.field_values("updated"), ["2024-01-05T18:00:01Z"]);
    }

    #[test]
    fn malformed_date_is_skipped_but_counted() {
        let xml = r#"<feed>
  <entry><id>http://arxiv.org/abs/1</id><updated>yesterday</updated><title>a</title></entry>
  <entry><id>http://arxiv.org/abs/2</id><updated>2024-01-02T00:00:00Z</updated><title>b</title></entry>
</feed>"#;
        let page = parse_page(xml).unwrap();
        assert_eq!(page.raw_count, 2);
        assert_eq!(page.skipped, 1);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].title, "b");
    }

    #[test]
    fn empty_feed_is_empty_page() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;
        let page = parse_page(xml).unwrap();
        assert!(page.is_empty());
        assert!(page.entries.is_empty());
    }

    #[test]
    fn api_error_entry_is_fatal() {
        let xml = r#"<feed><entry>
  <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234</id>
  <updated>2024-01-02T00:00:00-05:00</updated>
  <title>Error</title>
  <summary>incorrect id format for 1234</summary>
</entry></feed>"#;
        let err = parse_page(xml).unwrap_err();
        assert!(err.to_string().contains("incorrect id format"));
    }

    #[test]
    fn updated_format_is_strict() {
        assert!(parse_updated("2024-01-02T03:04:05Z").is_some());
        assert!(parse_updated(" 2024-01-02T03:04:05Z\n").is_some());
        assert!(parse_updated("2024-01-02").is_none());
    }
}
