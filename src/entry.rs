// src/entry.rs
//! Publication record extracted once from the Atom feed.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// A single arXiv entry. Immutable after the feed parser builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub updated: DateTime<Utc>,
    /// Every direct child of `<entry>`, keyed by local element name.
    /// Repeated elements (author, category, link) keep document order.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Build an entry from its essential attributes; the field map is seeded
    /// with `id`, `title`, `summary`, `author` and `updated`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        authors: Vec<String>,
        updated: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        let title = title.into();
        let summary = summary.into();

        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), vec![id.clone()]);
        fields.insert("title".to_string(), vec![title.clone()]);
        fields.insert("summary".to_string(), vec![summary.clone()]);
        fields.insert("author".to_string(), authors.clone());
        fields.insert(
            "updated".to_string(),
            vec![updated.format("%Y-%m-%dT%H:%M:%SZ").to_string()],
        );

        Self {
            id,
            title,
            summary,
            authors,
            updated,
            fields,
        }
    }

    /// Append an extra raw field value (e.g. a category term).
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields
            .entry(name.to_string())
            .or_default()
            .push(value.into());
        self
    }

    /// All text values recorded for `name`; empty when the entry lacks it.
    pub fn field_values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn updated_date(&self) -> NaiveDate {
        self.updated.date_naive()
    }

    /// `http://arxiv.org/abs/2401.00001v1` -> `2401.00001v1`
    pub fn short_id(&self) -> &str {
        self.id.trim().rsplit('/').next().unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.id.trim_matches('\n')
    }

    pub fn authors_string(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.trim_matches(|c| c == ' ' || c == '\n'))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Entry {
        Entry::new(
            "http://arxiv.org/abs/2401.00001v2\n",
            "On characters",
            "We study things.",
            vec![" Ada Lovelace\n".into(), "Emmy Noether".into()],
            Utc.with_ymd_and_hms(2024, 1, 3, 17, 59, 0).unwrap(),
        )
        .with_field("category", "math.RT")
        .with_field("category", "math.CO")
    }

    #[test]
    fn derived_helpers() {
        let e = sample();
        assert_eq!(e.short_id(), "2401.00001v2");
        assert_eq!(e.url(), "http://arxiv.org/abs/2401.00001v2");
        assert_eq!(e.authors_string(), "Ada Lovelace, Emmy Noether");
        assert_eq!(
            e.updated_date(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()
        );
    }

    #[test]
    fn field_lookup_keeps_order_and_tolerates_missing() {
        let e = sample();
        assert_eq!(e.field_values("category"), ["math.RT", "math.CO"]);
        assert_eq!(e.field_values("title"), ["On characters"]);
        assert!(e.field_values("comment").is_empty());
    }
}
