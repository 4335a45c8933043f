// tests/filter_tagging.rs
use arxiv_watch::filter::{tag, FilterSpec};
use arxiv_watch::Entry;
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;

fn entry(id: &str, title: &str, summary: &str, cats: &[&str]) -> Entry {
    let mut e = Entry::new(
        id,
        title,
        summary,
        vec!["Some Author".into()],
        Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
    );
    for c in cats {
        e = e.with_field("category", *c);
    }
    e
}

fn spec(name: &str, fields: &[&str], keywords: &[&str]) -> FilterSpec {
    FilterSpec {
        name: name.into(),
        fields: fields.iter().map(|s| s.to_string()).collect(),
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
    }
}

fn corpus() -> Vec<Entry> {
    vec![
        entry("a", "Hall algebras of quivers", "Ringel-Hall.", &["math.RT"]),
        entry("b", "  Organic   GROUPS \n", "nothing", &["math.GR"]),
        entry("c", "Graph colouring", "Chromatic polynomials of graphs.", &["math.CO"]),
    ]
}

fn filters() -> Vec<FilterSpec> {
    vec![
        spec("algebra", &["title", "summary"], &["quiver", "group", "gan"]),
        spec("combinatorics", &["summary"], &["graph", "hall"]),
        spec("by-category", &["category"], &["math.co"]),
    ]
}

type Triple = (String, String, String, bool);

fn content(entries: Vec<Entry>, filters: &[FilterSpec]) -> BTreeSet<Triple> {
    let table = tag(entries, filters);
    let triples: BTreeSet<Triple> = table
        .triples()
        .map(|(id, c, flag)| (id.to_string(), c.filter.clone(), c.keyword.clone(), flag))
        .collect();
    triples
}

#[test]
fn flags_follow_substring_semantics() {
    let table = tag(corpus(), &filters());

    assert_eq!(table.get("a", "algebra", "quiver"), Some(true));
    assert_eq!(table.get("b", "algebra", "group"), Some(true));
    // substring, not word match
    assert_eq!(table.get("b", "algebra", "gan"), Some(true));
    assert_eq!(table.get("c", "algebra", "quiver"), Some(false));

    // only the summary is searched by this filter
    assert_eq!(table.get("a", "combinatorics", "hall"), Some(true));
    assert_eq!(table.get("c", "combinatorics", "graph"), Some(true));
    assert_eq!(table.get("a", "combinatorics", "graph"), Some(false));

    // raw extra fields are searchable by name
    assert_eq!(table.get("c", "by-category", "math.co"), Some(true));
    assert_eq!(table.get("a", "by-category", "math.co"), Some(false));
}

#[test]
fn table_is_complete() {
    let table = tag(corpus(), &filters());
    let columns = filters().iter().map(|f| f.keywords.len()).sum::<usize>();
    assert_eq!(table.columns().len(), columns);
    assert_eq!(table.triples().count(), 3 * columns);
}

#[test]
fn filter_order_does_not_change_flags() {
    let forward = content(corpus(), &filters());

    let mut reversed = filters();
    reversed.reverse();
    for f in &mut reversed {
        f.keywords.reverse();
    }
    let mut entries = corpus();
    entries.reverse();
    let backward = content(entries, &reversed);

    assert_eq!(forward, backward);
}

#[test]
fn keyword_is_case_folded_but_not_trimmed_away() {
    let entries = vec![entry("x", "  groups \n", "", &[])];
    let table = tag(entries, &[spec("f", &["title"], &["Group"])]);
    assert_eq!(table.get("x", "f", "Group"), Some(true));
}

#[test]
fn filter_without_keywords_still_reported_as_empty_group() {
    let table = tag(corpus(), &[spec("empty", &["title"], &[])]);
    assert!(table.columns().is_empty());
    let groups = table.by_filter();
    assert_eq!(groups.len(), 1);
    assert!(groups[0].is_empty());
    assert!(table.by_entry().is_empty());
}
