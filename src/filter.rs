// src/filter.rs
//! Keyword tagging: every (entry, filter, keyword) gets exactly one flag.
//!
//! Matching is case-folded substring containment against the trimmed text of
//! the filter's fields, OR-ed across fields. "gan" matches "organic".

use serde::Deserialize;

use crate::entry::Entry;

/// A named keyword rule loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub keywords: Vec<String>,
}

/// One flag column: a keyword under a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlagColumn {
    pub filter: String,
    pub keyword: String,
}

impl FlagColumn {
    /// `rep-theory: character`
    pub fn label(&self) -> String {
        format!("{}: {}", self.filter, self.keyword)
    }
}

/// Complete (entry, filter, keyword) -> bool relation.
///
/// Rows follow entry order, columns follow filter order then keyword order.
/// `rows[i][j]` is the flag of entry `i` for column `j`.
#[derive(Debug, Clone)]
pub struct FlagTable {
    entries: Vec<Entry>,
    filters: Vec<String>,
    columns: Vec<FlagColumn>,
    rows: Vec<Vec<bool>>,
}

/// By-entry projection row.
#[derive(Debug)]
pub struct EntryMatches<'a> {
    pub entry: &'a Entry,
    pub columns: Vec<&'a FlagColumn>,
}

/// By-filter projection group. `entries` is empty when nothing matched.
#[derive(Debug)]
pub struct FilterMatches<'a> {
    pub filter: &'a str,
    pub entries: Vec<(&'a Entry, Vec<&'a str>)>,
}

impl FilterMatches<'_> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FlagTable {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn columns(&self) -> &[FlagColumn] {
        &self.columns
    }

    pub fn filter_names(&self) -> &[String] {
        &self.filters
    }

    /// Flag for entry `id`, or `None` if the entry or column is unknown.
    pub fn get(&self, entry_id: &str, filter: &str, keyword: &str) -> Option<bool> {
        let row = self.entries.iter().position(|e| e.id == entry_id)?;
        let col = self
            .columns
            .iter()
            .position(|c| c.filter == filter && c.keyword == keyword)?;
        Some(self.rows[row][col])
    }

    pub fn count(&self, filter: &str, keyword: &str, value: bool) -> usize {
        let Some(col) = self
            .columns
            .iter()
            .position(|c| c.filter == filter && c.keyword == keyword)
        else {
            return 0;
        };
        self.rows.iter().filter(|r| r[col] == value).count()
    }

    /// Every (entry id, column, flag) triple; order follows rows then columns.
    pub fn triples(&self) -> impl Iterator<Item = (&str, &FlagColumn, bool)> + '_ {
        self.entries.iter().zip(&self.rows).flat_map(move |(e, row)| {
            self.columns
                .iter()
                .zip(row)
                .map(move |(c, &flag)| (e.id.as_str(), c, flag))
        })
    }

    /// Entries with at least one true flag, each with its true columns.
    pub fn by_entry(&self) -> Vec<EntryMatches<'_>> {
        self.entries
            .iter()
            .zip(&self.rows)
            .filter_map(|(entry, row)| {
                let columns: Vec<&FlagColumn> = self
                    .columns
                    .iter()
                    .zip(row)
                    .filter(|(_, &flag)| flag)
                    .map(|(c, _)| c)
                    .collect();
                (!columns.is_empty()).then_some(EntryMatches { entry, columns })
            })
            .collect()
    }

    /// Filters in configured order, each with the entries that hit at least
    /// one of its keywords.
    pub fn by_filter(&self) -> Vec<FilterMatches<'_>> {
        self.filters
            .iter()
            .map(|filter| {
                let cols: Vec<usize> = self
                    .columns
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| &c.filter == filter)
                    .map(|(j, _)| j)
                    .collect();
                let entries = self
                    .entries
                    .iter()
                    .zip(&self.rows)
                    .filter_map(|(entry, row)| {
                        let kws: Vec<&str> = cols
                            .iter()
                            .filter(|&&j| row[j])
                            .map(|&j| self.columns[j].keyword.as_str())
                            .collect();
                        (!kws.is_empty()).then_some((entry, kws))
                    })
                    .collect();
                FilterMatches {
                    filter: filter.as_str(),
                    entries,
                }
            })
            .collect()
    }
}

fn clean(s: &str) -> String {
    s.trim().to_lowercase()
}

/// True iff `keyword` occurs in any value of any of `fields`.
pub fn contains_keyword_in_fields<S: AsRef<str>>(entry: &Entry, fields: &[S], keyword: &str) -> bool {
    let needle = keyword.to_lowercase();
    fields.iter().any(|f| {
        entry
            .field_values(f.as_ref())
            .iter()
            .any(|v| clean(v).contains(&needle))
    })
}

/// Tag `entries` against `filters`. Pure; the returned table owns the entries.
pub fn tag(entries: Vec<Entry>, filters: &[FilterSpec]) -> FlagTable {
    let mut filter_names = Vec::with_capacity(filters.len());
    let mut columns = Vec::new();
    // index into `filters` for each column
    let mut owners = Vec::new();
    for (i, f) in filters.iter().enumerate() {
        filter_names.push(f.name.clone());
        for kw in &f.keywords {
            let col = FlagColumn {
                filter: f.name.clone(),
                keyword: kw.clone(),
            };
            if !columns.contains(&col) {
                columns.push(col);
                owners.push(i);
            }
        }
    }

    let rows: Vec<Vec<bool>> = entries
        .iter()
        .map(|entry| {
            columns
                .iter()
                .zip(&owners)
                .map(|(col, &i)| contains_keyword_in_fields(entry, &filters[i].fields, &col.keyword))
                .collect()
        })
        .collect();

    FlagTable {
        entries,
        filters: filter_names,
        columns,
        rows,
    }
}
