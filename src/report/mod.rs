// src/report/mod.rs
//! Static HTML digest over a `FlagTable`, grouped by entry or by filter.

use chrono::NaiveDate;
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write as _;
use std::str::FromStr;

use crate::entry::Entry;
use crate::fetch::FetchWindow;
use crate::filter::FlagTable;

const THEME_CSS: &str = include_str!("theme.css");
const MATHJAX_SRC: &str = "https://cdnjs.cloudflare.com/ajax/libs/mathjax/3.2.0/es5/tex-mml-chtml.js";
const NO_ENTRIES: &str = "No new entries";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayBy {
    Entries,
    Filters,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("the display type {0:?} is not supported (expected \"entries\" or \"filters\")")]
    UnsupportedGroupingMode(String),
}

impl FromStr for DisplayBy {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entries" => Ok(Self::Entries),
            "filters" => Ok(Self::Filters),
            _ => Err(ReportError::UnsupportedGroupingMode(s.to_string())),
        }
    }
}

/// What the header box shows.
#[derive(Debug, Clone)]
pub struct ReportHeader<'a> {
    pub categories: &'a [String],
    pub window: FetchWindow,
    /// Set when the fetch stopped early; entries older than this date may be missing.
    pub partial_boundary: Option<NaiveDate>,
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_head(out: &mut String) {
    out.push_str("<head>");
    out.push_str("<meta charset=\"UTF-8\" />");
    out.push_str(
        "<script type=\"text/javascript\">\n        MathJax = {\n            tex: {\n                \
         inlineMath: [['$', '$']]\n            }\n        };\n        </script>",
    );
    let _ = write!(out, "<script src=\"{MATHJAX_SRC}\"></script>");
    out.push_str("<style>");
    out.push_str(THEME_CSS);
    out.push_str("</style>");
    out.push_str("<title>arXiv Results</title>");
    out.push_str("</head>");
}

fn push_header(out: &mut String, header: &ReportHeader<'_>) {
    let _ = write!(
        out,
        "<div class=\"headerbox\"><div class=\"header\">arXiv Results</div>\
         <div class=\"subheader\">{}: {} - {}</div></div>",
        encode_text(&header.categories.join(", ")),
        header.window.start_date().format("%d.%m.%Y"),
        header.window.end_date().format("%d.%m.%Y"),
    );
    if let Some(boundary) = header.partial_boundary {
        let _ = write!(
            out,
            "<div class=\"partial\">Fetching stopped early: entries updated before {} may be missing.</div>",
            boundary.format("%d.%m.%Y")
        );
    }
}

fn push_entry<S: AsRef<str>>(out: &mut String, entry: &Entry, keywords: &[S]) {
    let _ = write!(
        out,
        "<div class=\"latex-content\"><h3><a href=\"{}\" target=\"_blank\">{}</a></h3></div>",
        encode_double_quoted_attribute(entry.url()),
        encode_text(&collapse_ws(&entry.title)),
    );
    let _ = write!(out, "<p>{}</p>", encode_text(&entry.authors_string()));
    out.push_str("<p><strong>Abstract:</strong></p>");
    let _ = write!(
        out,
        "<div class=\"latex-content\"><p>{}</p></div>",
        encode_text(&collapse_ws(&entry.summary))
    );
    let joined = keywords
        .iter()
        .map(|k| k.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = write!(
        out,
        "<p><strong>Keywords: </strong><em>{}</em></p>",
        encode_text(&joined)
    );
}

fn push_by_entries(out: &mut String, table: &FlagTable) {
    for row in table.by_entry() {
        let labels: Vec<String> = row.columns.iter().map(|c| c.label()).collect();
        push_entry(out, row.entry, labels.as_slice());
    }
}

fn push_by_filters(out: &mut String, table: &FlagTable) {
    for group in table.by_filter() {
        let _ = write!(out, "<h2>{}</h2>", encode_text(group.filter));
        if group.is_empty() {
            let _ = write!(out, "<div class=\"italicolor\">{NO_ENTRIES}</div>");
            continue;
        }
        for (entry, keywords) in &group.entries {
            push_entry(out, entry, keywords.as_slice());
        }
    }
}

/// Render the complete HTML document.
pub fn render_html(table: &FlagTable, header: &ReportHeader<'_>, by: DisplayBy) -> String {
    let mut out = String::with_capacity(16 * 1024);
    out.push_str("<!DOCTYPE html><html>");
    push_head(&mut out);
    out.push_str("<body>");
    push_header(&mut out, header);
    out.push_str("<div class=\"text\">");
    match by {
        DisplayBy::Entries => push_by_entries(&mut out, table),
        DisplayBy::Filters => push_by_filters(&mut out, table),
    }
    out.push_str("</div></body></html>");
    out
}
