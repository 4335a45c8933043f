// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod entry;
pub mod feed;
pub mod fetch;
pub mod filter;
pub mod report;
pub mod run;

// ---- Re-exports for stable public API ----
pub use crate::entry::Entry;
pub use crate::fetch::source::{ArxivClient, PageSource, Sleeper, TokioSleeper};
pub use crate::fetch::{fetch_entries, Coverage, FetchError, FetchOutcome, FetchPolicy, FetchWindow};
pub use crate::filter::{tag, FilterSpec, FlagTable};
pub use crate::report::{render_html, DisplayBy, ReportError};
pub use crate::run::{Run, RunReport};
