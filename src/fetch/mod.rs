// src/fetch/mod.rs
//! Backward pagination over the arXiv listing with empty-page retry.
//!
//! Pages are requested newest-first. After every non-empty page the boundary
//! date drops to the oldest `updated` date seen; the walk ends once the
//! boundary is older than the window start, or when the retry budget for
//! empty pages runs out.

pub mod source;

use chrono::NaiveDate;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::entry::Entry;
use crate::fetch::source::{category_query, PageQuery, PageSource, Sleeper, PAGE_SIZE};
use crate::feed::Page;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("fetch_pages_total", "Non-empty result pages received.");
        describe_counter!(
            "fetch_empty_pages_total",
            "Result pages that came back without entries."
        );
        describe_counter!(
            "fetch_retries_total",
            "Backoff retries issued after an empty page."
        );
        describe_counter!(
            "feed_entries_skipped_total",
            "Feed entries dropped for a malformed id or updated field."
        );
        describe_counter!(
            "filter_flags_true_total",
            "(entry, filter, keyword) flags that came out true."
        );
    });
}

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl FetchWindow {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, FetchError> {
        if start_date > end_date {
            return Err(FetchError::InvalidWindow {
                start: start_date,
                end: end_date,
            });
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryExhaustedPolicy {
    /// Log a warning and return what was collected, marked partial.
    #[default]
    Partial,
    /// Surface `FetchError::Exhausted`.
    Fail,
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub max_retries: u32,
    /// Retry `n` sleeps `backoff_unit * n`.
    pub backoff_unit: Duration,
    /// Floor between consecutive successful requests.
    pub min_request_interval: Duration,
    pub on_retry_exhausted: RetryExhaustedPolicy,
    /// Count request failures against the empty-page budget instead of
    /// aborting.
    pub retry_request_errors: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(3),
            min_request_interval: Duration::from_secs(4),
            on_retry_exhausted: RetryExhaustedPolicy::Partial,
            retry_request_errors: false,
        }
    }
}

/// Retry budget and boundary tracking for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    max_retries: u32,
    attempts_remaining: u32,
    current_boundary_date: NaiveDate,
}

impl RetryState {
    pub fn new(max_retries: u32, end_date: NaiveDate) -> Self {
        Self {
            max_retries,
            attempts_remaining: max_retries,
            current_boundary_date: end_date,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn current_boundary_date(&self) -> NaiveDate {
        self.current_boundary_date
    }

    /// Consume one retry. Returns the 1-based retry number, or `None` when the
    /// budget is spent.
    pub fn on_empty(&mut self) -> Option<u32> {
        if self.attempts_remaining == 0 {
            return None;
        }
        self.attempts_remaining -= 1;
        Some(self.max_retries - self.attempts_remaining)
    }

    /// Record a non-empty page whose oldest entry is dated `page_min`.
    pub fn on_page(&mut self, page_min: Option<NaiveDate>) {
        if let Some(d) = page_min {
            self.current_boundary_date = self.current_boundary_date.min(d);
        }
        self.attempts_remaining = self.max_retries;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Complete,
    /// Retries ran out before the window start was reached; entries older
    /// than `boundary` may be missing.
    Partial { boundary: NaiveDate },
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// In-window entries, newest first.
    pub entries: Vec<Entry>,
    pub coverage: Coverage,
    pub pages: usize,
    pub retries: u32,
    pub skipped: usize,
    /// Boundary date after each non-empty page.
    pub boundary_history: Vec<NaiveDate>,
    pub final_state: RetryState,
}

impl FetchOutcome {
    pub fn is_partial(&self) -> bool {
        matches!(self.coverage, Coverage::Partial { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch window start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
    #[error(
        "retries exhausted after {retries} empty pages; reached {boundary}, \
         {collected} entries collected"
    )]
    Exhausted {
        retries: u32,
        boundary: NaiveDate,
        collected: usize,
    },
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

/// Fetch every entry updated inside `window` for the given categories.
pub async fn fetch_entries(
    source: &dyn PageSource,
    sleeper: &dyn Sleeper,
    window: &FetchWindow,
    categories: &[String],
    policy: &FetchPolicy,
) -> Result<FetchOutcome, FetchError> {
    ensure_metrics_described();

    let search_query = category_query(categories);
    let mut state = RetryState::new(policy.max_retries, window.end_date());
    let mut collected: Vec<Entry> = Vec::new();
    let mut offset = 0usize;
    let mut pages = 0usize;
    let mut retries = 0u32;
    let mut skipped = 0usize;
    let mut boundary_history = Vec::new();
    let mut coverage = Coverage::Complete;

    while window.start_date() <= state.current_boundary_date() {
        let query = PageQuery {
            search_query: search_query.clone(),
            start: offset,
            max_results: PAGE_SIZE,
        };

        let started = Instant::now();
        let page = match source.fetch_page(&query).await {
            Ok(page) => page,
            Err(e) if policy.retry_request_errors => {
                tracing::warn!(
                    target: "fetch",
                    error = %format!("{e:#}"),
                    provider = source.name(),
                    start = offset,
                    "request failed, counting as empty page"
                );
                Page::default()
            }
            Err(e) => return Err(FetchError::Request(e)),
        };

        if page.is_empty() {
            counter!("fetch_empty_pages_total").increment(1);
            match state.on_empty() {
                Some(retry) => {
                    let delay = policy.backoff_unit * retry;
                    tracing::warn!(
                        target: "fetch",
                        start = offset,
                        retry,
                        remaining = state.attempts_remaining(),
                        delay_ms = delay.as_millis() as u64,
                        "empty page, backing off"
                    );
                    counter!("fetch_retries_total").increment(1);
                    retries += 1;
                    sleeper.sleep(delay).await;
                    continue;
                }
                None => {
                    let boundary = state.current_boundary_date();
                    match policy.on_retry_exhausted {
                        RetryExhaustedPolicy::Fail => {
                            return Err(FetchError::Exhausted {
                                retries: policy.max_retries,
                                boundary,
                                collected: collected.len(),
                            });
                        }
                        RetryExhaustedPolicy::Partial => {
                            tracing::warn!(
                                target: "fetch",
                                search_query = %search_query,
                                start = offset,
                                %boundary,
                                window_start = %window.start_date(),
                                "retries exhausted, likely bad input or too frequent requests; \
                                 returning partial result"
                            );
                            coverage = Coverage::Partial { boundary };
                            break;
                        }
                    }
                }
            }
        }

        counter!("fetch_pages_total").increment(1);
        pages += 1;
        offset += page.raw_count;
        skipped += page.skipped;

        let page_min = page.entries.iter().map(Entry::updated_date).min();
        state.on_page(page_min);
        boundary_history.push(state.current_boundary_date());
        collected.extend(page.entries);

        tracing::info!(
            target: "fetch",
            page = pages,
            received = page.raw_count,
            total = collected.len(),
            boundary = %state.current_boundary_date(),
            "page fetched"
        );

        // Only pace when another request follows.
        if window.start_date() <= state.current_boundary_date() {
            let rest = policy.min_request_interval.saturating_sub(started.elapsed());
            if !rest.is_zero() {
                sleeper.sleep(rest).await;
            }
        }
    }

    let fetched = collected.len();
    let entries: Vec<Entry> = collected
        .into_iter()
        .filter(|e| window.contains(e.updated_date()))
        .collect();

    tracing::info!(
        target: "fetch",
        fetched,
        in_window = entries.len(),
        pages,
        retries,
        skipped,
        partial = matches!(coverage, Coverage::Partial { .. }),
        "fetch finished"
    );

    Ok(FetchOutcome {
        entries,
        coverage,
        pages,
        retries,
        skipped,
        boundary_history,
        final_state: state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(FetchWindow::new(d(2024, 1, 2), d(2024, 1, 1)).is_err());
        let w = FetchWindow::new(d(2024, 1, 1), d(2024, 1, 1)).unwrap();
        assert!(w.contains(d(2024, 1, 1)));
        assert!(!w.contains(d(2023, 12, 31)));
        assert!(!w.contains(d(2024, 1, 2)));
    }

    #[test]
    fn retry_budget_never_goes_negative() {
        let mut st = RetryState::new(2, d(2024, 1, 7));
        assert_eq!(st.on_empty(), Some(1));
        assert_eq!(st.on_empty(), Some(2));
        assert_eq!(st.on_empty(), None);
        assert_eq!(st.on_empty(), None);
        assert_eq!(st.attempts_remaining(), 0);
    }

    #[test]
    fn non_empty_page_resets_budget() {
        let mut st = RetryState::new(3, d(2024, 1, 7));
        st.on_empty();
        st.on_empty();
        assert_eq!(st.attempts_remaining(), 1);
        st.on_page(Some(d(2024, 1, 5)));
        assert_eq!(st.attempts_remaining(), 3);
        assert_eq!(st.current_boundary_date(), d(2024, 1, 5));
    }

    #[test]
    fn boundary_never_moves_forward() {
        let mut st = RetryState::new(1, d(2024, 1, 7));
        st.on_page(Some(d(2024, 1, 4)));
        st.on_page(Some(d(2024, 1, 6)));
        assert_eq!(st.current_boundary_date(), d(2024, 1, 4));
        st.on_page(None);
        assert_eq!(st.current_boundary_date(), d(2024, 1, 4));
    }

    #[test]
    fn zero_budget_exhausts_immediately() {
        let mut st = RetryState::new(0, d(2024, 1, 7));
        assert_eq!(st.on_empty(), None);
    }
}
