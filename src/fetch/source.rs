// src/fetch/source.rs
//! Page transport and pacing seams for the fetch loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::entry::Entry;
use crate::feed::{parse_page, Page};

pub const ARXIV_QUERY_URL: &str = "http://export.arxiv.org/api/query";
pub const PAGE_SIZE: usize = 200;

/// Parameters of a single page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub search_query: String,
    pub start: usize,
    pub max_results: usize,
}

impl PageQuery {
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("search_query", self.search_query.clone()),
            ("start", self.start.to_string()),
            ("max_results", self.max_results.to_string()),
            ("sortBy", "lastUpdatedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ]
    }
}

/// `["math.RT", "math.CO"]` -> `cat:math.RT OR cat:math.CO`
pub fn category_query<S: AsRef<str>>(categories: &[S]) -> String {
    categories
        .iter()
        .map(|c| format!("cat:{}", c.as_ref().trim()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, d: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, d: Duration) {
        tokio::time::sleep(d).await;
    }
}

/// Live arXiv export API client.
#[derive(Clone)]
pub struct ArxivClient {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ArxivClient {
    pub fn new() -> Self {
        Self {
            url: ARXIV_QUERY_URL.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for ArxivClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageSource for ArxivClient {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        let rsp = self
            .client
            .get(&self.url)
            .query(&query.params())
            .timeout(self.timeout)
            .send()
            .await
            .context("arxiv http get()")?
            .error_for_status()
            .context("arxiv http status")?;
        let body = rsp.text().await.context("arxiv http .text()")?;
        parse_page(&body).with_context(|| format!("parsing arxiv page at start={}", query.start))
    }

    fn name(&self) -> &'static str {
        "arxiv"
    }
}

// --- Test helpers ---

/// Replays a fixed sequence of pages and records every query it receives.
/// Once the script runs out, every further request gets an empty page.
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Result<Page, String>>>,
    pub queries: Mutex<Vec<PageQuery>>,
}

fn page_of(entries: Vec<Entry>) -> Page {
    Page {
        raw_count: entries.len(),
        entries,
        skipped: 0,
    }
}

impl ScriptedSource {
    pub fn new(pages: Vec<Vec<Entry>>) -> Self {
        Self::with_pages(pages.into_iter().map(page_of).collect())
    }

    /// Script whole pages, e.g. parsed feeds whose `raw_count` includes
    /// skipped entries.
    pub fn with_pages(pages: Vec<Page>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(Ok).collect()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Script with request failures interleaved (`Err(message)`).
    pub fn with_failures(pages: Vec<Result<Vec<Entry>, String>>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(|p| p.map(page_of)).collect()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn starts(&self) -> Vec<usize> {
        self.queries.lock().unwrap().iter().map(|q| q.start).collect()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Page> {
        self.queries.lock().unwrap().push(query.clone());
        match self.pages.lock().unwrap().pop_front() {
            Some(Ok(page)) => Ok(page),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Ok(Page::default()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Records requested sleeps instead of waiting.
#[derive(Default)]
pub struct RecordingSleeper {
    pub calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, d: Duration) {
        self.calls.lock().unwrap().push(d);
    }
}
