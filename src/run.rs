// src/run.rs
//! One end-to-end run: timeframe -> fetch -> tag -> render -> save (-> open).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Days, Local, NaiveDate, TimeZone};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::Instrument;

use crate::config::RunConfig;
use crate::fetch::source::{PageSource, Sleeper};
use crate::fetch::{fetch_entries, Coverage, FetchWindow};
use crate::filter::tag;
use crate::report::{render_html, DisplayBy, ReportHeader};

static RE_RUN_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}_(\d{4}-\d{2}-\d{2})").expect("run file regex"));

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub window: FetchWindow,
    pub output_path: PathBuf,
    pub entries: usize,
    pub matched_entries: usize,
    pub partial: bool,
}

pub struct Run {
    cfg: RunConfig,
    run_id: String,
    display_by: DisplayBy,
}

/// `YYYYmmddHHMMSS` followed by hundredths of a second, zero-padded.
pub fn generate_run_id<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}{:02}",
        now.format("%Y%m%d%H%M%S"),
        now.timestamp_subsec_micros() / 10_000
    )
}

/// `entries_<run_id>__<start>_<end>.html`
pub fn output_file_name(run_id: &str, window: &FetchWindow) -> String {
    format!(
        "entries_{}__{}_{}.html",
        run_id,
        window.start_date().format("%Y-%m-%d"),
        window.end_date().format("%Y-%m-%d")
    )
}

/// Latest end date among previous run files in `folder`, if any.
pub fn latest_run_end_date(folder: &Path) -> Result<Option<NaiveDate>> {
    let mut latest: Option<NaiveDate> = None;
    let dir = fs::read_dir(folder)
        .with_context(|| format!("listing output folder {}", folder.display()))?;
    for item in dir.flatten() {
        let path = item.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("entries_") {
            continue;
        }
        let Some(caps) = RE_RUN_FILE.captures(name) else {
            tracing::warn!(target: "run", file = name, "run file without date range, ignored");
            continue;
        };
        if let Ok(d) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") {
            latest = Some(latest.map_or(d, |l| l.max(d)));
        }
    }
    Ok(latest)
}

/// Hand the report to the platform's default viewer. Failures only warn.
pub fn open_in_viewer(path: &Path) {
    let mut cmd = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        Command::new("xdg-open")
    };
    match cmd.arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!(target: "run", %status, path = %path.display(), "open command failed")
        }
        Err(e) => {
            tracing::warn!(target: "run", error = %e, path = %path.display(), "cannot run open command")
        }
    }
}

impl Run {
    /// Prepare a run: validates the display mode and creates the output folder.
    pub fn new(cfg: RunConfig) -> Result<Self> {
        Self::with_run_id(cfg, generate_run_id(&Local::now()))
    }

    pub fn with_run_id(cfg: RunConfig, run_id: String) -> Result<Self> {
        let display_by: DisplayBy = cfg.run.display_by.parse()?;
        fs::create_dir_all(&cfg.run.output_folder).with_context(|| {
            format!(
                "creating output folder {}",
                cfg.run.output_folder.display()
            )
        })?;
        Ok(Self {
            cfg,
            run_id,
            display_by,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// `[today - days_to_fetch, today]`, or with `only_new_days` starting one
    /// day before the last recorded run end.
    pub fn timeframe(&self, today: NaiveDate) -> Result<FetchWindow> {
        let end = today;
        let days = self.cfg.data.days_to_fetch;
        let mut start = end.checked_sub_days(Days::new(days.into())).ok_or_else(|| {
            anyhow!("data.days_to_fetch = {days} reaches before the earliest representable date")
        })?;

        if self.cfg.data.only_new_days {
            if let Some(last_end) = latest_run_end_date(&self.cfg.run.output_folder)? {
                start = last_end
                    .checked_sub_days(Days::new(1))
                    .unwrap_or(last_end)
                    .min(end);
                tracing::info!(target: "run", %last_end, %start, "continuing from previous run");
            }
        }

        Ok(FetchWindow::new(start, end)?)
    }

    /// Execute the run inside a span tagged with the run id.
    pub async fn execute(
        &self,
        source: &dyn PageSource,
        sleeper: &dyn Sleeper,
        today: NaiveDate,
    ) -> Result<RunReport> {
        let span = tracing::info_span!("run", run_id = %self.run_id);
        self.execute_inner(source, sleeper, today)
            .instrument(span)
            .await
    }

    async fn execute_inner(
        &self,
        source: &dyn PageSource,
        sleeper: &dyn Sleeper,
        today: NaiveDate,
    ) -> Result<RunReport> {
        let window = self.timeframe(today)?;

        tracing::info!(
            target: "run",
            start = %window.start_date(),
            end = %window.end_date(),
            categories = ?self.cfg.data.categories,
            "fetching all relevant entries"
        );
        let outcome = fetch_entries(
            source,
            sleeper,
            &window,
            &self.cfg.data.categories,
            &self.cfg.fetch_policy(),
        )
        .await
        .context("fetching entries")?;

        tracing::info!(target: "run", entries = outcome.entries.len(), "filtering and formatting entries");
        let partial_boundary = match outcome.coverage {
            Coverage::Complete => None,
            Coverage::Partial { boundary } => Some(boundary),
        };
        let entries = outcome.entries.len();
        let table = tag(outcome.entries, &self.cfg.filters);
        let hits = table.triples().filter(|(_, _, flag)| *flag).count();
        counter!("filter_flags_true_total").increment(hits as u64);
        let matched_entries = table.by_entry().len();
        tracing::debug!(
            target: "filter",
            entries,
            columns = table.columns().len(),
            hits,
            "tagging done"
        );

        let header = ReportHeader {
            categories: &self.cfg.data.categories,
            window,
            partial_boundary,
        };
        let html = render_html(&table, &header, self.display_by);

        let output_path = self
            .cfg
            .run
            .output_folder
            .join(output_file_name(&self.run_id, &window));
        fs::write(&output_path, html)
            .with_context(|| format!("writing report {}", output_path.display()))?;
        tracing::info!(target: "run", path = %output_path.display(), matched_entries, "report saved");

        Ok(RunReport {
            run_id: self.run_id.clone(),
            window,
            output_path,
            entries,
            matched_entries,
            partial: partial_boundary.is_some(),
        })
    }
}
