//! arxiv-watch — binary entrypoint.
//! Loads the run config, fetches the window, writes the HTML digest and opens it.

use anyhow::Result;
use arxiv_watch::config::{load_config_from, resolve_config_path};
use arxiv_watch::run::open_in_viewer;
use arxiv_watch::{ArxivClient, Run, TokioSleeper};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tag newly updated arXiv entries against keyword filters", long_about = None)]
struct Args {
    /// Run config (TOML or JSON). Falls back to $ARXIV_WATCH_CONFIG, then config/arxiv_watch.toml.
    config: Option<PathBuf>,

    /// Do not open the report after writing it.
    #[arg(long, default_value_t = false)]
    no_open: bool,

    /// Emit JSON log lines instead of the compact format.
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arxiv_watch=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env in local setups; ARXIV_WATCH_CONFIG / RUST_LOG may live there.
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.log_json);

    let path = resolve_config_path(args.config)?;
    let cfg = load_config_from(&path)?;
    let open_result = cfg.run.open_result && !args.no_open;
    let client = ArxivClient::new().with_timeout(cfg.run.request_timeout_secs);

    let run = Run::new(cfg)?;
    let report = run
        .execute(&client, &TokioSleeper, Local::now().date_naive())
        .await?;

    if report.partial {
        tracing::warn!(
            run_id = %report.run_id,
            "window not fully covered; report marks the missing range"
        );
    }
    tracing::info!(
        run_id = %report.run_id,
        entries = report.entries,
        matched = report.matched_entries,
        path = %report.output_path.display(),
        "saving and opening results"
    );

    if open_result {
        open_in_viewer(&report.output_path);
    }
    Ok(())
}
