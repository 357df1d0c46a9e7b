use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::Path;
use tracing::{error, info, warn};

use shift_analytics::analytics::{run, EngineOptions, IssueKind, RunContext};
use shift_analytics::config::Config;
use shift_analytics::db::Database;
use shift_analytics::ingest::{load_shift_log, IngestError, ShiftLog};

fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    if config.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()
            .context("failed to size the worker pool")?;
    }

    let started_at = Utc::now();
    let log = match load_shift_log(Path::new(&config.input)) {
        Ok(log) => log,
        Err(IngestError::MissingInputTable { path }) => {
            warn!("No shift participation log at {}; derived tables will be empty", path);
            ShiftLog::default()
        }
        Err(e) => return Err(e.into()),
    };

    let ctx = RunContext::from_log(log);
    let output = run(
        &ctx,
        &EngineOptions {
            parallel: !config.sequential,
        },
    );
    drop(ctx);

    if output.report.rows_skipped > 0 {
        warn!("{} malformed input row(s) were skipped", output.report.rows_skipped);
    }
    for issue in &output.report.issues {
        match issue.kind {
            IssueKind::Skipped => error!(
                "Partition {} ({}) skipped: {}",
                issue.game_id, issue.venue, issue.detail
            ),
            _ => warn!(
                "Partition {} ({}) {:?}: {}",
                issue.game_id, issue.venue, issue.kind, issue.detail
            ),
        }
    }

    if let Some(path) = &config.json_output {
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path))?;
        info!("JSON output written to {}", path);
    }

    if config.dry_run {
        info!("🟡 DRY RUN – SQLite warehouse left untouched");
        return Ok(());
    }

    let db = Database::open(&config.database_path)?;
    if let Some(prev) = db.list_runs(1)?.first() {
        info!(
            "Replacing run {} from {} ({} records in, {} h2h rows)",
            prev.id, prev.finished_at, prev.records_in, prev.h2h_rows
        );
    }
    let run_id = db.replace_derived_tables(&output, started_at)?;
    let counts = db.table_counts()?;
    info!(
        "Run {} stored in {}: {} h2h, {} wowy, {} line combos, {} shift scores, {} summaries",
        run_id,
        config.database_path,
        counts.h2h,
        counts.wowy,
        counts.line_combos,
        counts.shift_quality,
        counts.shift_quality_summary
    );

    Ok(())
}
