use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::consolidate::consolidate;
use super::context::{Partition, RunContext};
use super::error::{AnalyticsError, IssueKind, PartitionIssue};
use super::{h2h, line_combos, shift_quality, wowy};
use crate::db::models::{H2HPair, LineCombo, ShiftQualityRecord, ShiftQualitySummary, WowyPair};

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Fan partitions out over the rayon pool
    pub parallel: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions { parallel: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub records_in: usize,
    /// Input rows dropped by the loader before partitioning
    pub rows_skipped: usize,
    pub partitions_total: usize,
    pub partitions_processed: usize,
    /// Skipped, degraded or recovered partitions
    pub issues: Vec<PartitionIssue>,
}

impl RunReport {
    pub fn skipped(&self) -> impl Iterator<Item = &PartitionIssue> {
        self.issues.iter().filter(|i| i.kind == IssueKind::Skipped)
    }
}

/// Every derived table for one run, each sorted by its string key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    pub h2h: Vec<H2HPair>,
    pub wowy: Vec<WowyPair>,
    pub line_combos: Vec<LineCombo>,
    pub shift_quality: Vec<ShiftQualityRecord>,
    pub shift_quality_summary: Vec<ShiftQualitySummary>,
    pub report: RunReport,
}

#[derive(Debug, Default)]
struct PartitionOutput {
    h2h: Vec<H2HPair>,
    wowy: Vec<WowyPair>,
    line_combos: Vec<LineCombo>,
    shift_quality: Vec<ShiftQualityRecord>,
    shift_quality_summary: Vec<ShiftQualitySummary>,
    issues: Vec<PartitionIssue>,
}

/// Consolidate, then H2H, then WOWY on top of H2H, then combos and quality.
fn process_partition(partition: &Partition<'_>) -> Result<PartitionOutput, AnalyticsError> {
    let game_id = partition.key.game_id.as_str();
    let venue = partition.key.venue;
    let consolidated = consolidate(partition)?;

    let mut issues = Vec::new();
    if consolidated.fallback_rows > 0 {
        issues.push(PartitionIssue::new(
            game_id,
            venue,
            IssueKind::DegradedGrouping,
            format!(
                "{} row(s) grouped on shift_index",
                consolidated.fallback_rows
            ),
        ));
    }
    if !consolidated.inconsistent_shifts.is_empty() {
        issues.push(PartitionIssue::new(
            game_id,
            venue,
            IssueKind::InconsistentCounters,
            format!("logical shifts {:?}", consolidated.inconsistent_shifts),
        ));
    }

    for e in &consolidated.dropped_durations {
        issues.push(PartitionIssue::recovered(game_id, venue, e));
    }

    let pairs = h2h::aggregate(&consolidated);
    let wowy = wowy::differentiate(&pairs, &consolidated);
    for v in &wowy.violations {
        issues.push(PartitionIssue::recovered(game_id, venue, v));
    }
    let line_combos = line_combos::aggregate(&consolidated);
    let quality = shift_quality::score(&consolidated);

    Ok(PartitionOutput {
        h2h: pairs.pairs.into_values().collect(),
        wowy: wowy.pairs,
        line_combos,
        shift_quality: quality.records,
        shift_quality_summary: quality.summaries,
        issues,
    })
}

/// Run the full engine over a shift log.
///
/// Partitions never see each other, so a failure in one game is reported and
/// the rest still come through.
pub fn run(ctx: &RunContext, options: &EngineOptions) -> EngineOutput {
    let mut out = EngineOutput::default();
    out.report.records_in = ctx.record_count();
    out.report.rows_skipped = ctx.skipped_rows();
    if ctx.is_empty() {
        warn!("Shift participation log is empty; emitting empty derived tables");
        return out;
    }

    let partitions = ctx.partitions();
    out.report.partitions_total = partitions.len();

    let results: Vec<(&Partition<'_>, Result<PartitionOutput, AnalyticsError>)> =
        if options.parallel {
            partitions
                .par_iter()
                .map(|p| (p, process_partition(p)))
                .collect()
        } else {
            partitions.iter().map(|p| (p, process_partition(p))).collect()
        };

    for (partition, result) in results {
        match result {
            Ok(mut part) => {
                out.report.partitions_processed += 1;
                out.h2h.append(&mut part.h2h);
                out.wowy.append(&mut part.wowy);
                out.line_combos.append(&mut part.line_combos);
                out.shift_quality.append(&mut part.shift_quality);
                out.shift_quality_summary.append(&mut part.shift_quality_summary);
                out.report.issues.append(&mut part.issues);
            }
            Err(e) => {
                warn!("Skipping partition: {}", e);
                out.report.issues.push(PartitionIssue::skipped(
                    &partition.key.game_id,
                    partition.key.venue,
                    &e,
                ));
            }
        }
    }

    out.h2h.sort_by(|a, b| a.key.cmp(&b.key));
    out.wowy.sort_by(|a, b| a.key.cmp(&b.key));
    out.line_combos.sort_by(|a, b| a.key.cmp(&b.key));
    out.shift_quality.sort_by(|a, b| a.key.cmp(&b.key));
    out.shift_quality_summary.sort_by(|a, b| a.key.cmp(&b.key));

    info!(
        "Engine finished: {}/{} partitions, {} h2h, {} wowy, {} line combos, {} shift scores, {} issue(s)",
        out.report.partitions_processed,
        out.report.partitions_total,
        out.h2h.len(),
        out.wowy.len(),
        out.line_combos.len(),
        out.shift_quality.len(),
        out.report.issues.len()
    );
    out
}
