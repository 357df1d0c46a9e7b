use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::Venue;

/// Failures local to one `(game_id, venue)` partition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    #[error(
        "game {game_id} ({venue}): {player_id} on logical shift {shift} has invalid duration \
         {duration}, dropped"
    )]
    InvalidDuration {
        game_id: String,
        venue: Venue,
        shift: i64,
        player_id: String,
        duration: f64,
    },

    #[error("game {game_id} ({venue}): no logical shifts could be formed")]
    NoLogicalShifts { game_id: String, venue: Venue },

    #[error(
        "game {game_id} ({venue}): together set for {player_1_id}/{player_2_id} \
         has {computed} shifts but H2H recorded {recorded}"
    )]
    TogetherSetMismatch {
        game_id: String,
        venue: Venue,
        player_1_id: String,
        player_2_id: String,
        recorded: usize,
        computed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// `logical_shift_number` missing, grouped on `shift_index` instead
    DegradedGrouping,
    /// Rows on one logical shift disagreed on outcome counters
    InconsistentCounters,
    /// Row values that could not be used were dropped; the rest of the game stands
    MalformedRow,
    /// Recovered by trusting the H2H value
    InvariantViolation,
    /// Partition dropped from the output
    Skipped,
}

/// One entry in the run report handed back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionIssue {
    pub game_id: String,
    pub venue: Venue,
    pub kind: IssueKind,
    pub detail: String,
}

impl PartitionIssue {
    pub fn new(game_id: &str, venue: Venue, kind: IssueKind, detail: impl Into<String>) -> Self {
        PartitionIssue {
            game_id: game_id.to_string(),
            venue,
            kind,
            detail: detail.into(),
        }
    }

    pub fn skipped(game_id: &str, venue: Venue, err: &AnalyticsError) -> Self {
        Self::new(game_id, venue, IssueKind::Skipped, err.to_string())
    }

    /// Recovered, non-fatal error: classified by what went wrong.
    pub fn recovered(game_id: &str, venue: Venue, err: &AnalyticsError) -> Self {
        let kind = match err {
            AnalyticsError::InvalidDuration { .. } => IssueKind::MalformedRow,
            AnalyticsError::TogetherSetMismatch { .. } => IssueKind::InvariantViolation,
            AnalyticsError::NoLogicalShifts { .. } => IssueKind::Skipped,
        };
        Self::new(game_id, venue, kind, err.to_string())
    }
}
