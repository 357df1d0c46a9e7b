//! Logical shift consolidation.
//!
//! A stoppage in the middle of a shift splits it into several raw segments.
//! Everything downstream works on *logical* shifts, so segments are folded
//! back together here: one duration, one set of outcome counters and one
//! entry per distinct player.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::context::Partition;
use super::error::AnalyticsError;
use crate::db::models::{OnIceCounters, ShiftParticipationRecord, Venue};

/// A player on a logical shift.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub player_id: String,
    pub position: String,
    pub jersey_number: Option<u32>,
    /// This player's own time on the logical shift
    pub duration: f64,
    pub player_rating: f64,
    pub opp_avg_rating: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalShift {
    pub number: i64,
    pub duration: f64,
    pub counters: OnIceCounters,
    /// Sorted by `player_id`, one entry per player
    pub participants: Vec<Participant>,
}

/// All logical shifts of one game and bench.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedPartition {
    pub game_id: String,
    pub venue: Venue,
    pub shifts: BTreeMap<i64, LogicalShift>,
    /// Rows that had no `logical_shift_number`
    pub fallback_rows: usize,
    /// Shifts whose rows disagreed on counters
    pub inconsistent_shifts: Vec<i64>,
    /// Negative or non-finite durations that were left out of the totals
    pub dropped_durations: Vec<AnalyticsError>,
}

impl ConsolidatedPartition {
    /// Logical shifts each player appeared on.
    pub fn player_shifts(&self) -> BTreeMap<&str, BTreeSet<i64>> {
        let mut out: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();
        for shift in self.shifts.values() {
            for p in &shift.participants {
                out.entry(p.player_id.as_str()).or_default().insert(shift.number);
            }
        }
        out
    }
}

/// Durations must be finite and non-negative to count.
fn usable(seconds: f64) -> Option<f64> {
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

#[derive(Default)]
struct PlayerSegments<'a> {
    rows: Vec<&'a ShiftParticipationRecord>,
}

impl<'a> PlayerSegments<'a> {
    /// Row whose attributes (position, jersey, ratings) represent the player.
    fn representative(&self) -> &'a ShiftParticipationRecord {
        self.rows
            .iter()
            .copied()
            .find(|r| r.is_first_segment)
            .unwrap_or(self.rows[0])
    }

    fn duration(&self) -> f64 {
        if let Some(d) = self
            .rows
            .iter()
            .find_map(|r| r.logical_shift_duration.and_then(usable))
        {
            return d;
        }
        let firsts: Vec<f64> = self
            .rows
            .iter()
            .filter(|r| r.is_first_segment)
            .map(|r| usable(r.shift_duration).unwrap_or(0.0))
            .collect();
        if !firsts.is_empty() {
            return firsts.iter().sum();
        }
        // No segment flagged as first: take the earliest one alone.
        self.rows
            .iter()
            .min_by_key(|r| r.shift_index)
            .and_then(|r| usable(r.shift_duration))
            .unwrap_or(0.0)
    }
}

/// Fold a partition's raw segments into logical shifts.
pub fn consolidate(partition: &Partition<'_>) -> Result<ConsolidatedPartition, AnalyticsError> {
    let game_id = partition.key.game_id.clone();
    let venue = partition.key.venue;

    let mut groups: BTreeMap<i64, Vec<&ShiftParticipationRecord>> = BTreeMap::new();
    let mut fallback_rows = 0usize;
    for row in &partition.rows {
        if row.logical_shift_number.is_none() {
            fallback_rows += 1;
        }
        groups.entry(row.logical_shift_key()).or_default().push(*row);
    }
    if fallback_rows > 0 {
        warn!(
            "game {} ({}): {} row(s) missing logical_shift_number, grouping on shift_index",
            game_id, venue, fallback_rows
        );
    }

    let mut shifts = BTreeMap::new();
    let mut inconsistent_shifts = Vec::new();
    let mut dropped_durations = Vec::new();
    for (number, mut rows) in groups {
        rows.sort_by_key(|r| r.shift_index);
        let counters = rows[0].counters;
        if rows.iter().any(|r| r.counters != counters) {
            warn!(
                "game {} ({}): logical shift {} has conflicting outcome counters, keeping first row",
                game_id, venue, number
            );
            inconsistent_shifts.push(number);
        }

        for row in &rows {
            let bad = std::iter::once(row.shift_duration)
                .chain(row.logical_shift_duration)
                .filter(|d| usable(*d).is_none());
            for duration in bad {
                debug!(
                    "game {} ({}): dropping duration {} for {} on logical shift {}",
                    game_id, venue, duration, row.player_id, number
                );
                dropped_durations.push(AnalyticsError::InvalidDuration {
                    game_id: game_id.clone(),
                    venue,
                    shift: number,
                    player_id: row.player_id.clone(),
                    duration,
                });
            }
        }

        let mut by_player: BTreeMap<&str, PlayerSegments> = BTreeMap::new();
        for row in &rows {
            by_player.entry(row.player_id.as_str()).or_default().rows.push(*row);
        }

        let participants: Vec<Participant> = by_player
            .iter()
            .map(|(player_id, segs)| {
                let rep = segs.representative();
                Participant {
                    player_id: player_id.to_string(),
                    position: rep.position.clone(),
                    jersey_number: rep.jersey_number,
                    duration: segs.duration(),
                    player_rating: rep.player_rating,
                    opp_avg_rating: rep.opp_avg_rating,
                }
            })
            .collect();

        let duration = match rows
            .iter()
            .find_map(|r| r.logical_shift_duration.and_then(usable))
        {
            Some(d) => d,
            None => participants.iter().map(|p| p.duration).fold(0.0, f64::max),
        };

        debug!(
            "game {} ({}): logical shift {} -> {:.1}s, {} player(s)",
            game_id,
            venue,
            number,
            duration,
            participants.len()
        );
        shifts.insert(
            number,
            LogicalShift {
                number,
                duration,
                counters,
                participants,
            },
        );
    }

    if shifts.is_empty() {
        return Err(AnalyticsError::NoLogicalShifts { game_id, venue });
    }

    Ok(ConsolidatedPartition {
        game_id,
        venue,
        shifts,
        fallback_rows,
        inconsistent_shifts,
        dropped_durations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::context::RunContext;
    use crate::analytics::test_support::{row, with_counters};
    use approx::assert_relative_eq;

    fn consolidate_all(rows: Vec<ShiftParticipationRecord>) -> ConsolidatedPartition {
        let ctx = RunContext::new(rows);
        let parts = ctx.partitions();
        consolidate(&parts[0]).expect("partition should consolidate")
    }

    #[test]
    fn split_shift_counts_only_first_segments() {
        // Player a: 30s first segment, 15s continuation after a stoppage.
        let mut first = row("g1", Venue::Home, "a", 1);
        first.shift_duration = 30.0;
        let mut cont = row("g1", Venue::Home, "a", 1);
        cont.shift_index = 2;
        cont.is_first_segment = false;
        cont.shift_duration = 15.0;
        let mut other = row("g1", Venue::Home, "b", 1);
        other.shift_duration = 28.0;

        let part = consolidate_all(vec![first, cont, other]);
        let shift = &part.shifts[&1];
        assert_relative_eq!(shift.duration, 30.0, epsilon = 1e-9);
        assert_eq!(shift.participants.len(), 2);
    }

    #[test]
    fn duration_is_not_summed_across_players() {
        let rows: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|p| row("g1", Venue::Home, p, 7))
            .collect();
        let part = consolidate_all(rows);
        assert_relative_eq!(part.shifts[&7].duration, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn precomputed_logical_duration_wins() {
        let mut a = row("g1", Venue::Home, "a", 3);
        a.logical_shift_duration = Some(52.5);
        let b = row("g1", Venue::Home, "b", 3);
        let part = consolidate_all(vec![a, b]);
        assert_relative_eq!(part.shifts[&3].duration, 52.5, epsilon = 1e-9);
    }

    #[test]
    fn counters_come_from_one_row_not_summed() {
        let rows = vec![
            with_counters(row("g1", Venue::Home, "a", 1), (1, 0, 5, 3)),
            with_counters(row("g1", Venue::Home, "b", 1), (1, 0, 5, 3)),
            with_counters(row("g1", Venue::Home, "c", 1), (1, 0, 5, 3)),
        ];
        let part = consolidate_all(rows);
        let c = part.shifts[&1].counters;
        assert_eq!((c.gf, c.ga, c.cf, c.ca), (1, 0, 5, 3));
        assert!(part.inconsistent_shifts.is_empty());
    }

    #[test]
    fn conflicting_counters_are_flagged() {
        let rows = vec![
            with_counters(row("g1", Venue::Home, "a", 1), (1, 0, 5, 3)),
            with_counters(row("g1", Venue::Home, "b", 1), (0, 0, 5, 3)),
        ];
        let part = consolidate_all(rows);
        assert_eq!(part.inconsistent_shifts, vec![1]);
        assert_eq!(part.shifts[&1].counters.gf, 1);
    }

    #[test]
    fn missing_logical_number_falls_back_to_shift_index() {
        let mut a = row("g1", Venue::Home, "a", 1);
        a.logical_shift_number = None;
        a.shift_index = 11;
        let mut b = row("g1", Venue::Home, "b", 1);
        b.logical_shift_number = None;
        b.shift_index = 11;
        let part = consolidate_all(vec![a, b]);
        assert_eq!(part.fallback_rows, 2);
        assert!(part.shifts.contains_key(&11));
        assert_eq!(part.shifts[&11].participants.len(), 2);
    }

    #[test]
    fn negative_duration_is_dropped_not_fatal() {
        let mut rows = Vec::new();
        for n in 1..=5 {
            for p in ["a", "b", "c"] {
                rows.push(row("g1", Venue::Home, p, n));
            }
        }
        rows[0].shift_duration = -1.0;
        rows[4].logical_shift_duration = Some(f64::NAN);

        let part = consolidate_all(rows);
        assert_eq!(part.shifts.len(), 5);
        assert_eq!(part.dropped_durations.len(), 2);
        assert!(matches!(
            &part.dropped_durations[0],
            AnalyticsError::InvalidDuration { shift: 1, player_id, .. } if player_id.as_str() == "a"
        ));

        // a keeps its place on shift 1 with no time; the others set the length.
        let first = &part.shifts[&1];
        assert_eq!(first.participants.len(), 3);
        assert_relative_eq!(first.participants[0].duration, 0.0, epsilon = 1e-9);
        assert_relative_eq!(first.duration, 45.0, epsilon = 1e-9);
        // A bad precomputed duration falls back to the segments.
        assert_relative_eq!(part.shifts[&2].duration, 45.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_partition_has_no_logical_shifts() {
        let key = crate::analytics::PartitionKey {
            game_id: "g1".into(),
            venue: Venue::Away,
        };
        let partition = Partition {
            key: &key,
            rows: Vec::new(),
        };
        let err = consolidate(&partition).unwrap_err();
        assert!(matches!(err, AnalyticsError::NoLogicalShifts { .. }));
    }

    #[test]
    fn player_shifts_lists_each_players_logical_shifts() {
        let rows = vec![
            row("g1", Venue::Home, "a", 1),
            row("g1", Venue::Home, "a", 2),
            row("g1", Venue::Home, "b", 2),
        ];
        let part = consolidate_all(rows);
        let by_player = part.player_shifts();
        assert_eq!(by_player["a"].iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(by_player["b"].iter().copied().collect::<Vec<_>>(), vec![2]);
    }
}
