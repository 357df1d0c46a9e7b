//! With-or-without-you analysis.
//!
//! For every H2H pair, compare what happened while both players were on the
//! ice against what happened on the shifts where only one of them was.
//! The H2H result is taken as the authoritative "together" baseline.

use std::collections::BTreeSet;
use tracing::error;

use super::consolidate::ConsolidatedPartition;
use super::error::AnalyticsError;
use super::h2h::{H2HResult, ShiftAccumulator};
use crate::db::models::{share_pct, WowyPair};

#[derive(Debug, Clone, PartialEq)]
pub struct WowyResult {
    pub pairs: Vec<WowyPair>,
    /// Pairs whose recomputed together-set disagreed with H2H (release builds only;
    /// debug builds assert instead)
    pub violations: Vec<AnalyticsError>,
}

fn accumulate<'a>(
    partition: &ConsolidatedPartition,
    shifts: impl IntoIterator<Item = &'a i64>,
) -> ShiftAccumulator {
    let mut acc = ShiftAccumulator::default();
    for n in shifts {
        if let Some(shift) = partition.shifts.get(n) {
            acc.add_shift(shift);
        }
    }
    acc
}

/// Derive WOWY pairs from an already-computed H2H result.
pub fn differentiate(h2h: &H2HResult, partition: &ConsolidatedPartition) -> WowyResult {
    let by_player = partition.player_shifts();
    let empty = BTreeSet::new();
    let mut pairs = Vec::with_capacity(h2h.len());
    let mut violations = Vec::new();

    for ((p1, p2), together_pair) in &h2h.pairs {
        let p1_shifts = by_player.get(p1.as_str()).unwrap_or(&empty);
        let p2_shifts = by_player.get(p2.as_str()).unwrap_or(&empty);

        let recorded: BTreeSet<i64> = together_pair.shift_numbers.iter().copied().collect();
        let computed: BTreeSet<i64> = p1_shifts.intersection(p2_shifts).copied().collect();
        debug_assert_eq!(
            computed, recorded,
            "together set for {}/{} diverged from H2H",
            p1, p2
        );
        let together = if computed == recorded {
            computed
        } else {
            let err = AnalyticsError::TogetherSetMismatch {
                game_id: partition.game_id.clone(),
                venue: partition.venue,
                player_1_id: p1.clone(),
                player_2_id: p2.clone(),
                recorded: recorded.len(),
                computed: computed.len(),
            };
            error!("{}; using H2H value", err);
            violations.push(err);
            recorded
        };

        let p1_without: BTreeSet<i64> = p1_shifts.difference(&together).copied().collect();
        let p2_without: BTreeSet<i64> = p2_shifts.difference(&together).copied().collect();

        // Each apart shift is summed once even if it shows up in both sets.
        let apart_shifts: BTreeSet<i64> = p1_without.union(&p2_without).copied().collect();
        let apart = accumulate(partition, &apart_shifts);
        let p1_alone = accumulate(partition, &p1_without);
        let p2_alone = accumulate(partition, &p2_without);

        let cf_pct_together = together_pair.cf_pct;
        let gf_pct_together = share_pct(together_pair.goals_for, together_pair.goals_against);
        let cf_pct_apart = apart.counters.cf_pct();
        let gf_pct_apart = apart.counters.gf_pct();
        let (cf_pct_delta, gf_pct_delta) = if apart_shifts.is_empty() {
            (0.0, 0.0)
        } else {
            (cf_pct_together - cf_pct_apart, gf_pct_together - gf_pct_apart)
        };

        let shifts_together = together.len() as u32;
        let p1_shifts_without_p2 = p1_without.len() as u32;
        let p2_shifts_without_p1 = p2_without.len() as u32;

        pairs.push(WowyPair {
            key: WowyPair::make_key(&partition.game_id, partition.venue, p1, p2),
            game_id: partition.game_id.clone(),
            venue: partition.venue,
            player_1_id: p1.clone(),
            player_2_id: p2.clone(),
            p1_total_shifts: shifts_together + p1_shifts_without_p2,
            p2_total_shifts: shifts_together + p2_shifts_without_p1,
            shifts_together,
            p1_shifts_without_p2,
            p2_shifts_without_p1,
            toi_together: together_pair.toi_together,
            cf_pct_together,
            gf_pct_together,
            toi_apart: apart.toi,
            goals_for_apart: apart.counters.gf,
            goals_against_apart: apart.counters.ga,
            corsi_for_apart: apart.counters.cf,
            corsi_against_apart: apart.counters.ca,
            cf_pct_apart,
            gf_pct_apart,
            p1_cf_pct_without_p2: p1_alone.counters.cf_pct(),
            p2_cf_pct_without_p1: p2_alone.counters.cf_pct(),
            cf_pct_delta,
            gf_pct_delta,
        });
    }

    WowyResult { pairs, violations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::h2h;
    use crate::analytics::test_support::{consolidated, shift_rows};
    use crate::db::models::Venue;
    use approx::assert_relative_eq;

    /// a plays 10 shifts, b plays 8, 6 of them together.
    fn ten_eight_six() -> ConsolidatedPartition {
        let mut rows = Vec::new();
        for n in 1..=6 {
            rows.extend(shift_rows("g1", Venue::Home, n, &[("a", "C"), ("b", "LW")], (0, 0, 3, 1)));
        }
        for n in 7..=10 {
            rows.extend(shift_rows("g1", Venue::Home, n, &[("a", "C")], (0, 1, 1, 3)));
        }
        for n in 11..=12 {
            rows.extend(shift_rows("g1", Venue::Home, n, &[("b", "LW")], (1, 0, 2, 2)));
        }
        consolidated(rows)
    }

    #[test]
    fn shift_counts_split_into_together_and_without() {
        let part = ten_eight_six();
        let h2h = h2h::aggregate(&part);
        let result = differentiate(&h2h, &part);
        assert!(result.violations.is_empty());
        let w = &result.pairs[0];
        assert_eq!(w.p1_total_shifts, 10);
        assert_eq!(w.p2_total_shifts, 8);
        assert_eq!(w.shifts_together, 6);
        assert_eq!(w.p1_shifts_without_p2, 4);
        assert_eq!(w.p2_shifts_without_p1, 2);
        assert_eq!(w.shifts_together + w.p1_shifts_without_p2, w.p1_total_shifts);
        assert_eq!(w.shifts_together + w.p2_shifts_without_p1, w.p2_total_shifts);
    }

    #[test]
    fn apart_counters_and_deltas() {
        let part = ten_eight_six();
        let h2h = h2h::aggregate(&part);
        let w = &differentiate(&h2h, &part).pairs[0];
        // together: cf 18, ca 6 -> 75%
        assert_relative_eq!(w.cf_pct_together, 75.0, epsilon = 1e-9);
        // apart: 4 shifts (1,3) + 2 shifts (2,2) -> cf 8, ca 16
        assert_eq!(w.corsi_for_apart, 8);
        assert_eq!(w.corsi_against_apart, 16);
        assert_relative_eq!(w.cf_pct_apart, 100.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(w.cf_pct_delta, 75.0 - 100.0 / 3.0, epsilon = 1e-9);
        // goals apart: gf 2, ga 4; together none -> 50%
        assert_relative_eq!(w.gf_pct_together, 50.0, epsilon = 1e-9);
        assert_relative_eq!(w.gf_pct_apart, 100.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(w.p1_cf_pct_without_p2, 25.0, epsilon = 1e-9);
        assert_relative_eq!(w.p2_cf_pct_without_p1, 50.0, epsilon = 1e-9);
        assert_relative_eq!(w.toi_apart, 6.0 * 45.0, epsilon = 1e-9);
    }

    #[test]
    fn inseparable_pair_reports_zero_deltas() {
        let mut rows = Vec::new();
        for n in 1..=3 {
            rows.extend(shift_rows("g1", Venue::Away, n, &[("a", "D"), ("b", "D")], (1, 0, 4, 1)));
        }
        let part = consolidated(rows);
        let h2h = h2h::aggregate(&part);
        let w = &differentiate(&h2h, &part).pairs[0];
        assert_eq!(w.cf_pct_delta, 0.0);
        assert_eq!(w.gf_pct_delta, 0.0);
        assert_eq!(w.cf_pct_apart, 50.0);
        assert_eq!(w.gf_pct_apart, 50.0);
        assert_eq!(w.p1_shifts_without_p2, 0);
    }

    #[test]
    fn keys_follow_h2h_pairs() {
        let part = ten_eight_six();
        let h2h = h2h::aggregate(&part);
        let result = differentiate(&h2h, &part);
        assert_eq!(result.pairs.len(), h2h.len());
        assert_eq!(result.pairs[0].key, "WOWY_g1_home_a_b");
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "diverged from H2H")]
    fn tampered_h2h_trips_assertion_in_debug() {
        let part = ten_eight_six();
        let mut h2h = h2h::aggregate(&part);
        for pair in h2h.pairs.values_mut() {
            pair.shift_numbers.pop();
        }
        differentiate(&h2h, &part);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn tampered_h2h_falls_back_to_h2h_in_release() {
        use crate::analytics::error::{IssueKind, PartitionIssue};

        let part = ten_eight_six();
        let mut h2h = h2h::aggregate(&part);
        for pair in h2h.pairs.values_mut() {
            pair.shift_numbers.pop();
        }
        let recorded = h2h.get("a", "b").unwrap().shift_numbers.len() as u32;

        let result = differentiate(&h2h, &part);
        assert_eq!(result.violations.len(), 1);
        let w = &result.pairs[0];
        assert_eq!(w.shifts_together, recorded);
        assert_eq!(w.shifts_together, 5);
        // the dropped shared shift now counts as apart for both
        assert_eq!(w.p1_total_shifts, 10);
        assert_eq!(w.p2_total_shifts, 8);

        let issue = PartitionIssue::recovered("g1", Venue::Home, &result.violations[0]);
        assert_eq!(issue.kind, IssueKind::InvariantViolation);
    }
}
