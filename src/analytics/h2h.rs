//! Head-to-head aggregation: every unordered pair of teammates that shared a
//! logical shift, with their joint ice time and on-ice outcomes.

use std::collections::{BTreeMap, BTreeSet};

use super::consolidate::{ConsolidatedPartition, LogicalShift};
use crate::db::models::{H2HPair, OnIceCounters, Venue};

/// Running totals for one key (a pair here, a line combo elsewhere).
///
/// Shifts are tracked as a set so feeding the same logical shift twice
/// leaves the totals unchanged.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShiftAccumulator {
    pub shifts: BTreeSet<i64>,
    pub toi: f64,
    pub counters: OnIceCounters,
}

impl ShiftAccumulator {
    /// Returns `false` if the shift was already counted.
    pub fn add_shift(&mut self, shift: &LogicalShift) -> bool {
        if !self.shifts.insert(shift.number) {
            return false;
        }
        self.toi += shift.duration;
        self.counters.add(&shift.counters);
        true
    }
}

/// H2H pairs of one partition, keyed by the sorted `(player_1_id, player_2_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct H2HResult {
    pub game_id: String,
    pub venue: Venue,
    pub pairs: BTreeMap<(String, String), H2HPair>,
}

impl H2HResult {
    pub fn get(&self, player_a: &str, player_b: &str) -> Option<&H2HPair> {
        let (p1, p2) = ordered(player_a, player_b);
        self.pairs.get(&(p1.to_string(), p2.to_string()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

fn ordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Enumerate `C(n, 2)` pairs on every logical shift and accumulate them.
pub fn aggregate(partition: &ConsolidatedPartition) -> H2HResult {
    let mut acc: BTreeMap<(&str, &str), ShiftAccumulator> = BTreeMap::new();

    for shift in partition.shifts.values() {
        let players = &shift.participants;
        // A lone skater forms no pair.
        for i in 0..players.len() {
            for j in (i + 1)..players.len() {
                let key = ordered(&players[i].player_id, &players[j].player_id);
                acc.entry(key).or_default().add_shift(shift);
            }
        }
    }

    let pairs = acc
        .into_iter()
        .map(|((p1, p2), a)| {
            let pair = H2HPair {
                key: H2HPair::make_key(&partition.game_id, partition.venue, p1, p2),
                game_id: partition.game_id.clone(),
                venue: partition.venue,
                player_1_id: p1.to_string(),
                player_2_id: p2.to_string(),
                shifts_together: a.shifts.len() as u32,
                shift_numbers: a.shifts.iter().copied().collect(),
                toi_together: a.toi,
                goals_for: a.counters.gf,
                goals_against: a.counters.ga,
                corsi_for: a.counters.cf,
                corsi_against: a.counters.ca,
                fenwick_for: a.counters.ff,
                fenwick_against: a.counters.fa,
                cf_pct: a.counters.cf_pct(),
                ff_pct: a.counters.ff_pct(),
                plus_minus: a.counters.plus_minus(),
            };
            ((p1.to_string(), p2.to_string()), pair)
        })
        .collect();

    H2HResult {
        game_id: partition.game_id.clone(),
        venue: partition.venue,
        pairs,
    }
}
