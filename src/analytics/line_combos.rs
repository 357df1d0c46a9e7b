//! Forward-line and defense-pairing aggregates.

use std::collections::BTreeMap;
use tracing::debug;

use super::consolidate::{ConsolidatedPartition, Participant};
use super::h2h::ShiftAccumulator;
use crate::db::models::{ComboType, LineCombo};

/// Forwards need company to count as a line.
const MIN_FORWARDS: usize = 2;
/// A lone defenseman is a legitimate pairing (partner in the box).
const MIN_DEFENSE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRole {
    Forward,
    Defense,
    Goalie,
    Unknown,
}

impl PositionRole {
    pub fn classify(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "F" | "C" | "LW" | "RW" | "W" | "FORWARD" | "CENTER" | "CENTRE" | "LEFT WING"
            | "RIGHT WING" => PositionRole::Forward,
            "D" | "LD" | "RD" | "DEFENSE" | "DEFENCE" | "DEFENSEMAN" => PositionRole::Defense,
            "G" | "GOALIE" | "GOALTENDER" => PositionRole::Goalie,
            _ => PositionRole::Unknown,
        }
    }

    fn combo_type(self) -> Option<ComboType> {
        match self {
            PositionRole::Forward => Some(ComboType::Forward),
            PositionRole::Defense => Some(ComboType::Defense),
            _ => None,
        }
    }
}

#[derive(Default)]
struct ComboAccumulator {
    totals: ShiftAccumulator,
    jersey_numbers: Vec<Vec<Option<u32>>>,
}

/// One forward key and one defense key per logical shift, at most.
pub fn aggregate(partition: &ConsolidatedPartition) -> Vec<LineCombo> {
    let mut acc: BTreeMap<(ComboType, Vec<String>), ComboAccumulator> = BTreeMap::new();

    for shift in partition.shifts.values() {
        let mut by_type: BTreeMap<ComboType, Vec<&Participant>> = BTreeMap::new();
        for p in &shift.participants {
            match PositionRole::classify(&p.position).combo_type() {
                Some(ct) => by_type.entry(ct).or_default().push(p),
                None => debug!(
                    "game {} ({}): {} ({}) on shift {} is not in a line combo",
                    partition.game_id, partition.venue, p.player_id, p.position, shift.number
                ),
            }
        }

        for (combo_type, members) in by_type {
            let min = match combo_type {
                ComboType::Forward => MIN_FORWARDS,
                ComboType::Defense => MIN_DEFENSE,
            };
            if members.len() < min {
                continue;
            }
            // Participants are already sorted by player id.
            let ids: Vec<String> = members.iter().map(|p| p.player_id.clone()).collect();
            let jerseys: Vec<Option<u32>> = members.iter().map(|p| p.jersey_number).collect();

            let entry = acc.entry((combo_type, ids)).or_default();
            if entry.totals.add_shift(shift) {
                entry.jersey_numbers.push(jerseys);
            }
        }
    }

    acc.into_iter()
        .map(|((combo_type, player_ids), a)| {
            let c = a.totals.counters;
            LineCombo {
                key: LineCombo::make_key(&partition.game_id, partition.venue, combo_type, &player_ids),
                game_id: partition.game_id.clone(),
                venue: partition.venue,
                combo_type,
                player_ids,
                jersey_numbers: a.jersey_numbers,
                shifts: a.totals.shifts.len() as u32,
                toi: a.totals.toi,
                goals_for: c.gf,
                goals_against: c.ga,
                corsi_for: c.cf,
                corsi_against: c.ca,
                fenwick_for: c.ff,
                fenwick_against: c.fa,
                cf_pct: c.cf_pct(),
                ff_pct: c.ff_pct(),
                plus_minus: c.plus_minus(),
            }
        })
        .collect()
}
