//! Per-shift quality scores and the per-player game roll-up.
//!
//! The score blends two coarse signals: whether the shift length sat in the
//! usual 40–60s window, and the goal differential while the player was out.

use std::collections::BTreeMap;

use super::consolidate::ConsolidatedPartition;
use crate::db::models::{
    share_pct, OnIceCounters, Performance, QualityTier, ShiftQualityRecord, ShiftQualitySummary,
};

const EXPECTED_PM_PER_SHIFT: f64 = 0.1;
const PERFORMANCE_BAND: f64 = 0.5;

/// Tri-level bucket on shift length in seconds.
pub fn duration_score(seconds: f64) -> f64 {
    if (40.0..=60.0).contains(&seconds) {
        1.0
    } else if (30.0..=80.0).contains(&seconds) {
        0.7
    } else {
        0.4
    }
}

pub fn pm_score(plus_minus: i64) -> f64 {
    (0.5 + plus_minus as f64 * 0.25).clamp(0.0, 1.0)
}

pub fn quality_score(seconds: f64, plus_minus: i64) -> f64 {
    (duration_score(seconds) + pm_score(plus_minus)) / 2.0
}

pub fn classify_performance(pm_vs_expected: f64) -> Performance {
    if pm_vs_expected > PERFORMANCE_BAND {
        Performance::Overperform
    } else if pm_vs_expected < -PERFORMANCE_BAND {
        Performance::Underperform
    } else {
        Performance::Expected
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftQualityResult {
    pub records: Vec<ShiftQualityRecord>,
    pub summaries: Vec<ShiftQualitySummary>,
}

#[derive(Default)]
struct PlayerRollup {
    shifts: u32,
    toi: f64,
    score_sum: f64,
    tiers: [u32; 4],
    counters: OnIceCounters,
    rating_sum: f64,
    opp_rating_sum: f64,
}

fn tier_slot(tier: QualityTier) -> usize {
    match tier {
        QualityTier::Excellent => 0,
        QualityTier::Good => 1,
        QualityTier::Average => 2,
        QualityTier::Poor => 3,
    }
}

pub fn score(partition: &ConsolidatedPartition) -> ShiftQualityResult {
    let mut records = Vec::new();
    let mut rollups: BTreeMap<&str, PlayerRollup> = BTreeMap::new();

    for shift in partition.shifts.values() {
        let plus_minus = shift.counters.plus_minus();
        for p in &shift.participants {
            let d_score = duration_score(p.duration);
            let pm = pm_score(plus_minus);
            let q = quality_score(p.duration, plus_minus);
            let tier = QualityTier::from_score(q);

            records.push(ShiftQualityRecord {
                key: format!(
                    "SQ_{}_{}_{}_{}",
                    partition.game_id, partition.venue, p.player_id, shift.number
                ),
                game_id: partition.game_id.clone(),
                venue: partition.venue,
                player_id: p.player_id.clone(),
                logical_shift_number: shift.number,
                shift_duration: p.duration,
                plus_minus,
                duration_score: d_score,
                pm_score: pm,
                quality_score: q,
                quality_tier: tier,
            });

            let r = rollups.entry(p.player_id.as_str()).or_default();
            r.shifts += 1;
            r.toi += p.duration;
            r.score_sum += q;
            r.tiers[tier_slot(tier)] += 1;
            r.counters.add(&shift.counters);
            r.rating_sum += p.player_rating;
            r.opp_rating_sum += p.opp_avg_rating;
        }
    }

    let summaries = rollups
        .into_iter()
        .map(|(player_id, r)| {
            let n = r.shifts as f64;
            let qoc = r.opp_rating_sum / n;
            let player_rating = r.rating_sum / n;
            let expected_pm = (player_rating - qoc) * n * EXPECTED_PM_PER_SHIFT;
            let plus_minus = r.counters.plus_minus();
            let pm_vs_expected = plus_minus as f64 - expected_pm;
            ShiftQualitySummary {
                key: format!("SQS_{}_{}_{}", partition.game_id, partition.venue, player_id),
                game_id: partition.game_id.clone(),
                venue: partition.venue,
                player_id: player_id.to_string(),
                logical_shifts: r.shifts,
                toi_seconds: r.toi,
                avg_quality_score: r.score_sum / n,
                excellent_shifts: r.tiers[0],
                good_shifts: r.tiers[1],
                average_shifts: r.tiers[2],
                poor_shifts: r.tiers[3],
                cf_pct: share_pct(r.counters.cf, r.counters.ca),
                plus_minus,
                player_rating,
                qoc,
                expected_pm,
                pm_vs_expected,
                performance: classify_performance(pm_vs_expected),
            }
        })
        .collect();

    ShiftQualityResult { records, summaries }
}
