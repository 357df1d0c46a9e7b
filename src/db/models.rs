use serde::{Deserialize, Serialize};
use std::fmt;

/// Which bench a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Home => "home",
            Venue::Away => "away",
        }
    }

    /// Parse a venue token ("home", "Away", " HOME "...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" | "h" => Some(Venue::Home),
            "away" | "a" => Some(Venue::Away),
            _ => None,
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Goals / Corsi / Fenwick for and against while a shift was on the ice.
///
/// These describe the shift, not the individual: every player on the same
/// logical shift carries the same values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnIceCounters {
    pub gf: u32,
    pub ga: u32,
    pub cf: u32,
    pub ca: u32,
    pub ff: u32,
    pub fa: u32,
}

impl OnIceCounters {
    pub fn add(&mut self, other: &OnIceCounters) {
        self.gf += other.gf;
        self.ga += other.ga;
        self.cf += other.cf;
        self.ca += other.ca;
        self.ff += other.ff;
        self.fa += other.fa;
    }

    pub fn plus_minus(&self) -> i64 {
        self.gf as i64 - self.ga as i64
    }

    pub fn cf_pct(&self) -> f64 {
        share_pct(self.cf, self.ca)
    }

    pub fn ff_pct(&self) -> f64 {
        share_pct(self.ff, self.fa)
    }

    pub fn gf_pct(&self) -> f64 {
        share_pct(self.gf, self.ga)
    }
}

/// `for / (for + against) * 100`, or 50.0 when nothing happened either way.
pub fn share_pct(for_count: u32, against_count: u32) -> f64 {
    let total = for_count as f64 + against_count as f64;
    if total <= 0.0 {
        return 50.0;
    }
    for_count as f64 / total * 100.0
}

/// One player on one raw shift segment, as delivered by the upstream ETL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftParticipationRecord {
    pub game_id: String,
    pub venue: Venue,
    pub player_id: String,
    /// Free-text role token ("C", "LW", "D", "G", ...)
    pub position: String,
    /// Raw segment ordinal
    pub shift_index: i64,
    /// Canonical shift identity; `None` means fall back to `shift_index`
    pub logical_shift_number: Option<i64>,
    pub is_first_segment: bool,
    /// Seconds, this segment only
    pub shift_duration: f64,
    pub logical_shift_duration: Option<f64>,
    pub jersey_number: Option<u32>,
    #[serde(flatten)]
    pub counters: OnIceCounters,
    pub player_rating: f64,
    pub opp_avg_rating: f64,
}

impl ShiftParticipationRecord {
    pub fn logical_shift_key(&self) -> i64 {
        self.logical_shift_number.unwrap_or(self.shift_index)
    }
}

/// Joint ice time and outcomes for two teammates in one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct H2HPair {
    /// `H2H_{game_id}_{venue}_{player_1_id}_{player_2_id}`
    pub key: String,
    pub game_id: String,
    pub venue: Venue,
    /// Lexicographically smaller id of the pair
    pub player_1_id: String,
    pub player_2_id: String,
    pub shifts_together: u32,
    /// Logical shifts shared, ascending
    pub shift_numbers: Vec<i64>,
    pub toi_together: f64,
    pub goals_for: u32,
    pub goals_against: u32,
    pub corsi_for: u32,
    pub corsi_against: u32,
    pub fenwick_for: u32,
    pub fenwick_against: u32,
    pub cf_pct: f64,
    pub ff_pct: f64,
    pub plus_minus: i64,
}

impl H2HPair {
    pub fn make_key(game_id: &str, venue: Venue, player_1_id: &str, player_2_id: &str) -> String {
        format!("H2H_{}_{}_{}_{}", game_id, venue, player_1_id, player_2_id)
    }
}

/// With-or-without-you comparison for a pair of teammates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WowyPair {
    /// `WOWY_{game_id}_{venue}_{player_1_id}_{player_2_id}`
    pub key: String,
    pub game_id: String,
    pub venue: Venue,
    pub player_1_id: String,
    pub player_2_id: String,
    pub p1_total_shifts: u32,
    pub p2_total_shifts: u32,
    pub shifts_together: u32,
    pub p1_shifts_without_p2: u32,
    pub p2_shifts_without_p1: u32,
    pub toi_together: f64,
    pub cf_pct_together: f64,
    pub gf_pct_together: f64,
    pub toi_apart: f64,
    pub goals_for_apart: u32,
    pub goals_against_apart: u32,
    pub corsi_for_apart: u32,
    pub corsi_against_apart: u32,
    pub cf_pct_apart: f64,
    pub gf_pct_apart: f64,
    /// Corsi share over p1's shifts without p2 only
    pub p1_cf_pct_without_p2: f64,
    pub p2_cf_pct_without_p1: f64,
    pub cf_pct_delta: f64,
    pub gf_pct_delta: f64,
}

impl WowyPair {
    pub fn make_key(game_id: &str, venue: Venue, player_1_id: &str, player_2_id: &str) -> String {
        format!("WOWY_{}_{}_{}_{}", game_id, venue, player_1_id, player_2_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComboType {
    Forward,
    Defense,
}

impl ComboType {
    pub fn code(&self) -> &'static str {
        match self {
            ComboType::Forward => "F",
            ComboType::Defense => "D",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComboType::Forward => "forward",
            ComboType::Defense => "defense",
        }
    }
}

/// A forward unit or defense pairing deployed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCombo {
    /// `LC_{game_id}_{venue}_{F|D}_{player ids joined by '_'}`
    pub key: String,
    pub game_id: String,
    pub venue: Venue,
    pub combo_type: ComboType,
    /// Sorted
    pub player_ids: Vec<String>,
    /// Display only. One ordered list per shift the combo was deployed,
    /// so a mid-game number change shows up from that shift on.
    pub jersey_numbers: Vec<Vec<Option<u32>>>,
    pub shifts: u32,
    pub toi: f64,
    pub goals_for: u32,
    pub goals_against: u32,
    pub corsi_for: u32,
    pub corsi_against: u32,
    pub fenwick_for: u32,
    pub fenwick_against: u32,
    pub cf_pct: f64,
    pub ff_pct: f64,
    pub plus_minus: i64,
}

impl LineCombo {
    pub fn make_key(game_id: &str, venue: Venue, combo_type: ComboType, player_ids: &[String]) -> String {
        format!(
            "LC_{}_{}_{}_{}",
            game_id,
            venue,
            combo_type.code(),
            player_ids.join("_")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Excellent,
    Good,
    Average,
    Poor,
}

impl QualityTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            QualityTier::Excellent
        } else if score >= 0.6 {
            QualityTier::Good
        } else if score >= 0.4 {
            QualityTier::Average
        } else {
            QualityTier::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Average => "average",
            QualityTier::Poor => "poor",
        }
    }
}

/// Score for one player on one logical shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftQualityRecord {
    /// `SQ_{game_id}_{venue}_{player_id}_{logical_shift_number}`
    pub key: String,
    pub game_id: String,
    pub venue: Venue,
    pub player_id: String,
    pub logical_shift_number: i64,
    pub shift_duration: f64,
    pub plus_minus: i64,
    pub duration_score: f64,
    pub pm_score: f64,
    pub quality_score: f64,
    pub quality_tier: QualityTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Performance {
    Overperform,
    Underperform,
    Expected,
}

impl Performance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Performance::Overperform => "overperform",
            Performance::Underperform => "underperform",
            Performance::Expected => "expected",
        }
    }
}

/// Per-player, per-game roll-up of shift quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftQualitySummary {
    /// `SQS_{game_id}_{venue}_{player_id}`
    pub key: String,
    pub game_id: String,
    pub venue: Venue,
    pub player_id: String,
    pub logical_shifts: u32,
    pub toi_seconds: f64,
    pub avg_quality_score: f64,
    pub excellent_shifts: u32,
    pub good_shifts: u32,
    pub average_shifts: u32,
    pub poor_shifts: u32,
    pub cf_pct: f64,
    pub plus_minus: i64,
    pub player_rating: f64,
    /// Quality of competition: mean opponent rating faced
    pub qoc: f64,
    pub expected_pm: f64,
    pub pm_vs_expected: f64,
    pub performance: Performance,
}
