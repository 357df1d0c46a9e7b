//! Shift participation log loading.
//!
//! The upstream ETL hands over a cleaned CSV. Only `game_id`, `venue`,
//! `player_id` and `shift_index` are required; every other column may be
//! absent and defaults to zero or null.

use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::models::{OnIceCounters, ShiftParticipationRecord, Venue};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("shift participation log not found at {path}")]
    MissingInputTable { path: String },

    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Loaded rows plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct ShiftLog {
    pub records: Vec<ShiftParticipationRecord>,
    pub skipped_rows: usize,
    /// The `logical_shift_number` column was absent from the header
    pub missing_logical_shift_column: bool,
}

#[derive(Debug, Deserialize)]
struct RawShiftRow {
    #[serde(default)]
    game_id: Option<String>,
    #[serde(default)]
    venue: Option<String>,
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    shift_index: Option<String>,
    #[serde(default)]
    logical_shift_number: Option<String>,
    #[serde(default)]
    is_first_segment: Option<String>,
    #[serde(default)]
    shift_duration: Option<String>,
    #[serde(default)]
    logical_shift_duration: Option<String>,
    #[serde(default)]
    jersey_number: Option<String>,
    #[serde(default)]
    gf: Option<String>,
    #[serde(default)]
    ga: Option<String>,
    #[serde(default)]
    cf: Option<String>,
    #[serde(default)]
    ca: Option<String>,
    #[serde(default)]
    ff: Option<String>,
    #[serde(default)]
    fa: Option<String>,
    #[serde(default)]
    player_rating: Option<String>,
    #[serde(default)]
    opp_avg_rating: Option<String>,
}

/// Blank and pandas-style `nan` cells count as null.
fn cell(raw: &Option<String>) -> Option<&str> {
    let s = raw.as_deref()?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(s)
    }
}

fn parse_f64(raw: &Option<String>) -> Result<Option<f64>, String> {
    match cell(raw) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| format!("not a number: '{}'", s)),
    }
}

/// Integers may arrive as `12` or `12.0`.
fn parse_i64(raw: &Option<String>) -> Result<Option<i64>, String> {
    match parse_f64(raw)? {
        None => Ok(None),
        Some(v) if v.fract() == 0.0 => Ok(Some(v as i64)),
        Some(v) => Err(format!("not an integer: {}", v)),
    }
}

fn parse_count(raw: &Option<String>) -> Result<u32, String> {
    match parse_i64(raw)? {
        None => Ok(0),
        Some(v) if (0..=u32::MAX as i64).contains(&v) => Ok(v as u32),
        Some(v) => Err(format!("negative or oversized counter: {}", v)),
    }
}

fn parse_bool(raw: &Option<String>) -> Result<bool, String> {
    match cell(raw).map(|s| s.to_ascii_lowercase()) {
        None => Ok(false),
        Some(s) => match s.as_str() {
            "true" | "t" | "1" | "1.0" | "yes" | "y" => Ok(true),
            "false" | "f" | "0" | "0.0" | "no" | "n" => Ok(false),
            other => Err(format!("not a boolean: '{}'", other)),
        },
    }
}

fn required<'a>(raw: &'a Option<String>, column: &str) -> Result<&'a str, String> {
    cell(raw).ok_or_else(|| format!("missing {}", column))
}

impl RawShiftRow {
    fn into_record(self) -> Result<ShiftParticipationRecord, String> {
        let game_id = required(&self.game_id, "game_id")?.to_string();
        let venue_raw = required(&self.venue, "venue")?;
        let venue = Venue::parse(venue_raw).ok_or_else(|| format!("unknown venue '{}'", venue_raw))?;
        let player_id = required(&self.player_id, "player_id")?.to_string();
        let shift_index = parse_i64(&self.shift_index)?.ok_or("missing shift_index")?;

        // A bad jersey is display-only: drop the number, keep the row.
        let jersey_number = match parse_i64(&self.jersey_number) {
            Ok(Some(n)) if (0..=99).contains(&n) => Some(n as u32),
            Ok(None) => None,
            _ => {
                debug!(
                    "game {} player {}: unparseable jersey number {:?}",
                    game_id, player_id, self.jersey_number
                );
                None
            }
        };

        Ok(ShiftParticipationRecord {
            position: cell(&self.position).unwrap_or_default().to_string(),
            shift_index,
            logical_shift_number: parse_i64(&self.logical_shift_number)?,
            is_first_segment: parse_bool(&self.is_first_segment)?,
            shift_duration: parse_f64(&self.shift_duration)?.unwrap_or(0.0),
            logical_shift_duration: parse_f64(&self.logical_shift_duration)?,
            jersey_number,
            counters: OnIceCounters {
                gf: parse_count(&self.gf)?,
                ga: parse_count(&self.ga)?,
                cf: parse_count(&self.cf)?,
                ca: parse_count(&self.ca)?,
                ff: parse_count(&self.ff)?,
                fa: parse_count(&self.fa)?,
            },
            player_rating: parse_f64(&self.player_rating)?.unwrap_or(0.0),
            opp_avg_rating: parse_f64(&self.opp_avg_rating)?.unwrap_or(0.0),
            game_id,
            venue,
            player_id,
        })
    }
}

fn load_from_reader<R: Read>(rdr: R) -> Result<ShiftLog, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let missing_logical_shift_column = !reader
        .headers()?
        .iter()
        .any(|h| h.trim() == "logical_shift_number");

    let mut log = ShiftLog {
        missing_logical_shift_column,
        ..ShiftLog::default()
    };
    for (line, result) in reader.deserialize::<RawShiftRow>().enumerate() {
        match result.map_err(|e| e.to_string()).and_then(RawShiftRow::into_record) {
            Ok(rec) => log.records.push(rec),
            Err(e) => {
                debug!("skipping malformed shift row {}: {}", line + 2, e);
                log.skipped_rows += 1;
            }
        }
    }
    Ok(log)
}

/// Load the shift participation log from a CSV file.
pub fn load_shift_log(path: &Path) -> Result<ShiftLog, IngestError> {
    if !path.exists() {
        return Err(IngestError::MissingInputTable {
            path: path.display().to_string(),
        });
    }
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let log = load_from_reader(file).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;

    if log.missing_logical_shift_column {
        warn!(
            "{} has no logical_shift_number column; shifts will be grouped on shift_index",
            path.display()
        );
    }
    if log.skipped_rows > 0 {
        warn!("Skipped {} malformed row(s) in {}", log.skipped_rows, path.display());
    }
    info!("Loaded {} shift rows from {}", log.records.len(), path.display());
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "game_id,venue,player_id,position,shift_index,logical_shift_number,\
is_first_segment,shift_duration,logical_shift_duration,jersey_number,gf,ga,cf,ca,ff,fa,\
player_rating,opp_avg_rating";

    #[test]
    fn full_row_parses() {
        let data = format!(
            "{}\n2024020001,home,8478402,C,12,7,True,44.5,,97,1,0,5,3,4,2,81.5,77.0\n",
            HEADER
        );
        let log = load_from_reader(data.as_bytes()).unwrap();
        assert_eq!(log.records.len(), 1);
        assert!(!log.missing_logical_shift_column);
        let r = &log.records[0];
        assert_eq!(r.game_id, "2024020001");
        assert_eq!(r.venue, Venue::Home);
        assert_eq!(r.logical_shift_number, Some(7));
        assert!(r.is_first_segment);
        assert_eq!(r.logical_shift_duration, None);
        assert_eq!(r.jersey_number, Some(97));
        assert_eq!(r.counters.cf, 5);
        assert_eq!(r.counters.fa, 2);
        assert_eq!(r.player_rating, 81.5);
    }

    #[test]
    fn optional_columns_default() {
        let data = "game_id,venue,player_id,shift_index\ng1,Away,p1,3.0\n";
        let log = load_from_reader(data.as_bytes()).unwrap();
        assert!(log.missing_logical_shift_column);
        let r = &log.records[0];
        assert_eq!(r.venue, Venue::Away);
        assert_eq!(r.shift_index, 3);
        assert_eq!(r.logical_shift_number, None);
        assert_eq!(r.logical_shift_key(), 3);
        assert_eq!(r.counters, OnIceCounters::default());
        assert_eq!(r.shift_duration, 0.0);
        assert!(!r.is_first_segment);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let data = format!(
            "{}\n\
g1,home,p1,C,1,1,1,40,,12,0,0,1,1,1,1,0,0\n\
g1,sideline,p2,C,1,1,1,40,,12,0,0,1,1,1,1,0,0\n\
g1,home,p3,C,abc,1,1,40,,12,0,0,1,1,1,1,0,0\n\
g1,home,p4,D,1,1,1,40,,12,0,-1,1,1,1,1,0,0\n\
g1,home,p5,D,1,1,1,40,,#5,0,0,1,1,1,1,0,0\n",
            HEADER
        );
        let log = load_from_reader(data.as_bytes()).unwrap();
        assert_eq!(log.skipped_rows, 3);
        let ids: Vec<&str> = log.records.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p5"]);
        assert_eq!(log.records[1].jersey_number, None);
    }

    #[test]
    fn nan_cells_are_null() {
        let data = format!(
            "{}\ng1,home,p1,LW,4,nan,false,38.0,NaN,,0,0,0,0,0,0,,\n",
            HEADER
        );
        let log = load_from_reader(data.as_bytes()).unwrap();
        let r = &log.records[0];
        assert_eq!(r.logical_shift_number, None);
        assert_eq!(r.logical_shift_duration, None);
        assert_eq!(r.jersey_number, None);
        assert!(!r.is_first_segment);
    }

    #[test]
    fn missing_file_is_reported_as_missing_input() {
        let err = load_shift_log(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, IngestError::MissingInputTable { .. }));
    }
}
