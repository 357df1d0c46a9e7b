use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::analytics::EngineOutput;

/// SQLite warehouse for the derived tables (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Derived tables ────────────────────────────────────────────────────────

    /// Replace every derived table with this run's output and log the run.
    ///
    /// All-or-nothing: a failure part way leaves the previous run in place.
    pub fn replace_derived_tables(
        &self,
        output: &EngineOutput,
        started_at: DateTime<Utc>,
    ) -> Result<i64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM h2h; DELETE FROM wowy; DELETE FROM line_combos;
             DELETE FROM shift_quality; DELETE FROM shift_quality_summary;",
        )?;
        insert_h2h(&tx, &output.h2h)?;
        insert_wowy(&tx, &output.wowy)?;
        insert_line_combos(&tx, &output.line_combos)?;
        insert_shift_quality(&tx, &output.shift_quality)?;
        insert_shift_quality_summary(&tx, &output.shift_quality_summary)?;
        tx.execute(
            "INSERT INTO etl_runs (
                started_at, finished_at, records_in, rows_skipped, partitions_total,
                partitions_processed, issues, h2h_rows, wowy_rows,
                line_combo_rows, shift_quality_rows, summary_rows
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                started_at,
                Utc::now(),
                output.report.records_in as i64,
                output.report.rows_skipped as i64,
                output.report.partitions_total as i64,
                output.report.partitions_processed as i64,
                serde_json::to_string(&output.report.issues)?,
                output.h2h.len() as i64,
                output.wowy.len() as i64,
                output.line_combos.len() as i64,
                output.shift_quality.len() as i64,
                output.shift_quality_summary.len() as i64,
            ],
        )?;
        let run_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(run_id)
    }

    /// Look up one H2H row by its string key
    pub fn get_h2h(&self, key: &str) -> Result<Option<H2HPair>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT key, game_id, venue, player_1_id, player_2_id, shifts_together,
                    shift_numbers, toi_together, goals_for, goals_against,
                    corsi_for, corsi_against, fenwick_for, fenwick_against,
                    cf_pct, ff_pct, plus_minus
             FROM h2h WHERE key = ?1",
        )?;
        let pair = stmt.query_row(params![key], map_h2h).optional()?;
        Ok(pair)
    }

    /// Row counts per derived table
    pub fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<i64> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        };
        Ok(TableCounts {
            h2h: count("h2h")?,
            wowy: count("wowy")?,
            line_combos: count("line_combos")?,
            shift_quality: count("shift_quality")?,
            shift_quality_summary: count("shift_quality_summary")?,
        })
    }

    /// Most recent runs first
    pub fn list_runs(&self, limit: i64) -> Result<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, records_in, rows_skipped,
                    partitions_total, partitions_processed, h2h_rows, wowy_rows
             FROM etl_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    records_in: row.get(3)?,
                    rows_skipped: row.get(4)?,
                    partitions_total: row.get(5)?,
                    partitions_processed: row.get(6)?,
                    h2h_rows: row.get(7)?,
                    wowy_rows: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn insert_h2h(tx: &Transaction, rows: &[H2HPair]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO h2h (
            key, game_id, venue, player_1_id, player_2_id, shifts_together,
            shift_numbers, toi_together, goals_for, goals_against,
            corsi_for, corsi_against, fenwick_for, fenwick_against,
            cf_pct, ff_pct, plus_minus
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
    )?;
    for p in rows {
        stmt.execute(params![
            p.key,
            p.game_id,
            p.venue.as_str(),
            p.player_1_id,
            p.player_2_id,
            p.shifts_together,
            serde_json::to_string(&p.shift_numbers)?,
            p.toi_together,
            p.goals_for,
            p.goals_against,
            p.corsi_for,
            p.corsi_against,
            p.fenwick_for,
            p.fenwick_against,
            p.cf_pct,
            p.ff_pct,
            p.plus_minus,
        ])?;
    }
    Ok(())
}

fn insert_wowy(tx: &Transaction, rows: &[WowyPair]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO wowy (
            key, game_id, venue, player_1_id, player_2_id,
            p1_total_shifts, p2_total_shifts, shifts_together,
            p1_shifts_without_p2, p2_shifts_without_p1,
            toi_together, cf_pct_together, gf_pct_together,
            toi_apart, goals_for_apart, goals_against_apart,
            corsi_for_apart, corsi_against_apart, cf_pct_apart, gf_pct_apart,
            p1_cf_pct_without_p2, p2_cf_pct_without_p1, cf_pct_delta, gf_pct_delta
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24)",
    )?;
    for w in rows {
        stmt.execute(params![
            w.key,
            w.game_id,
            w.venue.as_str(),
            w.player_1_id,
            w.player_2_id,
            w.p1_total_shifts,
            w.p2_total_shifts,
            w.shifts_together,
            w.p1_shifts_without_p2,
            w.p2_shifts_without_p1,
            w.toi_together,
            w.cf_pct_together,
            w.gf_pct_together,
            w.toi_apart,
            w.goals_for_apart,
            w.goals_against_apart,
            w.corsi_for_apart,
            w.corsi_against_apart,
            w.cf_pct_apart,
            w.gf_pct_apart,
            w.p1_cf_pct_without_p2,
            w.p2_cf_pct_without_p1,
            w.cf_pct_delta,
            w.gf_pct_delta,
        ])?;
    }
    Ok(())
}

fn insert_line_combos(tx: &Transaction, rows: &[LineCombo]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO line_combos (
            key, game_id, venue, combo_type, player_ids, jersey_numbers,
            shifts, toi, goals_for, goals_against, corsi_for, corsi_against,
            fenwick_for, fenwick_against, cf_pct, ff_pct, plus_minus
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
    )?;
    for c in rows {
        stmt.execute(params![
            c.key,
            c.game_id,
            c.venue.as_str(),
            c.combo_type.as_str(),
            serde_json::to_string(&c.player_ids)?,
            serde_json::to_string(&c.jersey_numbers)?,
            c.shifts,
            c.toi,
            c.goals_for,
            c.goals_against,
            c.corsi_for,
            c.corsi_against,
            c.fenwick_for,
            c.fenwick_against,
            c.cf_pct,
            c.ff_pct,
            c.plus_minus,
        ])?;
    }
    Ok(())
}

fn insert_shift_quality(tx: &Transaction, rows: &[ShiftQualityRecord]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO shift_quality (
            key, game_id, venue, player_id, logical_shift_number, shift_duration,
            plus_minus, duration_score, pm_score, quality_score, quality_tier
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
    )?;
    for q in rows {
        stmt.execute(params![
            q.key,
            q.game_id,
            q.venue.as_str(),
            q.player_id,
            q.logical_shift_number,
            q.shift_duration,
            q.plus_minus,
            q.duration_score,
            q.pm_score,
            q.quality_score,
            q.quality_tier.as_str(),
        ])?;
    }
    Ok(())
}

fn insert_shift_quality_summary(tx: &Transaction, rows: &[ShiftQualitySummary]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO shift_quality_summary (
            key, game_id, venue, player_id, logical_shifts, toi_seconds,
            avg_quality_score, excellent_shifts, good_shifts, average_shifts,
            poor_shifts, cf_pct, plus_minus, player_rating, qoc, expected_pm,
            pm_vs_expected, performance
         ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
    )?;
    for s in rows {
        stmt.execute(params![
            s.key,
            s.game_id,
            s.venue.as_str(),
            s.player_id,
            s.logical_shifts,
            s.toi_seconds,
            s.avg_quality_score,
            s.excellent_shifts,
            s.good_shifts,
            s.average_shifts,
            s.poor_shifts,
            s.cf_pct,
            s.plus_minus,
            s.player_rating,
            s.qoc,
            s.expected_pm,
            s.pm_vs_expected,
            s.performance.as_str(),
        ])?;
    }
    Ok(())
}

fn map_h2h(row: &rusqlite::Row) -> rusqlite::Result<H2HPair> {
    let venue: String = row.get(2)?;
    let shift_numbers: String = row.get(6)?;
    Ok(H2HPair {
        key: row.get(0)?,
        game_id: row.get(1)?,
        venue: Venue::parse(&venue).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown venue '{}'", venue).into(),
            )
        })?,
        player_1_id: row.get(3)?,
        player_2_id: row.get(4)?,
        shifts_together: row.get(5)?,
        shift_numbers: serde_json::from_str(&shift_numbers).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?,
        toi_together: row.get(7)?,
        goals_for: row.get(8)?,
        goals_against: row.get(9)?,
        corsi_for: row.get(10)?,
        corsi_against: row.get(11)?,
        fenwick_for: row.get(12)?,
        fenwick_against: row.get(13)?,
        cf_pct: row.get(14)?,
        ff_pct: row.get(15)?,
        plus_minus: row.get(16)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS etl_runs (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at           TEXT    NOT NULL,
    finished_at          TEXT    NOT NULL,
    records_in           INTEGER NOT NULL,
    rows_skipped         INTEGER NOT NULL DEFAULT 0,
    partitions_total     INTEGER NOT NULL,
    partitions_processed INTEGER NOT NULL,
    issues               TEXT    NOT NULL DEFAULT '[]',
    h2h_rows             INTEGER NOT NULL,
    wowy_rows            INTEGER NOT NULL,
    line_combo_rows      INTEGER NOT NULL,
    shift_quality_rows   INTEGER NOT NULL,
    summary_rows         INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS h2h (
    key             TEXT    NOT NULL,
    game_id         TEXT    NOT NULL,
    venue           TEXT    NOT NULL,
    player_1_id     TEXT    NOT NULL,
    player_2_id     TEXT    NOT NULL,
    shifts_together INTEGER NOT NULL,
    shift_numbers   TEXT    NOT NULL,
    toi_together    REAL    NOT NULL,
    goals_for       INTEGER NOT NULL,
    goals_against   INTEGER NOT NULL,
    corsi_for       INTEGER NOT NULL,
    corsi_against   INTEGER NOT NULL,
    fenwick_for     INTEGER NOT NULL,
    fenwick_against INTEGER NOT NULL,
    cf_pct          REAL    NOT NULL,
    ff_pct          REAL    NOT NULL,
    plus_minus      INTEGER NOT NULL,
    PRIMARY KEY (game_id, venue, player_1_id, player_2_id)
);

CREATE TABLE IF NOT EXISTS wowy (
    key                  TEXT    NOT NULL,
    game_id              TEXT    NOT NULL,
    venue                TEXT    NOT NULL,
    player_1_id          TEXT    NOT NULL,
    player_2_id          TEXT    NOT NULL,
    p1_total_shifts      INTEGER NOT NULL,
    p2_total_shifts      INTEGER NOT NULL,
    shifts_together      INTEGER NOT NULL,
    p1_shifts_without_p2 INTEGER NOT NULL,
    p2_shifts_without_p1 INTEGER NOT NULL,
    toi_together         REAL    NOT NULL,
    cf_pct_together      REAL    NOT NULL,
    gf_pct_together      REAL    NOT NULL,
    toi_apart            REAL    NOT NULL,
    goals_for_apart      INTEGER NOT NULL,
    goals_against_apart  INTEGER NOT NULL,
    corsi_for_apart      INTEGER NOT NULL,
    corsi_against_apart  INTEGER NOT NULL,
    cf_pct_apart         REAL    NOT NULL,
    gf_pct_apart         REAL    NOT NULL,
    p1_cf_pct_without_p2 REAL    NOT NULL,
    p2_cf_pct_without_p1 REAL    NOT NULL,
    cf_pct_delta         REAL    NOT NULL,
    gf_pct_delta         REAL    NOT NULL,
    PRIMARY KEY (game_id, venue, player_1_id, player_2_id)
);

CREATE TABLE IF NOT EXISTS line_combos (
    key             TEXT    NOT NULL,
    game_id         TEXT    NOT NULL,
    venue           TEXT    NOT NULL,
    combo_type      TEXT    NOT NULL,
    player_ids      TEXT    NOT NULL,
    jersey_numbers  TEXT    NOT NULL,
    shifts          INTEGER NOT NULL,
    toi             REAL    NOT NULL,
    goals_for       INTEGER NOT NULL,
    goals_against   INTEGER NOT NULL,
    corsi_for       INTEGER NOT NULL,
    corsi_against   INTEGER NOT NULL,
    fenwick_for     INTEGER NOT NULL,
    fenwick_against INTEGER NOT NULL,
    cf_pct          REAL    NOT NULL,
    ff_pct          REAL    NOT NULL,
    plus_minus      INTEGER NOT NULL,
    PRIMARY KEY (game_id, venue, combo_type, player_ids)
);

CREATE TABLE IF NOT EXISTS shift_quality (
    key                  TEXT    NOT NULL,
    game_id              TEXT    NOT NULL,
    venue                TEXT    NOT NULL,
    player_id            TEXT    NOT NULL,
    logical_shift_number INTEGER NOT NULL,
    shift_duration       REAL    NOT NULL,
    plus_minus           INTEGER NOT NULL,
    duration_score       REAL    NOT NULL,
    pm_score             REAL    NOT NULL,
    quality_score        REAL    NOT NULL,
    quality_tier         TEXT    NOT NULL,
    PRIMARY KEY (game_id, venue, player_id, logical_shift_number)
);

CREATE TABLE IF NOT EXISTS shift_quality_summary (
    key               TEXT    NOT NULL,
    game_id           TEXT    NOT NULL,
    venue             TEXT    NOT NULL,
    player_id         TEXT    NOT NULL,
    logical_shifts    INTEGER NOT NULL,
    toi_seconds       REAL    NOT NULL,
    avg_quality_score REAL    NOT NULL,
    excellent_shifts  INTEGER NOT NULL,
    good_shifts       INTEGER NOT NULL,
    average_shifts    INTEGER NOT NULL,
    poor_shifts       INTEGER NOT NULL,
    cf_pct            REAL    NOT NULL,
    plus_minus        INTEGER NOT NULL,
    player_rating     REAL    NOT NULL,
    qoc               REAL    NOT NULL,
    expected_pm       REAL    NOT NULL,
    pm_vs_expected    REAL    NOT NULL,
    performance       TEXT    NOT NULL,
    PRIMARY KEY (game_id, venue, player_id)
);

CREATE INDEX IF NOT EXISTS idx_h2h_key ON h2h(key);
CREATE INDEX IF NOT EXISTS idx_wowy_key ON wowy(key);
CREATE INDEX IF NOT EXISTS idx_line_combos_key ON line_combos(key);
CREATE INDEX IF NOT EXISTS idx_shift_quality_key ON shift_quality(key);
CREATE INDEX IF NOT EXISTS idx_shift_quality_summary_key ON shift_quality_summary(key);
"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub h2h: i64,
    pub wowy: i64,
    pub line_combos: i64,
    pub shift_quality: i64,
    pub shift_quality_summary: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_in: i64,
    pub rows_skipped: i64,
    pub partitions_total: i64,
    pub partitions_processed: i64,
    pub h2h_rows: i64,
    pub wowy_rows: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::shift_rows;
    use crate::analytics::{run, EngineOptions, RunContext};
    use crate::db::models::{OnIceCounters, ShiftParticipationRecord};

    fn rec(player_id: &str, position: &str, shift: i64) -> ShiftParticipationRecord {
        ShiftParticipationRecord {
            game_id: "g1".into(),
            venue: Venue::Home,
            player_id: player_id.into(),
            position: position.into(),
            shift_index: shift,
            logical_shift_number: Some(shift),
            is_first_segment: true,
            shift_duration: 50.0,
            logical_shift_duration: None,
            jersey_number: Some(10),
            counters: OnIceCounters {
                gf: 1,
                ga: 0,
                cf: 5,
                ca: 3,
                ff: 4,
                fa: 2,
            },
            player_rating: 0.0,
            opp_avg_rating: 0.0,
        }
    }

    fn sample_output() -> EngineOutput {
        let mut rows = Vec::new();
        for n in 1..=3 {
            rows.push(rec("a", "C", n));
            rows.push(rec("b", "LW", n));
            rows.push(rec("c", "D", n));
        }
        run(&RunContext::new(rows), &EngineOptions { parallel: false })
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        let output = sample_output();
        let run_id = db.replace_derived_tables(&output, Utc::now()).unwrap();
        assert!(run_id > 0);

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.h2h, 3);
        assert_eq!(counts.wowy, 3);
        assert_eq!(counts.line_combos, 2);
        assert_eq!(counts.shift_quality, 9);
        assert_eq!(counts.shift_quality_summary, 3);

        let pair = db.get_h2h("H2H_g1_home_a_b").unwrap().expect("row stored");
        assert_eq!(pair, output.h2h[0]);
        assert_eq!(pair.shift_numbers, vec![1, 2, 3]);
        assert!(db.get_h2h("H2H_g1_home_x_y").unwrap().is_none());
    }

    #[test]
    fn same_ids_on_both_benches_and_underscored_ids_store_cleanly() {
        let mut rows = Vec::new();
        for venue in [Venue::Home, Venue::Away] {
            rows.extend(shift_rows("g1", venue, 1, &[("a", "C"), ("b", "LW")], (1, 0, 2, 1)));
        }
        // "a_b"+"c" and "a"+"b_c" render the same string key.
        rows.extend(shift_rows("g2", Venue::Home, 1, &[("a_b", "C"), ("c", "LW")], (0, 0, 1, 1)));
        rows.extend(shift_rows("g2", Venue::Home, 2, &[("a", "C"), ("b_c", "LW")], (0, 1, 0, 2)));
        let output = run(&RunContext::new(rows), &EngineOptions { parallel: false });
        assert_eq!(output.h2h.len(), 4);
        assert!(output.h2h.iter().any(|p| p.key == "H2H_g1_home_a_b"));
        assert!(output.h2h.iter().any(|p| p.key == "H2H_g1_away_a_b"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        db.replace_derived_tables(&output, Utc::now()).unwrap();

        let counts = db.table_counts().unwrap();
        assert_eq!(counts.h2h, 4);
        assert_eq!(counts.wowy, 4);
        assert_eq!(counts.line_combos, 4);
        assert_eq!(counts.shift_quality_summary, 8);
        let away = db.get_h2h("H2H_g1_away_a_b").unwrap().expect("away pair stored");
        assert_eq!(away.venue, Venue::Away);
    }

    #[test]
    fn rerun_replaces_rather_than_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        let output = sample_output();
        db.replace_derived_tables(&output, Utc::now()).unwrap();
        db.replace_derived_tables(&output, Utc::now()).unwrap();

        assert_eq!(db.table_counts().unwrap().h2h, 3);
        let runs = db.list_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].id > runs[1].id);
        assert_eq!(runs[0].h2h_rows, 3);
        assert_eq!(runs[0].rows_skipped, 0);
    }
}
