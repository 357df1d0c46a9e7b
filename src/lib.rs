//! Shift analytics engine.
//!
//! Turns a per-game shift participation log into four derived views:
//! head-to-head pairs, with-or-without-you differentials, line combinations
//! and shift quality scores.
//!
//! ```no_run
//! use shift_analytics::analytics::{run, EngineOptions, RunContext};
//! use shift_analytics::ingest::load_shift_log;
//!
//! let log = load_shift_log(std::path::Path::new("shifts.csv")).unwrap();
//! let ctx = RunContext::from_log(log);
//! let output = run(&ctx, &EngineOptions::default());
//! println!("{} H2H pairs", output.h2h.len());
//! ```

pub mod analytics;
pub mod config;
pub mod db;
pub mod ingest;

pub use analytics::{run, EngineOptions, EngineOutput, RunContext, RunReport};
pub use db::models::{
    H2HPair, LineCombo, ShiftParticipationRecord, ShiftQualityRecord, ShiftQualitySummary,
    Venue, WowyPair,
};
