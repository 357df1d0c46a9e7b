pub mod consolidate;
pub mod context;
pub mod engine;
pub mod error;
pub mod h2h;
pub mod line_combos;
pub mod shift_quality;
pub mod wowy;

pub use context::{Partition, PartitionKey, RunContext};
pub use engine::{run, EngineOptions, EngineOutput, RunReport};
pub use error::{AnalyticsError, IssueKind, PartitionIssue};
