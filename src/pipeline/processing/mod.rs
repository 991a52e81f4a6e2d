// Pipeline stages: raw ingestion, cleaning and aggregation, plus the validator they share

pub mod aggregate;
pub mod clean;
pub mod quality_gate;
pub mod raw;

pub use aggregate::{aggregate, AggregateOutput, AggregateView, ViewFailure, ViewKind};
pub use clean::{clean, CleanOutput, CleaningRules, CleaningStats};
pub use quality_gate::{validate, QualityReport, Ruleset, Verdict};
pub use raw::{ingest, RawOutput};
