// Medallion pipeline: datasets, per-run state, stages and the orchestrator driving them

pub mod dataset;
pub mod orchestrator;
pub mod processing;
pub mod run_context;

pub use dataset::{Dataset, Record, Stage, Value};
pub use orchestrator::{PipelineOrchestrator, StageSelector};
pub use run_context::{PipelineState, RunContext};
