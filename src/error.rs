use thiserror::Error;

use crate::pipeline::processing::quality_gate::{CheckKind, Verdict};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Schema violation in {stage} stage: required field '{field}' is absent")]
    SchemaViolation { stage: String, field: String },

    #[error("Quality gate failed in {stage} stage: {check} check{} returned {verdict}", on_field(.field))]
    QualityGateFailure {
        stage: String,
        check: CheckKind,
        field: Option<String>,
        verdict: Verdict,
    },

    #[error("Aggregate view '{view}' could not be produced: {reason}")]
    PartialAggregateFailure { view: String, reason: String },

    /// Non-fatal: reported as a warning and flagged on the run context
    #[error("Dataset '{0}' has no rows")]
    EmptyInput(String),

    #[error("Artifact '{path}' is corrupt: {reason}")]
    CorruptArtifact { path: String, reason: String },

    #[error("Dataset '{layer}/{name}' has not been published")]
    NotPublished { layer: String, name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn on_field(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|f| format!(" on '{}'", f))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_failure_names_check_and_field() {
        let err = PipelineError::QualityGateFailure {
            stage: "silver".to_string(),
            check: CheckKind::NullRatio,
            field: Some("DepartmentName".to_string()),
            verdict: Verdict::Fail,
        };
        let message = err.to_string();
        assert!(message.contains("silver"));
        assert!(message.contains("on 'DepartmentName'"));
    }

    #[test]
    fn test_empty_input_names_dataset() {
        let err = PipelineError::EmptyInput("dimemployee".to_string());
        assert_eq!(err.to_string(), "Dataset 'dimemployee' has no rows");
    }
}
