//! Metrics for pipeline runs
//!
//! Metric names live in one enum so call sites never spell them out. The
//! helper modules below group recording functions by pipeline phase.

use std::fmt;
use std::path::Path;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Every metric the pipeline records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Run
    RunsTotal,
    RunDuration,
    StateTransitions,

    // Source
    SourceRowsFetched,
    SourceErrors,

    // Stages
    StageDuration,
    RowsPublished,
    RowsExcluded,
    CoercionFailures,

    // Quality
    QualityChecks,
    QualityGateFailures,
    NullRatio,

    // Aggregation
    ViewFailures,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RunsTotal => "etl_runs_total",
            MetricName::RunDuration => "etl_run_duration_seconds",
            MetricName::StateTransitions => "etl_state_transitions_total",
            MetricName::SourceRowsFetched => "etl_source_rows_fetched_total",
            MetricName::SourceErrors => "etl_source_errors_total",
            MetricName::StageDuration => "etl_stage_duration_seconds",
            MetricName::RowsPublished => "etl_rows_published_total",
            MetricName::RowsExcluded => "etl_rows_excluded_total",
            MetricName::CoercionFailures => "etl_coercion_failures_total",
            MetricName::QualityChecks => "etl_quality_checks_total",
            MetricName::QualityGateFailures => "etl_quality_gate_failures_total",
            MetricName::NullRatio => "etl_null_ratio",
            MetricName::ViewFailures => "etl_view_failures_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            RunsTotal,
            RunDuration,
            StateTransitions,
            SourceRowsFetched,
            SourceErrors,
            StageDuration,
            RowsPublished,
            RowsExcluded,
            CoercionFailures,
            QualityChecks,
            QualityGateFailures,
            NullRatio,
            ViewFailures,
        ]
        .into_iter()
    }

    fn is_histogram(&self) -> bool {
        matches!(
            self,
            MetricName::RunDuration | MetricName::StageDuration | MetricName::NullRatio
        )
    }

    /// (phase, description)
    pub fn metadata(&self) -> (&'static str, &'static str) {
        match self {
            MetricName::RunsTotal => ("run", "Pipeline runs by terminal state"),
            MetricName::RunDuration => ("run", "Wall time of a pipeline run"),
            MetricName::StateTransitions => ("run", "State machine transitions by target state"),
            MetricName::SourceRowsFetched => ("source", "Rows returned by source queries"),
            MetricName::SourceErrors => ("source", "Failed source calls"),
            MetricName::StageDuration => ("stages", "Wall time per stage"),
            MetricName::RowsPublished => ("stages", "Rows published per layer and dataset"),
            MetricName::RowsExcluded => ("stages", "Raw rows excluded during cleaning by reason"),
            MetricName::CoercionFailures => ("stages", "Values set to missing by failed coercion"),
            MetricName::QualityChecks => ("quality", "Validator checks by verdict"),
            MetricName::QualityGateFailures => ("quality", "Gates that stopped publication"),
            MetricName::NullRatio => ("quality", "Null ratio per validated column"),
            MetricName::ViewFailures => ("aggregation", "Gold views that could not be produced"),
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Install the Prometheus recorder. Call once per process.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    describe_all();
    info!("Metrics recorder installed");
    Ok(handle)
}

/// Register a description for every metric with the installed recorder
pub fn describe_all() {
    use ::metrics::{describe_counter, describe_histogram};

    for metric in MetricName::all_metrics() {
        let (_, description) = metric.metadata();
        if metric.is_histogram() {
            describe_histogram!(metric.as_str(), description);
        } else {
            describe_counter!(metric.as_str(), description);
        }
    }
}

/// Write the current Prometheus text exposition to `path`
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, handle.render())?;
    info!("📊 Metrics snapshot written to {}", path.display());
    Ok(())
}

pub mod run {
    use super::MetricName;

    pub fn finished(state: &str, secs: f64) {
        ::metrics::counter!(MetricName::RunsTotal.as_str(), "state" => state.to_string()).increment(1);
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }

    pub fn transition(to: &str) {
        ::metrics::counter!(MetricName::StateTransitions.as_str(), "to" => to.to_string()).increment(1);
    }
}

pub mod source {
    use super::MetricName;

    pub fn rows_fetched(dataset: &str, rows: usize) {
        ::metrics::counter!(MetricName::SourceRowsFetched.as_str(), "dataset" => dataset.to_string())
            .increment(rows as u64);
    }

    pub fn error() {
        ::metrics::counter!(MetricName::SourceErrors.as_str()).increment(1);
    }
}

pub mod stages {
    use super::MetricName;

    pub fn duration(stage: &str, secs: f64) {
        ::metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage.to_string()).record(secs);
    }

    pub fn rows_published(layer: &str, dataset: &str, rows: usize) {
        ::metrics::counter!(
            MetricName::RowsPublished.as_str(),
            "layer" => layer.to_string(),
            "dataset" => dataset.to_string()
        )
        .increment(rows as u64);
    }

    pub fn rows_excluded(reason: &str, rows: usize) {
        ::metrics::counter!(MetricName::RowsExcluded.as_str(), "reason" => reason.to_string())
            .increment(rows as u64);
    }

    pub fn coercion_failures(field: &str, count: usize) {
        ::metrics::counter!(MetricName::CoercionFailures.as_str(), "field" => field.to_string())
            .increment(count as u64);
    }
}

pub mod quality {
    use super::MetricName;

    pub fn check(dataset: &str, verdict: &str) {
        ::metrics::counter!(
            MetricName::QualityChecks.as_str(),
            "dataset" => dataset.to_string(),
            "verdict" => verdict.to_string()
        )
        .increment(1);
    }

    pub fn gate_failure(stage: &str) {
        ::metrics::counter!(MetricName::QualityGateFailures.as_str(), "stage" => stage.to_string())
            .increment(1);
    }

    pub fn null_ratio(dataset: &str, field: &str, ratio: f64) {
        ::metrics::histogram!(
            MetricName::NullRatio.as_str(),
            "dataset" => dataset.to_string(),
            "field" => field.to_string()
        )
        .record(ratio);
    }
}

pub mod aggregation {
    use super::MetricName;

    pub fn view_failure(view: &str) {
        ::metrics::counter!(MetricName::ViewFailures.as_str(), "view" => view.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique_and_prefixed() {
        let names: HashSet<&str> = MetricName::all_metrics().map(|m| m.as_str()).collect();
        assert_eq!(names.len(), MetricName::all_metrics().count());
        assert!(names.iter().all(|n| n.starts_with("etl_")));
    }

    #[test]
    fn test_every_metric_has_a_phase_and_description() {
        let phases = ["run", "source", "stages", "quality", "aggregation"];
        for metric in MetricName::all_metrics() {
            let (phase, description) = metric.metadata();
            assert!(phases.contains(&phase), "{} has unknown phase {}", metric, phase);
            assert!(!description.is_empty());
        }
        assert!(MetricName::StageDuration.is_histogram());
        assert!(!MetricName::RowsPublished.is_histogram());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_all();
        stages::rows_published("silver", "employees", 288);
        quality::check("employees", "pass");
    }
}
