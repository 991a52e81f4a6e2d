use std::time::Duration;

use async_trait::async_trait;

use crate::constants::{DEPARTMENT_COLUMNS, DEPARTMENT_DATASET, EMPLOYEE_COLUMNS, EMPLOYEE_DATASET};
use crate::error::Result;
use crate::pipeline::dataset::{Dataset, Record, Stage};
use crate::pipeline::processing::aggregate::ViewFailure;
use crate::pipeline::processing::clean::CleaningStats;
use crate::pipeline::processing::quality_gate::QualityReport;
use crate::pipeline::run_context::{RunContext, StateTransition};

/// The fixed set of queries the pipeline runs against the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceQuery {
    Employees,
    Departments,
}

impl SourceQuery {
    pub const ALL: [SourceQuery; 2] = [SourceQuery::Employees, SourceQuery::Departments];

    pub fn table(&self) -> &'static str {
        match self {
            SourceQuery::Employees => "DimEmployee",
            SourceQuery::Departments => "DimDepartmentGroup",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            SourceQuery::Employees => EMPLOYEE_COLUMNS,
            SourceQuery::Departments => DEPARTMENT_COLUMNS,
        }
    }

    /// Name of the raw dataset the query feeds
    pub fn dataset_name(&self) -> &'static str {
        match self {
            SourceQuery::Employees => EMPLOYEE_DATASET,
            SourceQuery::Departments => DEPARTMENT_DATASET,
        }
    }

    pub fn sql(&self) -> String {
        let columns = self
            .columns()
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {} FROM \"{}\"", columns, self.table())
    }
}

/// What a successful connectivity check learned about the source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub kind: &'static str,
    pub location: String,
    pub detail: String,
}

#[async_trait]
pub trait SourcePort: Send + Sync {
    /// Run `query` and return every row. Errors surface as `SourceUnavailable`.
    async fn fetch(&self, query: SourceQuery) -> Result<Vec<Record>>;
    async fn ping(&self) -> Result<SourceInfo>;
}

#[async_trait]
pub trait PublishPort: Send + Sync {
    /// Replace the `{name}_latest` artifact of `layer` and return where it was written
    async fn publish(&self, dataset: &Dataset, layer: Stage, name: &str) -> Result<String>;
    /// Read back the current `{name}_latest` artifact of `layer`
    async fn load(&self, layer: Stage, name: &str) -> Result<Dataset>;
}

/// Things worth telling the outside world about while a run progresses
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    RunStarted {
        ctx: &'a RunContext,
    },
    StageStarted {
        stage: Stage,
        dataset: &'a str,
    },
    StageFinished {
        stage: Stage,
        dataset: &'a str,
        rows: usize,
        elapsed: Duration,
    },
    Quality {
        report: &'a QualityReport,
    },
    Cleaned {
        stats: &'a CleaningStats,
    },
    Published {
        stage: Stage,
        dataset: &'a Dataset,
        location: &'a str,
    },
    Transition {
        transition: &'a StateTransition,
    },
    ViewFailed {
        failure: &'a ViewFailure,
    },
    RunFinished {
        ctx: &'a RunContext,
        elapsed: Duration,
    },
}

/// Receives pipeline events. Must not influence control flow.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>);
}

/// Observer that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_employee_query_selects_every_column() {
        let sql = SourceQuery::Employees.sql();
        assert!(sql.starts_with("SELECT \"EmployeeKey\""));
        assert!(sql.ends_with("FROM \"DimEmployee\""));
        assert_eq!(sql.matches(',').count(), EMPLOYEE_COLUMNS.len() - 1);
    }
}
