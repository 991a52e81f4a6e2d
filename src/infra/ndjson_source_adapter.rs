use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::app::ports::{SourceInfo, SourcePort, SourceQuery};
use crate::error::{PipelineError, Result};
use crate::pipeline::dataset::Record;

/// Source backed by a directory holding one `{Table}.ndjson` file per source table
pub struct NdjsonSourceAdapter {
    dir: PathBuf,
}

impl NdjsonSourceAdapter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn table_path(&self, query: SourceQuery) -> PathBuf {
        self.dir.join(format!("{}.ndjson", query.table()))
    }
}

/// Parse NDJSON text, keeping only `columns` (in that order) from each object
pub fn parse_records(text: &str, columns: &[&str]) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let object = value.as_object().ok_or_else(|| {
            PipelineError::SourceUnavailable(format!("expected a JSON object per line, got: {}", line))
        })?;
        let full = Record::from_json_object(object);
        let record = columns
            .iter()
            .filter(|c| full.contains(c))
            .map(|c| (c.to_string(), full.get(c).clone()))
            .collect();
        records.push(record);
    }
    Ok(records)
}

#[async_trait]
impl SourcePort for NdjsonSourceAdapter {
    async fn fetch(&self, query: SourceQuery) -> Result<Vec<Record>> {
        let path = self.table_path(query);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {}", path.display(), e)))?;
        let records = parse_records(&text, query.columns())?;
        info!("📥 Read {} rows from {}", records.len(), path.display());
        Ok(records)
    }

    async fn ping(&self) -> Result<SourceInfo> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            return Err(PipelineError::SourceUnavailable(format!(
                "{} does not exist",
                self.dir.display()
            )));
        }
        let mut present = Vec::new();
        for query in SourceQuery::ALL {
            if tokio::fs::try_exists(self.table_path(query)).await.unwrap_or(false) {
                present.push(query.table());
            }
        }
        Ok(SourceInfo {
            kind: "ndjson",
            location: self.dir.display().to_string(),
            detail: format!("tables: {}", present.join(", ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::Value;
    use tempfile::TempDir;

    #[test]
    fn test_parse_projects_known_columns() {
        let text = "{\"EmployeeKey\": 1, \"Extra\": true, \"FirstName\": \"Guy\"}\n\n{\"EmployeeKey\": null}\n";
        let records = parse_records(text, SourceQuery::Employees.columns()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].field_names().collect::<Vec<_>>(),
            vec!["EmployeeKey", "FirstName"]
        );
        assert_eq!(records[1].get("EmployeeKey"), &Value::Missing);
    }

    #[tokio::test]
    async fn test_fetch_and_ping() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("DimDepartmentGroup.ndjson"),
            "{\"DepartmentGroupKey\": 1, \"DepartmentGroupName\": \"Corporate\"}\n",
        )
        .unwrap();
        let adapter = NdjsonSourceAdapter::new(dir.path());

        let records = adapter.fetch(SourceQuery::Departments).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(adapter.fetch(SourceQuery::Employees).await.is_err());

        let info = adapter.ping().await.unwrap();
        assert_eq!(info.detail, "tables: DimDepartmentGroup");
    }
}
