use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::app::ports::{SourceInfo, SourcePort, SourceQuery};
use crate::error::{PipelineError, Result};
use crate::pipeline::dataset::{Record, Value};

/// Reads the source tables from a SQLite database file
pub struct SqliteSourceAdapter {
    path: PathBuf,
}

impl SqliteSourceAdapter {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<Connection> {
        Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| unavailable(path, e))
    }

    fn fetch_blocking(path: &Path, query: SourceQuery) -> Result<Vec<Record>> {
        let conn = Self::open(path)?;
        let mut stmt = conn.prepare(&query.sql()).map_err(|e| unavailable(path, e))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query([]).map_err(|e| unavailable(path, e))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(|e| unavailable(path, e))? {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(|e| unavailable(path, e))?;
                record.set(column, from_sql(value));
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn unavailable(path: &Path, err: rusqlite::Error) -> PipelineError {
    PipelineError::SourceUnavailable(format!("{}: {}", path.display(), err))
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Missing,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Decimal(f),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Text(hex::encode(bytes)),
    }
}

#[async_trait]
impl SourcePort for SqliteSourceAdapter {
    async fn fetch(&self, query: SourceQuery) -> Result<Vec<Record>> {
        let path = self.path.clone();
        debug!("Running source query on {}: {}", path.display(), query.sql());
        let records = tokio::task::spawn_blocking(move || Self::fetch_blocking(&path, query))
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("source task failed: {}", e)))??;
        info!("📥 Fetched {} rows from {}", records.len(), query.table());
        Ok(records)
    }

    async fn ping(&self) -> Result<SourceInfo> {
        let path = self.path.clone();
        let version = tokio::task::spawn_blocking(move || -> Result<String> {
            let conn = Self::open(&path)?;
            conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
                .map_err(|e| unavailable(&path, e))
        })
        .await
        .map_err(|e| PipelineError::SourceUnavailable(format!("source task failed: {}", e)))??;

        Ok(SourceInfo {
            kind: "sqlite",
            location: self.path.display().to_string(),
            detail: format!("SQLite {}", version),
        })
    }
}
