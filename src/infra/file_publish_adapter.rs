use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::app::ports::PublishPort;
use crate::error::{PipelineError, Result};
use crate::pipeline::dataset::{Dataset, DatasetMeta, Record, Stage};

/// Persists each dataset as NDJSON under `{root}/{layer}/{name}_latest.ndjson`
/// with a `{name}_latest.meta.json` sidecar. Publication overwrites the latest
/// artifact atomically (write to a temp file, then rename).
pub struct FilePublishAdapter {
    root: PathBuf,
    retain_history: bool,
}

impl FilePublishAdapter {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            retain_history: false,
        }
    }

    /// Also keep a timestamped copy of every publication
    pub fn with_history(mut self, retain_history: bool) -> Self {
        self.retain_history = retain_history;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn latest_path(&self, layer: Stage, name: &str) -> PathBuf {
        self.root
            .join(layer.layer_name())
            .join(format!("{}_latest.ndjson", name))
    }

    pub fn meta_path(&self, layer: Stage, name: &str) -> PathBuf {
        self.root
            .join(layer.layer_name())
            .join(format!("{}_latest.meta.json", name))
    }
}

fn to_ndjson(dataset: &Dataset) -> Result<String> {
    let mut out = String::new();
    for record in dataset.records() {
        out.push_str(&serde_json::to_string(&record.to_json())?);
        out.push('\n');
    }
    Ok(out)
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl PublishPort for FilePublishAdapter {
    async fn publish(&self, dataset: &Dataset, layer: Stage, name: &str) -> Result<String> {
        let dir = self.root.join(layer.layer_name());
        tokio::fs::create_dir_all(&dir).await?;

        let body = to_ndjson(dataset)?;
        let latest = self.latest_path(layer, name);
        write_atomic(&latest, body.as_bytes()).await?;

        let meta = serde_json::to_vec_pretty(&dataset.meta())?;
        write_atomic(&self.meta_path(layer, name), &meta).await?;

        if self.retain_history {
            let stamped = dir.join(format!(
                "{}_{}.ndjson",
                name,
                dataset.published_at.format("%Y%m%d_%H%M%S")
            ));
            tokio::fs::write(&stamped, body.as_bytes()).await?;
            debug!("Kept history copy {}", stamped.display());
        }

        info!(
            "💾 Published {}/{} ({} rows) to {}",
            layer.layer_name(),
            name,
            dataset.row_count(),
            latest.display()
        );
        Ok(latest.display().to_string())
    }

    async fn load(&self, layer: Stage, name: &str) -> Result<Dataset> {
        let latest = self.latest_path(layer, name);
        let meta_path = self.meta_path(layer, name);
        if !tokio::fs::try_exists(&latest).await? || !tokio::fs::try_exists(&meta_path).await? {
            return Err(PipelineError::NotPublished {
                layer: layer.layer_name().to_string(),
                name: name.to_string(),
            });
        }

        let meta: DatasetMeta = serde_json::from_slice(&tokio::fs::read(&meta_path).await?)?;
        let text = tokio::fs::read_to_string(&latest).await?;
        let corrupt = |reason: String| PipelineError::CorruptArtifact {
            path: latest.display().to_string(),
            reason,
        };

        let mut records = Vec::with_capacity(meta.row_count);
        for (index, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let value: serde_json::Value = serde_json::from_str(line)?;
            let object = value
                .as_object()
                .ok_or_else(|| corrupt(format!("line {} is not a JSON object", index + 1)))?;
            records.push(Record::from_json_object(object));
        }
        if records.len() != meta.row_count {
            return Err(corrupt(format!(
                "{} rows on disk, metadata records {}",
                records.len(),
                meta.row_count
            )));
        }

        let dataset = Dataset::with_schema(&meta.name, meta.stage, meta.published_at, meta.schema, records);
        if dataset.fingerprint() != meta.fingerprint {
            return Err(corrupt("content does not match the recorded fingerprint".to_string()));
        }

        debug!("Loaded {} rows from {}", dataset.row_count(), latest.display());
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::Value;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        let ts = NaiveDate::from_ymd_opt(2024, 6, 30)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap();
        Dataset::new(
            "employees",
            Stage::Silver,
            ts,
            vec![
                Record::new()
                    .with("EmployeeKey", 1i64)
                    .with("HireDate", NaiveDate::from_ymd_opt(2006, 7, 31).unwrap())
                    .with("BaseRate", 12.45),
                Record::new()
                    .with("EmployeeKey", 2i64)
                    .with("HireDate", Value::Missing)
                    .with("BaseRate", 20.0),
            ],
        )
    }

    #[tokio::test]
    async fn test_publish_then_load_preserves_content() {
        let dir = TempDir::new().unwrap();
        let adapter = FilePublishAdapter::new(dir.path());
        let original = dataset();

        let location = adapter.publish(&original, Stage::Silver, "employees").await.unwrap();
        assert!(location.ends_with("silver/employees_latest.ndjson"));

        let loaded = adapter.load(Stage::Silver, "employees").await.unwrap();
        assert_eq!(loaded.schema(), original.schema());
        assert_eq!(loaded.row_count(), 2);
        assert_eq!(loaded.published_at, original.published_at);
        assert_eq!(loaded.fingerprint(), original.fingerprint());
    }

    #[tokio::test]
    async fn test_republish_overwrites_latest() {
        let dir = TempDir::new().unwrap();
        let adapter = FilePublishAdapter::new(dir.path());
        let ds = dataset();

        adapter.publish(&ds, Stage::Silver, "employees").await.unwrap();
        adapter.publish(&ds, Stage::Silver, "employees").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("silver"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries.len(), 2, "only latest + meta: {:?}", entries);
    }

    #[tokio::test]
    async fn test_history_copy_is_timestamped() {
        let dir = TempDir::new().unwrap();
        let adapter = FilePublishAdapter::new(dir.path()).with_history(true);
        adapter.publish(&dataset(), Stage::Raw, "dimemployee").await.unwrap();

        assert!(dir
            .path()
            .join("bronze")
            .join("dimemployee_20240630_101500.ndjson")
            .exists());
    }

    #[tokio::test]
    async fn test_load_unpublished_is_error() {
        let dir = TempDir::new().unwrap();
        let adapter = FilePublishAdapter::new(dir.path());
        let err = adapter.load(Stage::Gold, "hiring_trends").await.unwrap_err();
        assert!(matches!(err, PipelineError::NotPublished { .. }));
    }

    async fn published(dir: &TempDir) -> (FilePublishAdapter, Vec<String>) {
        let adapter = FilePublishAdapter::new(dir.path());
        let mut ds = dataset().into_records();
        ds.push(Record::new().with("EmployeeKey", 3i64).with("BaseRate", 31.5));
        let ds = Dataset::new("dimemployee", Stage::Raw, dataset().published_at, ds);
        adapter.publish(&ds, Stage::Raw, "dimemployee").await.unwrap();

        let body = std::fs::read_to_string(adapter.latest_path(Stage::Raw, "dimemployee")).unwrap();
        let lines = body.lines().map(str::to_string).collect();
        (adapter, lines)
    }

    #[tokio::test]
    async fn test_load_rejects_non_object_line() {
        let dir = TempDir::new().unwrap();
        let (adapter, mut lines) = published(&dir).await;
        assert_eq!(lines.len(), 3);
        lines[1] = r#"["not","a","record"]"#.to_string();
        std::fs::write(adapter.latest_path(Stage::Raw, "dimemployee"), lines.join("\n")).unwrap();

        let err = adapter.load(Stage::Raw, "dimemployee").await.unwrap_err();
        assert!(matches!(err, PipelineError::CorruptArtifact { .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_load_rejects_truncated_artifact() {
        let dir = TempDir::new().unwrap();
        let (adapter, lines) = published(&dir).await;
        std::fs::write(adapter.latest_path(Stage::Raw, "dimemployee"), lines[..2].join("\n")).unwrap();

        let err = adapter.load(Stage::Raw, "dimemployee").await.unwrap_err();
        match err {
            PipelineError::CorruptArtifact { reason, .. } => assert!(reason.contains("2 rows")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_load_rejects_edited_values() {
        let dir = TempDir::new().unwrap();
        let (adapter, mut lines) = published(&dir).await;
        lines[2] = lines[2].replace("31.5", "99.5");
        std::fs::write(adapter.latest_path(Stage::Raw, "dimemployee"), lines.join("\n")).unwrap();

        let err = adapter.load(Stage::Raw, "dimemployee").await.unwrap_err();
        assert!(matches!(err, PipelineError::CorruptArtifact { .. }));
    }
}
