use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::ports::{PublishPort, SourceInfo, SourcePort, SourceQuery};
use crate::error::{PipelineError, Result};
use crate::pipeline::dataset::{Dataset, Record, Stage};

/// Source serving canned rows, for tests and dry runs
#[derive(Default)]
pub struct InMemorySource {
    tables: HashMap<SourceQuery, Vec<Record>>,
    unavailable: bool,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, query: SourceQuery, rows: Vec<Record>) -> Self {
        self.tables.insert(query, rows);
        self
    }

    /// A source every call to fails with `SourceUnavailable`
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl SourcePort for InMemorySource {
    async fn fetch(&self, query: SourceQuery) -> Result<Vec<Record>> {
        if self.unavailable {
            return Err(PipelineError::SourceUnavailable(
                "in-memory source marked unavailable".to_string(),
            ));
        }
        Ok(self.tables.get(&query).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<SourceInfo> {
        if self.unavailable {
            return Err(PipelineError::SourceUnavailable(
                "in-memory source marked unavailable".to_string(),
            ));
        }
        Ok(SourceInfo {
            kind: "memory",
            location: "in-process".to_string(),
            detail: format!("{} tables", self.tables.len()),
        })
    }
}

/// Keeps the latest dataset per (layer, name) plus a log of every publication
#[derive(Default)]
pub struct InMemoryPublisher {
    latest: Mutex<HashMap<(Stage, String), Dataset>>,
    log: Mutex<Vec<(Stage, String)>>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, layer: Stage, name: &str) -> Option<Dataset> {
        self.latest
            .lock()
            .ok()
            .and_then(|m| m.get(&(layer, name.to_string())).cloned())
    }

    /// Every publication in order, including overwrites
    pub fn publications(&self) -> Vec<(Stage, String)> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn published_in(&self, layer: Stage) -> usize {
        self.publications().iter().filter(|(l, _)| *l == layer).count()
    }
}

#[async_trait]
impl PublishPort for InMemoryPublisher {
    async fn publish(&self, dataset: &Dataset, layer: Stage, name: &str) -> Result<String> {
        let mut latest = self
            .latest
            .lock()
            .map_err(|_| PipelineError::Config("publisher lock poisoned".to_string()))?;
        latest.insert((layer, name.to_string()), dataset.clone());
        if let Ok(mut log) = self.log.lock() {
            log.push((layer, name.to_string()));
        }
        Ok(format!("memory://{}/{}_latest", layer.layer_name(), name))
    }

    async fn load(&self, layer: Stage, name: &str) -> Result<Dataset> {
        self.get(layer, name).ok_or_else(|| PipelineError::NotPublished {
            layer: layer.layer_name().to_string(),
            name: name.to_string(),
        })
    }
}
