//! # External Result Sources
//!
//! Nodes are populated from records handed over by an external collaborator
//! (typically a parser of simulator output). The core only sees an
//! [`ExternalRecord`]: an ordered list of `key -> text` pairs.
//!
//! Two sources ship with the crate:
//! - [`ResultFileSource`] reads `KEY VALUE` lines from `<run_path>/<node>`,
//!   where the run path comes from a [`PathTemplate`].
//! - [`MemorySource`] serves records registered in-process.

use crate::error::{EnsembleError, EnsembleResult};
use crate::store::PathTemplate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Ordered `key -> text` pairs produced by an external loader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalRecord {
    entries: Vec<(String, String)>,
}

impl ExternalRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value of `key`
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Raw text of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse `KEY VALUE` lines
    ///
    /// Blank lines and lines starting with `#` are skipped. Every other line
    /// must hold exactly two whitespace-separated tokens, and a key may appear
    /// only once.
    pub fn parse(text: &str) -> EnsembleResult<Self> {
        let mut record = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 2 {
                return Err(EnsembleError::load(format!(
                    "line {}: expected 'KEY VALUE', got '{line}'",
                    lineno + 1
                )));
            }
            if record.get(tokens[0]).is_some() {
                return Err(EnsembleError::load(format!(
                    "line {}: duplicate key '{}'",
                    lineno + 1,
                    tokens[0]
                )));
            }
            record.insert(tokens[0], tokens[1]);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExternalRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// Provider of external records for one realization and report step
#[async_trait]
pub trait ExternalSource: Send + Sync {
    /// Read the record backing `node` for `realization` at `report_step`
    async fn read(
        &self,
        realization: usize,
        report_step: usize,
        node: &str,
    ) -> EnsembleResult<ExternalRecord>;
}

/// Reads `KEY VALUE` result files from per-realization run paths
#[derive(Debug, Clone)]
pub struct ResultFileSource {
    run_path: PathTemplate,
}

impl ResultFileSource {
    /// `run_path` is a template such as `/scratch/run/realization-%d`
    pub fn new(run_path: PathTemplate) -> Self {
        Self { run_path }
    }
}

#[async_trait]
impl ExternalSource for ResultFileSource {
    async fn read(
        &self,
        realization: usize,
        report_step: usize,
        node: &str,
    ) -> EnsembleResult<ExternalRecord> {
        let path = self
            .run_path
            .render(report_step, realization)
            .join(node);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            EnsembleError::load(format!("cannot read result file {}: {e}", path.display()))
        })?;
        ExternalRecord::parse(&text).map_err(|e| e.context(path.display().to_string()))
    }
}

/// In-process source keyed by `(realization, report_step, node)`
#[derive(Default, Clone)]
pub struct MemorySource {
    records: Arc<RwLock<HashMap<(usize, usize, String), ExternalRecord>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the record returned for `(realization, report_step, node)`
    pub fn insert(
        &self,
        realization: usize,
        report_step: usize,
        node: &str,
        record: ExternalRecord,
    ) -> EnsembleResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| EnsembleError::generic("Failed to acquire write lock on source"))?;
        records.insert((realization, report_step, node.to_string()), record);
        Ok(())
    }
}

#[async_trait]
impl ExternalSource for MemorySource {
    async fn read(
        &self,
        realization: usize,
        report_step: usize,
        node: &str,
    ) -> EnsembleResult<ExternalRecord> {
        let records = self
            .records
            .read()
            .map_err(|_| EnsembleError::generic("Failed to acquire read lock on source"))?;
        records
            .get(&(realization, report_step, node.to_string()))
            .cloned()
            .ok_or_else(|| {
                EnsembleError::load(format!(
                    "no result for '{node}' in realization {realization} at step {report_step}"
                ))
            })
    }
}
