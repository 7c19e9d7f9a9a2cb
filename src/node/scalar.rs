//! Scalar-vector node: named doubles stored as raw `f64`.
//!
//! Used for summary vectors and parameter sets where every value is numeric.
//! Blob layout: `[i32 count][count x f64]`.

use super::{NodeKind, NodeState, check_node_name};
use crate::buffer::{BufferReader, BufferWriter};
use crate::error::{EnsembleError, EnsembleResult};
use crate::matrix::Matrix;
use crate::source::ExternalRecord;
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered names of a scalar node
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarConfig {
    name: String,
    keys: Vec<String>,
    index: HashMap<String, usize>,
}

impl ScalarConfig {
    /// Names must be a single path component; duplicate keys are rejected
    pub fn new<I, K>(name: &str, keys: I) -> EnsembleResult<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        check_node_name(name)?;
        let mut config = Self {
            name: name.to_string(),
            keys: Vec::new(),
            index: HashMap::new(),
        };
        for key in keys {
            let key = key.into();
            if config.index.insert(key.clone(), config.keys.len()).is_some() {
                return Err(EnsembleError::configuration(format!(
                    "duplicate key '{key}' in scalar config '{name}'"
                )));
            }
            config.keys.push(key);
        }
        Ok(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys in serialization order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_index_of(&self, key: &str) -> EnsembleResult<usize> {
        self.index.get(key).copied().ok_or_else(|| {
            EnsembleError::unknown_key(format!("'{key}' is not a key of '{}'", self.name))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarNode {
    config: Arc<ScalarConfig>,
    values: Vec<f64>,
    state: NodeState,
}

impl ScalarNode {
    pub fn create(config: Arc<ScalarConfig>) -> Self {
        let values = vec![0.0; config.len()];
        Self {
            config,
            values,
            state: NodeState::Uninitialized,
        }
    }

    pub fn config(&self) -> &Arc<ScalarConfig> {
        &self.config
    }

    /// Values in key order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of `key`; `UnknownKey` if absent
    pub fn get(&self, key: &str) -> EnsembleResult<f64> {
        Ok(self.values[self.config.key_index_of(key)?])
    }

    /// Assign `key` and mark the node populated
    pub fn set(&mut self, key: &str, value: f64) -> EnsembleResult<()> {
        let index = self.config.key_index_of(key)?;
        self.values[index] = value;
        self.state = NodeState::Populated;
        Ok(())
    }
}

impl NodeKind for ScalarNode {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn state(&self) -> NodeState {
        self.state
    }

    fn load_from_external(&mut self, record: &ExternalRecord) -> EnsembleResult<()> {
        if let Some(unknown) = record.keys().find(|k| !self.config.index.contains_key(*k)) {
            return Err(EnsembleError::unknown_key(format!(
                "'{unknown}' is not a key of '{}'",
                self.config.name
            )));
        }
        let mut values = Vec::with_capacity(self.config.len());
        for key in &self.config.keys {
            let raw = record.get(key).ok_or_else(|| {
                EnsembleError::load(format!("'{}' is missing key '{key}'", self.config.name))
            })?;
            values.push(raw.trim().parse::<f64>().map_err(|_| {
                EnsembleError::load(format!(
                    "key '{key}' of '{}': '{raw}' is not a number",
                    self.config.name
                ))
            })?);
        }
        self.values = values;
        self.state = NodeState::Populated;
        Ok(())
    }

    fn write_to_buffer(&self, sink: &mut BufferWriter) {
        sink.write_i32(self.values.len() as i32);
        for value in &self.values {
            sink.write_f64(*value);
        }
    }

    fn read_from_buffer(&mut self, source: &mut BufferReader<'_>) -> EnsembleResult<()> {
        let count = source.read_count(8)?;
        if count != self.config.len() {
            return Err(EnsembleError::corrupt_buffer(format!(
                "'{}' holds {count} values, schema has {} keys",
                self.config.name,
                self.config.len()
            )));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(source.read_f64()?);
        }
        self.values = values;
        self.state = NodeState::Populated;
        Ok(())
    }

    fn value_of(&self, key: &str) -> EnsembleResult<f64> {
        self.get(key)
    }

    fn active_size(&self) -> usize {
        self.values.len()
    }

    fn serialize_into(
        &self,
        matrix: &mut Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()> {
        for (row, value) in self.values.iter().enumerate() {
            matrix.set(row_offset + row, column, *value)?;
        }
        Ok(())
    }

    fn deserialize_from(
        &mut self,
        matrix: &Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()> {
        let values = (0..self.values.len())
            .map(|row| {
                matrix.get(row_offset + row, column).ok_or_else(|| {
                    EnsembleError::configuration(format!(
                        "cell ({}, {column}) outside {}x{} matrix",
                        row_offset + row,
                        matrix.rows(),
                        matrix.cols()
                    ))
                })
            })
            .collect::<EnsembleResult<Vec<f64>>>()?;
        self.values = values;
        self.state = NodeState::Populated;
        Ok(())
    }
}
