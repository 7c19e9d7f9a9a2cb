//! Keyword-map node: an ordered set of named string or double values.

use super::{NodeKind, NodeState, check_node_name};
use crate::buffer::{BufferReader, BufferWriter};
use crate::error::{EnsembleError, EnsembleResult};
use crate::matrix::Matrix;
use crate::source::ExternalRecord;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage type of one keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Double,
    String,
}

/// Format a double the way keyword nodes store it: `%26.10f`
pub fn format_double(value: f64) -> String {
    format!("{value:26.10}")
}

/// Schema shared by every keyword node of one kind
///
/// Key order is the serialization order. Reordering keys makes previously
/// written blobs unreadable in the intended way, so treat it as part of the
/// on-disk format.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    name: String,
    keys: Vec<String>,
    types: Vec<KeyType>,
    index: HashMap<String, usize>,
}

impl NodeConfig {
    /// Build a schema from an ordered `(key, type)` list
    ///
    /// Duplicate keys are rejected, as are names that are not a single path
    /// component.
    pub fn new<I, K>(name: &str, keys: I) -> EnsembleResult<Self>
    where
        I: IntoIterator<Item = (K, KeyType)>,
        K: Into<String>,
    {
        check_node_name(name)?;
        let mut config = Self {
            name: name.to_string(),
            keys: Vec::new(),
            types: Vec::new(),
            index: HashMap::new(),
        };
        for (key, key_type) in keys {
            let key = key.into();
            if config.index.contains_key(&key) {
                return Err(EnsembleError::configuration(format!(
                    "duplicate key '{key}' in node config '{name}'"
                )));
            }
            config.index.insert(key.clone(), config.keys.len());
            config.keys.push(key);
            config.types.push(key_type);
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

    /// `false` for string keys and for keys not in the schema
    pub fn is_double_type(&self, key: &str) -> bool {
        self.index
            .get(key)
            .is_some_and(|&i| self.types[i] == KeyType::Double)
    }

    /// Declared type of `key`; `UnknownKey` if absent
    pub fn key_type(&self, key: &str) -> EnsembleResult<KeyType> {
        self.key_index_of(key).map(|i| self.types[i])
    }

    fn type_at(&self, position: usize) -> KeyType {
        self.types[position]
    }
}

/// Keyword-map node bound to a shared [`NodeConfig`]
///
/// Values are held as text, one per schema key; doubles use the fixed
/// [`format_double`] representation. The empty string means "unset".
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    config: Arc<NodeConfig>,
    values: Vec<String>,
    state: NodeState,
}

impl Node {
    /// Allocate a node with doubles at `0.0` and strings empty
    pub fn create(config: Arc<NodeConfig>) -> Self {
        let values = config
            .types
            .iter()
            .map(|t| match t {
                KeyType::Double => format_double(0.0),
                KeyType::String => String::new(),
            })
            .collect();
        Self {
            config,
            values,
            state: NodeState::Uninitialized,
        }
    }

    pub fn config(&self) -> &Arc<NodeConfig> {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store `value` in the fixed 26.10 text format
    pub fn set_double(&mut self, key: &str, value: f64) -> EnsembleResult<()> {
        self.set_string(key, &format_double(value))
    }

    pub fn set_string(&mut self, key: &str, value: &str) -> EnsembleResult<()> {
        let index = self.config.key_index_of(key)?;
        self.values[index] = value.to_string();
        self.state = NodeState::Populated;
        Ok(())
    }

    /// Parse the value at `position`; the unset sentinel reads as `0.0`
    pub fn get_as_double(&self, position: usize) -> EnsembleResult<f64> {
        let raw = self.get_as_string(position)?;
        let text = raw.trim();
        if text.is_empty() {
            return Ok(0.0);
        }
        text.parse::<f64>().map_err(|_| {
            EnsembleError::parse(format!(
                "key '{}' of '{}': '{text}' is not a number",
                self.config.keys[position], self.config.name
            ))
        })
    }

    /// Raw text at `position` in key order
    pub fn get_as_string(&self, position: usize) -> EnsembleResult<&str> {
        self.values.get(position).map(String::as_str).ok_or_else(|| {
            EnsembleError::unknown_key(format!(
                "position {position} outside '{}' ({} keys)",
                self.config.name,
                self.values.len()
            ))
        })
    }

    /// Value of `key` parsed as a double
    pub fn get_double(&self, key: &str) -> EnsembleResult<f64> {
        self.get_as_double(self.config.key_index_of(key)?)
    }

    pub fn get_string(&self, key: &str) -> EnsembleResult<&str> {
        self.get_as_string(self.config.key_index_of(key)?)
    }

    fn double_positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.config.len()).filter(|&i| self.config.type_at(i) == KeyType::Double)
    }
}

impl NodeKind for Node {
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
        for (position, key) in self.config.keys.iter().enumerate() {
            let raw = record.get(key).ok_or_else(|| {
                EnsembleError::load(format!("'{}' is missing key '{key}'", self.config.name))
            })?;
            let value = match self.config.type_at(position) {
                KeyType::Double => {
                    let parsed = raw.trim().parse::<f64>().map_err(|_| {
                        EnsembleError::load(format!(
                            "key '{key}' of '{}': '{raw}' is not a number",
                            self.config.name
                        ))
                    })?;
                    format_double(parsed)
                }
                KeyType::String => raw.to_string(),
            };
            values.push(value);
        }

        self.values = values;
        self.state = NodeState::Populated;
        Ok(())
    }

    fn write_to_buffer(&self, sink: &mut BufferWriter) {
        sink.write_i32(self.values.len() as i32);
        for value in &self.values {
            sink.write_string(value);
        }
    }

    fn read_from_buffer(&mut self, source: &mut BufferReader<'_>) -> EnsembleResult<()> {
        let count = source.read_count(4)?;
        if count != self.config.len() {
            return Err(EnsembleError::corrupt_buffer(format!(
                "'{}' holds {count} values, schema has {} keys",
                self.config.name,
                self.config.len()
            )));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(source.read_string()?);
        }
        self.values = values;
        self.state = NodeState::Populated;
        Ok(())
    }

    fn value_of(&self, key: &str) -> EnsembleResult<f64> {
        self.get_double(key)
    }

    fn active_size(&self) -> usize {
        self.double_positions().count()
    }

    fn serialize_into(
        &self,
        matrix: &mut Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()> {
        for (row, position) in self.double_positions().enumerate() {
            matrix.set(row_offset + row, column, self.get_as_double(position)?)?;
        }
        Ok(())
    }

    fn deserialize_from(
        &mut self,
        matrix: &Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()> {
        let positions: Vec<usize> = self.double_positions().collect();
        let mut updated = Vec::with_capacity(positions.len());
        for (row, &position) in positions.iter().enumerate() {
            let value = matrix.get(row_offset + row, column).ok_or_else(|| {
                EnsembleError::configuration(format!(
                    "cell ({}, {column}) outside {}x{} matrix",
                    row_offset + row,
                    matrix.rows(),
                    matrix.cols()
                ))
            })?;
            updated.push((position, format_double(value)));
        }
        for (position, value) in updated {
            self.values[position] = value;
        }
        self.state = NodeState::Populated;
        Ok(())
    }
}
