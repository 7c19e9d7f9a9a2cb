//! # Nodes - Typed State Containers
//!
//! A node is one named piece of realization state. Every node kind offers the
//! same capability set through [`NodeKind`]:
//!
//! - `load_from_external`: populate from an [`ExternalRecord`], all-or-nothing
//! - `write_to_buffer` / `read_from_buffer`: the persisted blob format
//! - `value_of`: numeric view of one key, used by measurement matching
//! - `serialize_into` / `deserialize_from`: exchange with the analysis matrix
//!
//! The set of kinds is closed. [`EnkfNode`] dispatches over it with a plain
//! `match`, and [`KindConfig`] creates nodes from a shared schema.
//!
//! | Kind | Schema | Blob |
//! |------|--------|------|
//! | [`Node`] (keyword map) | [`NodeConfig`] | `[i32 n][n x (i32 len, bytes)]` |
//! | [`ScalarNode`] | [`ScalarConfig`] | `[i32 n][n x f64]` |
//!
//! ## Matrix exchange
//!
//! `serialize_into(matrix, row_offset, column)` writes the node's numeric
//! values into rows `row_offset..row_offset + active_size()` of one column.
//! Keyword nodes contribute their double-typed keys in key order; string keys
//! never take part. `deserialize_from` reads the same cells back and leaves
//! the node untouched if any cell is out of range.

pub mod custom_kw;
pub mod scalar;

pub use custom_kw::{KeyType, Node, NodeConfig, format_double};
pub use scalar::{ScalarConfig, ScalarNode};

use crate::buffer::{BufferReader, BufferWriter};
use crate::error::{EnsembleError, EnsembleResult};
use crate::matrix::Matrix;
use crate::source::ExternalRecord;
use std::sync::Arc;

/// Node names double as file names in storage, so they must be a single
/// plain path component
pub(crate) fn check_node_name(name: &str) -> EnsembleResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(EnsembleError::configuration(format!(
            "node name '{name}' must be a non-empty name without '/', '\\' or '..'"
        )));
    }
    Ok(())
}

/// Lifecycle of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Freshly created, holding defaults
    Uninitialized,
    /// Assigned by a setter, an external load or a buffer read
    Populated,
}

/// Capability set shared by every node kind
pub trait NodeKind {
    /// Name of the node; also the blob name in storage
    fn name(&self) -> &str;

    fn state(&self) -> NodeState;

    /// Populate from an external record; on error the node is unchanged
    fn load_from_external(&mut self, record: &ExternalRecord) -> EnsembleResult<()>;

    fn write_to_buffer(&self, sink: &mut BufferWriter);

    /// Replace the node's values from a blob; on error the node is unchanged
    fn read_from_buffer(&mut self, source: &mut BufferReader<'_>) -> EnsembleResult<()>;

    /// Numeric value of `key`
    fn value_of(&self, key: &str) -> EnsembleResult<f64>;

    /// Number of rows the node occupies in the analysis matrix
    fn active_size(&self) -> usize;

    fn serialize_into(
        &self,
        matrix: &mut Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()>;

    fn deserialize_from(
        &mut self,
        matrix: &Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()>;
}

/// Schema of one node kind, shared by all realizations
#[derive(Debug, Clone, PartialEq)]
pub enum KindConfig {
    CustomKw(Arc<NodeConfig>),
    Scalar(Arc<ScalarConfig>),
}

impl KindConfig {
    pub fn name(&self) -> &str {
        match self {
            KindConfig::CustomKw(config) => config.name(),
            KindConfig::Scalar(config) => config.name(),
        }
    }

    /// Check that `key` exists and holds a number
    ///
    /// String keys of a keyword node are `Configuration` errors: they have no
    /// numeric value to match against an observation.
    pub fn check_numeric_key(&self, key: &str) -> EnsembleResult<()> {
        match self {
            KindConfig::CustomKw(config) => match config.key_type(key)? {
                KeyType::Double => Ok(()),
                KeyType::String => Err(EnsembleError::configuration(format!(
                    "key '{key}' of '{}' is a string key",
                    config.name()
                ))),
            },
            KindConfig::Scalar(config) => config.key_index_of(key).map(|_| ()),
        }
    }

    /// Allocate a fresh node bound to this schema
    pub fn create(&self) -> EnkfNode {
        match self {
            KindConfig::CustomKw(config) => EnkfNode::CustomKw(Node::create(Arc::clone(config))),
            KindConfig::Scalar(config) => EnkfNode::Scalar(ScalarNode::create(Arc::clone(config))),
        }
    }
}

impl From<NodeConfig> for KindConfig {
    fn from(config: NodeConfig) -> Self {
        KindConfig::CustomKw(Arc::new(config))
    }
}

impl From<ScalarConfig> for KindConfig {
    fn from(config: ScalarConfig) -> Self {
        KindConfig::Scalar(Arc::new(config))
    }
}

/// A node of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum EnkfNode {
    CustomKw(Node),
    Scalar(ScalarNode),
}

impl EnkfNode {
    pub fn as_custom_kw(&self) -> Option<&Node> {
        match self {
            EnkfNode::CustomKw(node) => Some(node),
            EnkfNode::Scalar(_) => None,
        }
    }

    pub fn as_custom_kw_mut(&mut self) -> Option<&mut Node> {
        match self {
            EnkfNode::CustomKw(node) => Some(node),
            EnkfNode::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarNode> {
        match self {
            EnkfNode::Scalar(node) => Some(node),
            EnkfNode::CustomKw(_) => None,
        }
    }

    pub fn as_scalar_mut(&mut self) -> Option<&mut ScalarNode> {
        match self {
            EnkfNode::Scalar(node) => Some(node),
            EnkfNode::CustomKw(_) => None,
        }
    }

    /// Serialize into a fresh blob
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut sink = BufferWriter::new();
        self.write_to_buffer(&mut sink);
        sink.into_inner()
    }

    /// Deserialize a whole blob; trailing bytes are corruption
    pub fn read_bytes(&mut self, bytes: &[u8]) -> EnsembleResult<()> {
        let mut source = BufferReader::new(bytes);
        let mut staged = self.clone();
        staged.read_from_buffer(&mut source)?;
        source.finish()?;
        *self = staged;
        Ok(())
    }
}

impl From<Node> for EnkfNode {
    fn from(node: Node) -> Self {
        EnkfNode::CustomKw(node)
    }
}

impl From<ScalarNode> for EnkfNode {
    fn from(node: ScalarNode) -> Self {
        EnkfNode::Scalar(node)
    }
}

impl NodeKind for EnkfNode {
    fn name(&self) -> &str {
        match self {
            EnkfNode::CustomKw(node) => node.name(),
            EnkfNode::Scalar(node) => node.name(),
        }
    }

    fn state(&self) -> NodeState {
        match self {
            EnkfNode::CustomKw(node) => node.state(),
            EnkfNode::Scalar(node) => node.state(),
        }
    }

    fn load_from_external(&mut self, record: &ExternalRecord) -> EnsembleResult<()> {
        match self {
            EnkfNode::CustomKw(node) => node.load_from_external(record),
            EnkfNode::Scalar(node) => node.load_from_external(record),
        }
    }

    fn write_to_buffer(&self, sink: &mut BufferWriter) {
        match self {
            EnkfNode::CustomKw(node) => node.write_to_buffer(sink),
            EnkfNode::Scalar(node) => node.write_to_buffer(sink),
        }
    }

    fn read_from_buffer(&mut self, source: &mut BufferReader<'_>) -> EnsembleResult<()> {
        match self {
            EnkfNode::CustomKw(node) => node.read_from_buffer(source),
            EnkfNode::Scalar(node) => node.read_from_buffer(source),
        }
    }

    fn value_of(&self, key: &str) -> EnsembleResult<f64> {
        match self {
            EnkfNode::CustomKw(node) => node.value_of(key),
            EnkfNode::Scalar(node) => node.value_of(key),
        }
    }

    fn active_size(&self) -> usize {
        match self {
            EnkfNode::CustomKw(node) => node.active_size(),
            EnkfNode::Scalar(node) => node.active_size(),
        }
    }

    fn serialize_into(
        &self,
        matrix: &mut Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()> {
        match self {
            EnkfNode::CustomKw(node) => node.serialize_into(matrix, row_offset, column),
            EnkfNode::Scalar(node) => node.serialize_into(matrix, row_offset, column),
        }
    }

    fn deserialize_from(
        &mut self,
        matrix: &Matrix,
        row_offset: usize,
        column: usize,
    ) -> EnsembleResult<()> {
        match self {
            EnkfNode::CustomKw(node) => node.deserialize_from(matrix, row_offset, column),
            EnkfNode::Scalar(node) => node.deserialize_from(matrix, row_offset, column),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> Vec<KindConfig> {
        vec![
            NodeConfig::new("KW", [("A", KeyType::Double), ("B", KeyType::String)])
                .unwrap()
                .into(),
            ScalarConfig::new("SC", ["X", "Y"]).unwrap().into(),
        ]
    }

    #[test]
    fn test_create_dispatches_on_kind() {
        let kinds = kinds();
        let kw = kinds[0].create();
        let sc = kinds[1].create();
        assert!(kw.as_custom_kw().is_some());
        assert!(sc.as_scalar().is_some());
        assert_eq!(kw.name(), "KW");
        assert_eq!(sc.name(), "SC");
        assert_eq!(kw.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_shared_config_is_not_copied() {
        let config = Arc::new(NodeConfig::new("KW", [("A", KeyType::Double)]).unwrap());
        let kind = KindConfig::CustomKw(Arc::clone(&config));
        let nodes: Vec<EnkfNode> = (0..4).map(|_| kind.create()).collect();
        assert_eq!(Arc::strong_count(&config), 2 + nodes.len());
    }

    #[test]
    fn test_bytes_roundtrip_for_every_kind() {
        for kind in kinds() {
            let mut node = kind.create();
            let record: ExternalRecord = match &kind {
                KindConfig::CustomKw(_) => [("A", "-3.25"), ("B", "text")].into_iter().collect(),
                KindConfig::Scalar(_) => [("X", "1e3"), ("Y", "0.125")].into_iter().collect(),
            };
            node.load_from_external(&record).unwrap();

            let mut copy = kind.create();
            copy.read_bytes(&node.to_bytes()).unwrap();
            assert_eq!(copy, node);
        }
    }

    #[test]
    fn test_read_bytes_rejects_trailing_garbage() {
        let kind = &kinds()[1];
        let node = kind.create();
        let mut bytes = node.to_bytes();
        bytes.push(0);
        let mut copy = kind.create();
        let err = copy.read_bytes(&bytes).unwrap_err();
        assert_eq!(err.category(), "corrupt_buffer");
        assert_eq!(copy.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_value_of() {
        let kinds = kinds();
        let mut kw = kinds[0].create();
        kw.as_custom_kw_mut().unwrap().set_double("A", 2.0).unwrap();
        assert_eq!(kw.value_of("A").unwrap(), 2.0);
        assert!(kw.value_of("B").is_ok());
        assert_eq!(kw.value_of("C").unwrap_err().category(), "unknown_key");

        let mut sc = kinds[1].create();
        sc.as_scalar_mut().unwrap().set("Y", 5.0).unwrap();
        assert_eq!(sc.value_of("Y").unwrap(), 5.0);
    }

    #[test]
    fn test_check_numeric_key() {
        let kinds = kinds();
        assert!(kinds[0].check_numeric_key("A").is_ok());
        assert_eq!(kinds[0].check_numeric_key("B").unwrap_err().category(), "configuration");
        assert_eq!(kinds[0].check_numeric_key("C").unwrap_err().category(), "unknown_key");
        assert!(kinds[1].check_numeric_key("Y").is_ok());
        assert_eq!(kinds[1].check_numeric_key("Z").unwrap_err().category(), "unknown_key");
    }
}
