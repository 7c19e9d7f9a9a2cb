//! # Ensemble Configuration
//!
//! [`EnsembleConfig`] collects everything the [`Ensemble`](crate::Ensemble)
//! and [`MeasurementMatcher`](crate::MeasurementMatcher) need to know about a
//! run: ensemble size, history length, worker pool size, the resubmission
//! policy, and the node schemas with their storage role.
//!
//! Parsing configuration files is left to the caller; build the value with
//! the fluent setters and call [`EnsembleConfig::validate`] (done
//! automatically by `Ensemble::new`).

use crate::error::{EnsembleError, EnsembleResult};
use crate::node::{EnkfNode, KindConfig};
use crate::retry::RetryMode;
use crate::store::Category;
use std::collections::HashSet;

/// How a node is produced and where it is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Loaded from every report step's results; stored as forecast
    Dynamic,
    /// Loaded once from initialization output
    Static,
    /// Loaded once; the state the analysis updates
    Parameter,
}

impl NodeRole {
    /// Category that external loads of this role are committed to
    pub fn category(&self) -> Category {
        match self {
            NodeRole::Dynamic => Category::DynamicForecast,
            NodeRole::Static => Category::Static,
            NodeRole::Parameter => Category::Parameter,
        }
    }

    /// Whether the role is loaded by `load_ecl_init` rather than per step
    pub fn is_init(&self) -> bool {
        !matches!(self, NodeRole::Dynamic)
    }
}

/// One node schema registered with the ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub role: NodeRole,
    pub kind: KindConfig,
}

impl NodeSpec {
    pub fn new<K: Into<KindConfig>>(role: NodeRole, kind: K) -> Self {
        Self {
            role,
            kind: kind.into(),
        }
    }

    pub fn name(&self) -> &str {
        self.kind.name()
    }

    pub fn create(&self) -> EnkfNode {
        self.kind.create()
    }
}

/// Run-level configuration of an ensemble
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Number of realizations
    pub size: usize,
    /// Number of report steps in the simulated history
    pub history_length: usize,
    /// Upper bound on concurrently running realization loads
    pub max_running: usize,
    /// Resubmission policy for external reads
    pub retry_mode: RetryMode,
    nodes: Vec<NodeSpec>,
}

impl EnsembleConfig {
    pub fn new(size: usize, history_length: usize) -> Self {
        Self {
            size,
            history_length,
            max_running: default_max_running(),
            retry_mode: RetryMode::default(),
            nodes: Vec::new(),
        }
    }

    pub fn with_max_running(mut self, max_running: usize) -> Self {
        self.max_running = max_running;
        self
    }

    pub fn with_retry(mut self, retry_mode: RetryMode) -> Self {
        self.retry_mode = retry_mode;
        self
    }

    /// Register a node schema
    pub fn with_node<K: Into<KindConfig>>(mut self, role: NodeRole, kind: K) -> Self {
        self.nodes.push(NodeSpec::new(role, kind));
        self
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    /// Schema of the node called `name`; `UnknownKey` if none is registered
    pub fn node(&self, name: &str) -> EnsembleResult<&NodeSpec> {
        self.nodes
            .iter()
            .find(|spec| spec.name() == name)
            .ok_or_else(|| EnsembleError::unknown_key(format!("no node named '{name}'")))
    }

    /// Registered nodes of one role, in registration order
    pub fn nodes_with_role(&self, role: NodeRole) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.iter().filter(move |spec| spec.role == role)
    }

    /// Check sizes and that node names are unique
    pub fn validate(&self) -> EnsembleResult<()> {
        if self.size == 0 {
            return Err(EnsembleError::configuration("ensemble size must be positive"));
        }
        if self.max_running == 0 {
            return Err(EnsembleError::configuration("max_running must be positive"));
        }
        let mut seen = HashSet::new();
        for spec in &self.nodes {
            if !seen.insert(spec.name()) {
                return Err(EnsembleError::configuration(format!(
                    "node '{}' registered twice",
                    spec.name()
                )));
            }
        }
        Ok(())
    }
}

fn default_max_running() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
