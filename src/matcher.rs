//! # Measurement Matching
//!
//! Assembles the ensemble's predictions of observed quantities into a dense
//! [`Matrix`] for an external analysis step.
//!
//! An [`Observation`] names a node and one of its keys, together with the
//! observed value and standard deviation at each report step where it is
//! active. [`MeasurementMatcher::gather`] produces one row per
//! `(step, observation)` pair, walking `step_list` in the given order and the
//! observations active at each step in registration order, and one column per
//! entry of `realization_list`, also in the given order. Neither list is
//! sorted.
//!
//! Every cell must be filled. A node missing from storage turns into
//! [`EnsembleError::IncompleteEnsemble`]; a value that does not parse is
//! reported as [`EnsembleError::Parse`] naming the realization and step.

use crate::config::EnsembleConfig;
use crate::error::{EnsembleError, EnsembleResult};
use crate::fs::EnsembleFilesystem;
use crate::matrix::Matrix;
use crate::node::{EnkfNode, NodeKind};
use crate::store::{Category, StorageKey};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

/// An observed quantity and the node key that predicts it
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    name: String,
    node: String,
    key: String,
    /// report step -> (value, std)
    data: BTreeMap<usize, (f64, f64)>,
}

impl Observation {
    pub fn new<N, K, V>(name: N, node: K, key: V) -> Self
    where
        N: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            node: node.into(),
            key: key.into(),
            data: BTreeMap::new(),
        }
    }

    /// Add the observed value at `report_step`
    pub fn at_step(mut self, report_step: usize, value: f64, std: f64) -> Self {
        self.data.insert(report_step, (value, std));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the observation has a measurement at `report_step`
    pub fn is_active(&self, report_step: usize) -> bool {
        self.data.contains_key(&report_step)
    }

    /// Observed `(value, std)` at `report_step`
    pub fn measured(&self, report_step: usize) -> Option<(f64, f64)> {
        self.data.get(&report_step).copied()
    }
}

/// Identifies one row of a measurement matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowLabel {
    pub report_step: usize,
    pub observation: String,
}

/// Predicted observation equivalents, rows x realizations
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMatrix {
    matrix: Matrix,
    rows: Vec<RowLabel>,
    realizations: Vec<usize>,
}

impl MeasurementMatrix {
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn into_matrix(self) -> Matrix {
        self.matrix
    }

    /// Row labels, one per matrix row
    pub fn rows(&self) -> &[RowLabel] {
        &self.rows
    }

    /// Realization index of each column
    pub fn realizations(&self) -> &[usize] {
        &self.realizations
    }

    /// Value predicted by `realization` for `observation` at `report_step`
    pub fn value(&self, report_step: usize, observation: &str, realization: usize) -> Option<f64> {
        let row = self
            .rows
            .iter()
            .position(|r| r.report_step == report_step && r.observation == observation)?;
        let col = self.realizations.iter().position(|&r| r == realization)?;
        self.matrix.get(row, col)
    }
}

/// Observed values aligned with the rows of a [`MeasurementMatrix`]
#[derive(Debug, Clone, PartialEq)]
pub struct ObsData {
    pub values: Vec<f64>,
    pub std: Vec<f64>,
    pub labels: Vec<RowLabel>,
}

impl ObsData {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observed minus predicted, same shape as `predicted`
    pub fn residuals(&self, predicted: &MeasurementMatrix) -> EnsembleResult<Matrix> {
        if predicted.rows != self.labels {
            return Err(EnsembleError::configuration(
                "observation data and measurement matrix have different rows",
            ));
        }
        let (rows, cols) = (predicted.matrix.rows(), predicted.matrix.cols());
        let mut residuals = Matrix::new(rows, cols);
        for (row, observed) in self.values.iter().enumerate() {
            for col in 0..cols {
                let value = predicted.matrix.get(row, col).unwrap_or_default();
                residuals.set(row, col, observed - value)?;
            }
        }
        Ok(residuals)
    }
}

/// Builds measurement matrices from stored nodes
#[derive(Debug, Clone)]
pub struct MeasurementMatcher {
    fs: Arc<EnsembleFilesystem>,
    config: Arc<EnsembleConfig>,
    observations: Vec<Observation>,
}

impl MeasurementMatcher {
    pub fn new(fs: Arc<EnsembleFilesystem>, config: Arc<EnsembleConfig>) -> Self {
        Self {
            fs,
            config,
            observations: Vec::new(),
        }
    }

    /// Register an observation; its node and key must exist in the schema and
    /// the key must be numeric
    pub fn add_observation(&mut self, observation: Observation) -> EnsembleResult<()> {
        if self.observations.iter().any(|o| o.name == observation.name) {
            return Err(EnsembleError::configuration(format!(
                "observation '{}' registered twice",
                observation.name
            )));
        }
        self.config
            .node(&observation.node)?
            .kind
            .check_numeric_key(&observation.key)?;
        self.observations.push(observation);
        Ok(())
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    fn row_layout(&self, step_list: &[usize]) -> Vec<(usize, &Observation)> {
        step_list
            .iter()
            .flat_map(|&step| {
                self.observations
                    .iter()
                    .filter(move |obs| obs.is_active(step))
                    .map(move |obs| (step, obs))
            })
            .collect()
    }

    /// Assemble the predicted values stored under `category`
    #[cfg_attr(feature = "tracing", instrument(skip(self, step_list, realization_list)))]
    pub async fn gather(
        &self,
        step_list: &[usize],
        realization_list: &[usize],
        category: Category,
    ) -> EnsembleResult<MeasurementMatrix> {
        let layout = self.row_layout(step_list);
        let columns = try_join_all(
            realization_list
                .iter()
                .map(|&iens| self.gather_column(&layout, iens, category)),
        )
        .await?;

        let mut matrix = Matrix::new(layout.len(), realization_list.len());
        for (col, values) in columns.iter().enumerate() {
            for (row, value) in values.iter().enumerate() {
                matrix.set(row, col, *value)?;
            }
        }

        #[cfg(feature = "tracing")]
        debug!(
            rows = matrix.rows(),
            cols = matrix.cols(),
            "Measurement matrix assembled"
        );

        Ok(MeasurementMatrix {
            matrix,
            rows: layout
                .iter()
                .map(|(step, obs)| RowLabel {
                    report_step: *step,
                    observation: obs.name.clone(),
                })
                .collect(),
            realizations: realization_list.to_vec(),
        })
    }

    /// [`gather`](Self::gather) plus the matching observed values
    pub async fn gather_with_obs(
        &self,
        step_list: &[usize],
        realization_list: &[usize],
        category: Category,
    ) -> EnsembleResult<(MeasurementMatrix, ObsData)> {
        let predicted = self.gather(step_list, realization_list, category).await?;
        let mut obs = ObsData {
            values: Vec::with_capacity(predicted.rows.len()),
            std: Vec::with_capacity(predicted.rows.len()),
            labels: predicted.rows.clone(),
        };
        for (step, observation) in self.row_layout(step_list) {
            let (value, std) = observation.measured(step).unwrap_or_default();
            obs.values.push(value);
            obs.std.push(std);
        }
        Ok((predicted, obs))
    }

    /// One realization's column; each node is loaded once per step
    async fn gather_column(
        &self,
        layout: &[(usize, &Observation)],
        iens: usize,
        category: Category,
    ) -> EnsembleResult<Vec<f64>> {
        let mut loaded: HashMap<(usize, &str), EnkfNode> = HashMap::new();
        let mut values = Vec::with_capacity(layout.len());

        for &(step, obs) in layout {
            let node_name = obs.node.as_str();
            if !loaded.contains_key(&(step, node_name)) {
                let mut node = self.config.node(node_name)?.create();
                let key = StorageKey::new(category, iens, step, node_name);
                self.fs
                    .load_node(category, &key, &mut node)
                    .await
                    .map_err(|e| match e {
                        EnsembleError::NotFound(msg) => EnsembleError::incomplete_ensemble(format!(
                            "realization {iens} has no {category} data for '{node_name}' at step {step}: {msg}"
                        )),
                        other => other,
                    })?;
                loaded.insert((step, node_name), node);
            }

            let value = loaded
                .get(&(step, node_name))
                .ok_or_else(|| EnsembleError::generic("node cache miss"))?
                .value_of(&obs.key)
                .map_err(|e| e.context(format!("realization {iens}, step {step}")))?;
            values.push(value);
        }
        Ok(values)
    }
}
