//! # Ensemble Orchestration
//!
//! An [`Ensemble`] owns one [`Realization`] per member and drives external
//! loads into it. Every dispatched load runs as its own tokio task:
//!
//! 1. The realization is moved out of the ensemble into the task.
//! 2. The task waits for a permit from the worker pool (`max_running`).
//! 3. For each node of the phase: read the external record (resubmitted per
//!    [`RetryMode`](crate::RetryMode)), populate a fresh node, commit it
//!    through the [`EnsembleFilesystem`] and keep it in the realization.
//! 4. [`Ensemble::load_complete`] awaits the tasks, moves each realization
//!    back, and reports a per-realization status.
//!
//! Because a realization is owned by at most one task at a time, no lock is
//! ever taken on realization state. A failed load never cancels siblings.
//!
//! ```rust,no_run
//! use ensemble_store::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> EnsembleResult<()> {
//! let config = EnsembleConfig::new(10, 5).with_node(
//!     NodeRole::Dynamic,
//!     NodeConfig::new("WELLS", [("WOPR", KeyType::Double)])?,
//! );
//! let source = Arc::new(MemorySource::new());
//! let mut ensemble = Ensemble::new(config, EnsembleFilesystem::in_memory(), source)?;
//!
//! ensemble.set_report_step(1)?;
//! for iens in 0..ensemble.size() {
//!     ensemble.load_realization(iens)?;
//! }
//! let report = ensemble.load_complete(0..ensemble.size()).await;
//! println!("{} ok, {} failed", report.ok_count(), report.failed_count());
//! # Ok(())
//! # }
//! ```

use crate::config::{EnsembleConfig, NodeSpec};
use crate::error::{EnsembleError, EnsembleResult};
use crate::fs::EnsembleFilesystem;
use crate::node::{EnkfNode, NodeKind};
use crate::retry::run_with_retries;
use crate::source::ExternalSource;
use crate::store::{Category, StorageKey};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[cfg(feature = "tracing")]
use tracing::{Instrument, debug, info, info_span, instrument, warn};

/// Load state of one realization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealizationState {
    /// Nothing loaded yet
    Undefined,
    /// Static and parameter nodes loaded
    Initialized,
    /// Dynamic nodes loaded for at least one report step
    HasData,
    /// The most recent load failed; excluded from active realizations
    LoadFailure,
}

/// Node set of one ensemble member, grouped by storage category
#[derive(Debug, Clone)]
pub struct Realization {
    index: usize,
    nodes: BTreeMap<Category, BTreeMap<String, EnkfNode>>,
}

impl Realization {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            nodes: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Node `name` held under `category`, if loaded
    pub fn node(&self, category: Category, name: &str) -> Option<&EnkfNode> {
        self.nodes.get(&category).and_then(|nodes| nodes.get(name))
    }

    pub fn node_mut(&mut self, category: Category, name: &str) -> Option<&mut EnkfNode> {
        self.nodes
            .get_mut(&category)
            .and_then(|nodes| nodes.get_mut(name))
    }

    /// Insert or replace a node, keyed by its name
    pub fn insert(&mut self, category: Category, node: EnkfNode) {
        self.nodes
            .entry(category)
            .or_default()
            .insert(node.name().to_string(), node);
    }

    /// Nodes of one category in name order
    pub fn nodes(&self, category: Category) -> impl Iterator<Item = &EnkfNode> {
        self.nodes.get(&category).into_iter().flat_map(|nodes| nodes.values())
    }
}

/// Outcome of one realization's load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Success,
    Failed(EnsembleError),
}

/// Status of one realization at the barrier
#[derive(Debug, Clone)]
pub struct RealizationStatus {
    pub outcome: LoadStatus,
    pub finished_at: DateTime<Utc>,
}

impl RealizationStatus {
    fn new(result: EnsembleResult<()>) -> Self {
        Self {
            outcome: match result {
                Ok(()) => LoadStatus::Success,
                Err(e) => LoadStatus::Failed(e),
            },
            finished_at: Utc::now(),
        }
    }

    /// `true` when the realization loaded without error
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, LoadStatus::Success)
    }

    /// The load error, if the realization failed
    pub fn error(&self) -> Option<&EnsembleError> {
        match &self.outcome {
            LoadStatus::Success => None,
            LoadStatus::Failed(e) => Some(e),
        }
    }
}

/// Per-realization result of a `load_complete` barrier
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    statuses: BTreeMap<usize, RealizationStatus>,
}

impl LoadReport {
    /// Status of realization `index`, if it was awaited
    pub fn get(&self, index: usize) -> Option<&RealizationStatus> {
        self.statuses.get(&index)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Statuses in ascending realization order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &RealizationStatus)> {
        self.statuses.iter().map(|(index, status)| (*index, status))
    }

    /// Number of realizations that loaded
    pub fn ok_count(&self) -> usize {
        self.statuses.values().filter(|s| s.is_success()).count()
    }

    /// Number of realizations that failed
    pub fn failed_count(&self) -> usize {
        self.len() - self.ok_count()
    }

    /// Indices of failed realizations, ascending
    pub fn failed(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, status)| !status.is_success())
            .map(|(index, _)| index)
            .collect()
    }

    /// `true` when no awaited realization failed
    pub fn all_ok(&self) -> bool {
        self.failed_count() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadPhase {
    /// Static and parameter nodes at step 0
    Init,
    /// Dynamic nodes at the given report step
    Step(usize),
}

impl LoadPhase {
    fn report_step(&self) -> usize {
        match self {
            LoadPhase::Init => 0,
            LoadPhase::Step(step) => *step,
        }
    }

    fn includes(&self, spec: &NodeSpec) -> bool {
        match self {
            LoadPhase::Init => spec.role.is_init(),
            LoadPhase::Step(_) => !spec.role.is_init(),
        }
    }
}

struct InFlight {
    phase: LoadPhase,
    handle: JoinHandle<(Realization, EnsembleResult<()>)>,
}

/// The set of realizations and their concurrent loads
pub struct Ensemble {
    config: Arc<EnsembleConfig>,
    fs: Arc<EnsembleFilesystem>,
    source: Arc<dyn ExternalSource>,
    report_step: usize,
    realizations: Vec<Option<Realization>>,
    states: Vec<RealizationState>,
    in_flight: HashMap<usize, InFlight>,
    workers: Arc<Semaphore>,
    #[cfg(feature = "tracing")]
    tracing_span: Option<tracing::Span>,
}

impl Ensemble {
    /// Create an ensemble of `config.size` empty realizations
    pub fn new(
        config: EnsembleConfig,
        fs: EnsembleFilesystem,
        source: Arc<dyn ExternalSource>,
    ) -> EnsembleResult<Self> {
        config.validate()?;
        let size = config.size;
        let workers = Arc::new(Semaphore::new(config.max_running));
        Ok(Self {
            config: Arc::new(config),
            fs: Arc::new(fs),
            source,
            report_step: 0,
            realizations: (0..size).map(|i| Some(Realization::new(i))).collect(),
            states: vec![RealizationState::Undefined; size],
            in_flight: HashMap::new(),
            workers,
            #[cfg(feature = "tracing")]
            tracing_span: None,
        })
    }

    /// Run every load task inside `span`
    #[cfg(feature = "tracing")]
    pub fn with_tracing_span(mut self, span: tracing::Span) -> Self {
        self.tracing_span = Some(span);
        self
    }

    pub fn config(&self) -> &Arc<EnsembleConfig> {
        &self.config
    }

    pub fn filesystem(&self) -> &Arc<EnsembleFilesystem> {
        &self.fs
    }

    pub fn size(&self) -> usize {
        self.config.size
    }

    pub fn report_step(&self) -> usize {
        self.report_step
    }

    /// Move to another report step; steps run from 0 to `history_length`
    pub fn set_report_step(&mut self, report_step: usize) -> EnsembleResult<()> {
        if report_step > self.config.history_length {
            return Err(EnsembleError::configuration(format!(
                "report step {report_step} is beyond the history length {}",
                self.config.history_length
            )));
        }
        self.report_step = report_step;
        Ok(())
    }

    /// State of realization `index`; `None` outside the ensemble
    pub fn state(&self, index: usize) -> Option<RealizationState> {
        self.states.get(index).copied()
    }

    /// Whether a load of realization `index` is dispatched but not yet awaited
    pub fn is_in_flight(&self, index: usize) -> bool {
        self.in_flight.contains_key(&index)
    }

    /// Realizations whose last load did not fail
    pub fn active_realizations(&self) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state != RealizationState::LoadFailure)
            .map(|(index, _)| index)
            .collect()
    }

    /// Borrow a realization that is not currently being loaded
    pub fn realization(&self, index: usize) -> EnsembleResult<&Realization> {
        self.check_index(index)?;
        self.realizations[index]
            .as_ref()
            .ok_or_else(|| in_flight_error(index))
    }

    /// Mutable access; fails while the realization is in flight
    pub fn realization_mut(&mut self, index: usize) -> EnsembleResult<&mut Realization> {
        self.check_index(index)?;
        self.realizations[index]
            .as_mut()
            .ok_or_else(|| in_flight_error(index))
    }

    /// Load static and parameter nodes for `subset` and wait for the result
    ///
    /// The whole subset is checked before anything is dispatched: an index out
    /// of range, listed twice or already in flight fails the call and leaves
    /// every realization untouched.
    #[cfg_attr(feature = "tracing", instrument(skip(self, subset)))]
    pub async fn load_ecl_init<I>(&mut self, subset: I) -> EnsembleResult<LoadReport>
    where
        I: IntoIterator<Item = usize>,
    {
        let subset: Vec<usize> = subset.into_iter().collect();
        let mut seen = HashSet::with_capacity(subset.len());
        for &index in &subset {
            self.check_index(index)?;
            if !seen.insert(index) {
                return Err(EnsembleError::configuration(format!(
                    "realization {index} is listed twice"
                )));
            }
            if self.in_flight.contains_key(&index) {
                return Err(in_flight_error(index));
            }
        }
        for &index in &subset {
            self.dispatch(index, LoadPhase::Init)?;
        }
        Ok(self.load_complete(subset).await)
    }

    /// Dispatch the dynamic load of one realization at the current step
    ///
    /// Returns as soon as the task is spawned; collect the outcome with
    /// [`Ensemble::load_complete`].
    pub fn load_realization(&mut self, index: usize) -> EnsembleResult<()> {
        self.dispatch(index, LoadPhase::Step(self.report_step))
    }

    /// Wait for every dispatched load in `subset`
    ///
    /// Indices in `subset` with nothing in flight are skipped. Each awaited
    /// realization is moved back into the ensemble, even when its task
    /// panicked, in which case it comes back empty.
    #[cfg_attr(feature = "tracing", instrument(skip(self, subset)))]
    pub async fn load_complete<I>(&mut self, subset: I) -> LoadReport
    where
        I: IntoIterator<Item = usize>,
    {
        let mut waiting = Vec::new();
        for index in subset {
            if let Some(in_flight) = self.in_flight.remove(&index) {
                waiting.push((index, in_flight.phase, in_flight.handle));
            }
        }

        let (meta, handles): (Vec<_>, Vec<_>) = waiting
            .into_iter()
            .map(|(index, phase, handle)| ((index, phase), handle))
            .unzip();
        let joined = join_all(handles).await;

        let mut report = LoadReport::default();
        for ((index, phase), outcome) in meta.into_iter().zip(joined) {
            let (realization, result) = match outcome {
                Ok(done) => done,
                Err(e) => (
                    Realization::new(index),
                    Err(EnsembleError::load(format!("load task aborted: {e}"))),
                ),
            };
            self.realizations[index] = Some(realization);
            self.states[index] = match (&result, phase) {
                (Err(_), _) => RealizationState::LoadFailure,
                (Ok(()), LoadPhase::Init) => RealizationState::Initialized,
                (Ok(()), LoadPhase::Step(_)) => RealizationState::HasData,
            };

            #[cfg(feature = "tracing")]
            if let Err(e) = &result {
                warn!(realization = index, error = %e, "Realization failed to load");
            }

            report
                .statuses
                .insert(index, RealizationStatus::new(result));
        }

        #[cfg(feature = "tracing")]
        if report.all_ok() {
            info!("All {} active realizations loaded", report.len());
        } else {
            info!(
                ok = report.ok_count(),
                "{} realization(s) failed to load",
                report.failed_count()
            );
        }

        report
    }

    /// Persist the in-memory nodes of `category` at the current report step
    ///
    /// Used after an external update has placed analyzed or parameter nodes
    /// into the realization.
    pub async fn commit(&self, index: usize, category: Category) -> EnsembleResult<usize> {
        let realization = self.realization(index)?;
        let mut saved = 0;
        for node in realization.nodes(category) {
            let key = StorageKey::new(category, index, self.report_step, node.name());
            self.fs.save_node(category, &key, node).await?;
            saved += 1;
        }
        Ok(saved)
    }

    fn check_index(&self, index: usize) -> EnsembleResult<()> {
        if index >= self.size() {
            return Err(EnsembleError::configuration(format!(
                "realization {index} is outside the ensemble of size {}",
                self.size()
            )));
        }
        Ok(())
    }

    fn dispatch(&mut self, index: usize, phase: LoadPhase) -> EnsembleResult<()> {
        self.check_index(index)?;
        if self.in_flight.contains_key(&index) {
            return Err(in_flight_error(index));
        }
        let mut realization = self.realizations[index]
            .take()
            .ok_or_else(|| in_flight_error(index))?;

        let config = Arc::clone(&self.config);
        let fs = Arc::clone(&self.fs);
        let source = Arc::clone(&self.source);
        let workers = Arc::clone(&self.workers);

        #[cfg(feature = "tracing")]
        debug!(realization = index, ?phase, "Dispatching realization load");

        let task = async move {
            let result = match workers.acquire_owned().await {
                Ok(_permit) => {
                    load_nodes(&mut realization, phase, &config, &fs, source.as_ref()).await
                }
                Err(_) => Err(EnsembleError::generic("worker pool closed")),
            };
            (realization, result)
        };

        #[cfg(feature = "tracing")]
        let handle = {
            let span = match &self.tracing_span {
                Some(parent) => info_span!(parent: parent, "realization_load", realization = index),
                None => info_span!("realization_load", realization = index),
            };
            tokio::spawn(task.instrument(span))
        };

        #[cfg(not(feature = "tracing"))]
        let handle = tokio::spawn(task);

        self.in_flight.insert(index, InFlight { phase, handle });
        Ok(())
    }
}

impl std::fmt::Debug for Ensemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ensemble")
            .field("size", &self.size())
            .field("report_step", &self.report_step)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

fn in_flight_error(index: usize) -> EnsembleError {
    EnsembleError::generic(format!("realization {index} is already being loaded"))
}

/// Body of one load task
async fn load_nodes(
    realization: &mut Realization,
    phase: LoadPhase,
    config: &EnsembleConfig,
    fs: &EnsembleFilesystem,
    source: &dyn ExternalSource,
) -> EnsembleResult<()> {
    let index = realization.index();
    let step = phase.report_step();

    for spec in config.nodes().iter().filter(|spec| phase.includes(spec)) {
        let name = spec.name();
        let record =
            run_with_retries(&config.retry_mode, move || source.read(index, step, name)).await?;

        let mut node = spec.create();
        node.load_from_external(&record)
            .map_err(|e| e.context(format!("realization {index}, node {name}")))?;

        let category = spec.role.category();
        let key = StorageKey::new(category, index, step, name);
        fs.save_node(category, &key, &node).await?;
        realization.insert(category, node);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeRole;
    use crate::node::{KeyType, NodeConfig, NodeState, ScalarConfig};
    use crate::retry::RetryMode;
    use crate::source::{ExternalRecord, MemorySource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SIZE: usize = 6;

    fn config() -> EnsembleConfig {
        EnsembleConfig::new(SIZE, 3)
            .with_max_running(2)
            .with_retry(RetryMode::fixed(1, Duration::from_millis(1)))
            .with_node(
                NodeRole::Dynamic,
                NodeConfig::new(
                    "WELLS",
                    [("WOPR", KeyType::Double), ("STATUS", KeyType::String)],
                )
                .unwrap(),
            )
            .with_node(
                NodeRole::Parameter,
                ScalarConfig::new("MULT", ["MULTX"]).unwrap(),
            )
            .with_node(
                NodeRole::Static,
                NodeConfig::new("GRID", [("NX", KeyType::Double)]).unwrap(),
            )
    }

    fn record(pairs: &[(&str, String)]) -> ExternalRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn source(steps: &[usize]) -> MemorySource {
        let source = MemorySource::new();
        for iens in 0..SIZE {
            source
                .insert(iens, 0, "MULT", record(&[("MULTX", format!("{}", iens as f64 * 0.5))]))
                .unwrap();
            source
                .insert(iens, 0, "GRID", record(&[("NX", "40".to_string())]))
                .unwrap();
            for &step in steps {
                let wopr = (100 * step + iens) as f64;
                source
                    .insert(
                        iens,
                        step,
                        "WELLS",
                        record(&[("WOPR", wopr.to_string()), ("STATUS", "OPEN".into())]),
                    )
                    .unwrap();
            }
        }
        source
    }

    fn ensemble(steps: &[usize]) -> Ensemble {
        Ensemble::new(
            config(),
            EnsembleFilesystem::in_memory(),
            Arc::new(source(steps)),
        )
        .unwrap()
    }

    /// Wraps a source and fails every read of one realization
    struct FailingSource {
        inner: MemorySource,
        broken: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExternalSource for FailingSource {
        async fn read(
            &self,
            realization: usize,
            report_step: usize,
            node: &str,
        ) -> EnsembleResult<ExternalRecord> {
            if realization == self.broken {
                self.calls.fetch_add(1, Ordering::SeqCst);
                return Err(EnsembleError::load("result file truncated"));
            }
            self.inner.read(realization, report_step, node).await
        }
    }

    /// Fails the first read of every realization, then delegates
    struct FlakySource {
        inner: MemorySource,
        seen: std::sync::Mutex<std::collections::HashSet<usize>>,
    }

    #[async_trait]
    impl ExternalSource for FlakySource {
        async fn read(
            &self,
            realization: usize,
            report_step: usize,
            node: &str,
        ) -> EnsembleResult<ExternalRecord> {
            let first = self.seen.lock().unwrap().insert(realization);
            if first {
                return Err(EnsembleError::load("not flushed yet"));
            }
            self.inner.read(realization, report_step, node).await
        }
    }

    /// Tracks how many reads run at the same time
    struct SlowSource {
        inner: MemorySource,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ExternalSource for SlowSource {
        async fn read(
            &self,
            realization: usize,
            report_step: usize,
            node: &str,
        ) -> EnsembleResult<ExternalRecord> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.inner.read(realization, report_step, node).await
        }
    }

    #[tokio::test]
    async fn test_load_ecl_init() {
        let mut ensemble = ensemble(&[]);

        let report = ensemble.load_ecl_init(0..SIZE).await.unwrap();
        assert_eq!(report.len(), SIZE);
        assert!(report.all_ok());

        for iens in 0..SIZE {
            assert_eq!(ensemble.state(iens), Some(RealizationState::Initialized));
            let realization = ensemble.realization(iens).unwrap();
            let mult = realization.node(Category::Parameter, "MULT").unwrap();
            assert_eq!(mult.value_of("MULTX").unwrap(), iens as f64 * 0.5);
            assert!(realization.node(Category::Static, "GRID").is_some());
            assert!(realization.node(Category::DynamicForecast, "WELLS").is_none());

            let key = StorageKey::new(Category::Parameter, iens, 0, "MULT");
            assert!(ensemble.filesystem().has_node(Category::Parameter, &key).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_load_ecl_init_rejects_duplicate_subset() {
        let mut ensemble = ensemble(&[]);

        let err = ensemble.load_ecl_init([0, 1, 0]).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
        for iens in 0..SIZE {
            assert!(!ensemble.is_in_flight(iens));
            assert!(ensemble.realization(iens).is_ok());
            assert_eq!(ensemble.state(iens), Some(RealizationState::Undefined));
        }

        let report = ensemble.load_ecl_init([0, 1]).await.unwrap();
        assert!(report.all_ok());
    }

    #[tokio::test]
    async fn test_load_ecl_init_rejects_out_of_range_subset() {
        let mut ensemble = ensemble(&[]);

        let err = ensemble.load_ecl_init([2, 7]).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
        for iens in 0..SIZE {
            assert!(!ensemble.is_in_flight(iens));
            assert!(ensemble.realization(iens).is_ok());
        }
        assert!(ensemble.load_realization(2).is_ok());
        assert!(ensemble.load_complete([2]).await.get(2).is_some());
    }

    #[tokio::test]
    async fn test_load_ecl_init_rejects_in_flight_member() {
        let mut ensemble = ensemble(&[0]);
        ensemble.load_realization(4).unwrap();

        let err = ensemble.load_ecl_init([3, 4]).await.unwrap_err();
        assert!(err.message().contains("realization 4"));
        assert!(!ensemble.is_in_flight(3));
        assert!(ensemble.is_in_flight(4));

        let report = ensemble.load_complete([4]).await;
        assert!(report.get(4).unwrap().is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_realization_is_isolated() {
        let failing = Arc::new(FailingSource {
            inner: source(&[1]),
            broken: 3,
            calls: AtomicUsize::new(0),
        });
        let mut ensemble =
            Ensemble::new(config(), EnsembleFilesystem::in_memory(), failing.clone()).unwrap();
        ensemble.set_report_step(1).unwrap();

        for iens in 0..SIZE {
            ensemble.load_realization(iens).unwrap();
        }
        let report = ensemble.load_complete(0..SIZE).await;

        assert_eq!(report.len(), SIZE);
        assert_eq!(report.failed(), vec![3]);
        assert_eq!(report.ok_count(), SIZE - 1);
        assert_eq!(report.get(3).unwrap().error().unwrap().category(), "load");
        // initial read plus one resubmission
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);

        for iens in (0..SIZE).filter(|i| *i != 3) {
            assert_eq!(ensemble.state(iens), Some(RealizationState::HasData));
            let node = ensemble
                .realization(iens)
                .unwrap()
                .node(Category::DynamicForecast, "WELLS")
                .unwrap();
            assert_eq!(node.state(), NodeState::Populated);
            assert_eq!(node.value_of("WOPR").unwrap(), (100 + iens) as f64);
        }
        assert_eq!(ensemble.state(3), Some(RealizationState::LoadFailure));
        let failed = ensemble.realization(3).unwrap();
        assert!(failed.node(Category::DynamicForecast, "WELLS").is_none());
        assert_eq!(ensemble.active_realizations(), vec![0, 1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_resubmitted() {
        let flaky = FlakySource {
            inner: source(&[2]),
            seen: Default::default(),
        };
        let mut ensemble =
            Ensemble::new(config(), EnsembleFilesystem::in_memory(), Arc::new(flaky)).unwrap();
        ensemble.set_report_step(2).unwrap();
        for iens in 0..SIZE {
            ensemble.load_realization(iens).unwrap();
        }
        let report = ensemble.load_complete(0..SIZE).await;
        assert!(report.all_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_bounds_concurrency() {
        let slow = Arc::new(SlowSource {
            inner: source(&[1]),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut ensemble =
            Ensemble::new(config(), EnsembleFilesystem::in_memory(), slow.clone()).unwrap();
        ensemble.set_report_step(1).unwrap();
        for iens in 0..SIZE {
            ensemble.load_realization(iens).unwrap();
        }
        let report = ensemble.load_complete(0..SIZE).await;
        assert!(report.all_ok());
        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_in_flight_realization_is_exclusive() {
        let mut ensemble = ensemble(&[0]);

        ensemble.load_realization(1).unwrap();
        assert!(ensemble.is_in_flight(1));
        assert!(ensemble.load_realization(1).is_err());
        assert!(ensemble.realization(1).is_err());

        let report = ensemble.load_complete([1]).await;
        assert!(report.get(1).unwrap().is_success());
        assert!(!ensemble.is_in_flight(1));
        assert!(ensemble.realization(1).is_ok());
    }

    #[tokio::test]
    async fn test_load_complete_skips_idle_realizations() {
        let mut ensemble = ensemble(&[0]);
        ensemble.load_realization(0).unwrap();
        let report = ensemble.load_complete(0..SIZE).await;
        assert_eq!(report.len(), 1);
        assert_eq!(ensemble.state(1), Some(RealizationState::Undefined));
    }

    #[tokio::test]
    async fn test_index_and_step_validation() {
        let mut ensemble = ensemble(&[]);
        assert_eq!(
            ensemble.load_realization(SIZE).unwrap_err().category(),
            "configuration"
        );
        assert!(ensemble.set_report_step(3).is_ok());
        assert!(ensemble.set_report_step(4).is_err());
        assert!(Ensemble::new(
            EnsembleConfig::new(0, 1),
            EnsembleFilesystem::in_memory(),
            Arc::new(source(&[]))
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_commit_analyzed_nodes() {
        let mut ensemble = ensemble(&[1]);
        ensemble.set_report_step(1).unwrap();
        ensemble.load_realization(0).unwrap();
        ensemble.load_complete([0]).await;

        let realization = ensemble.realization_mut(0).unwrap();
        let mut analyzed = realization
            .node(Category::DynamicForecast, "WELLS")
            .unwrap()
            .clone();
        analyzed
            .as_custom_kw_mut()
            .unwrap()
            .set_double("WOPR", 7.5)
            .unwrap();
        realization.insert(Category::DynamicAnalyzed, analyzed);

        assert_eq!(ensemble.commit(0, Category::DynamicAnalyzed).await.unwrap(), 1);

        let key = StorageKey::new(Category::DynamicAnalyzed, 0, 1, "WELLS");
        let mut node = ensemble.config().node("WELLS").unwrap().create();
        ensemble
            .filesystem()
            .load_node(Category::DynamicAnalyzed, &key, &mut node)
            .await
            .unwrap();
        assert_eq!(node.value_of("WOPR").unwrap(), 7.5);
    }

    #[test]
    fn test_report_counts() {
        let mut report = LoadReport::default();
        report.statuses.insert(0, RealizationStatus::new(Ok(())));
        report
            .statuses
            .insert(4, RealizationStatus::new(Err(EnsembleError::load("x"))));
        assert_eq!(report.ok_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.failed(), vec![4]);
        assert!(!report.all_ok());
    }
}
