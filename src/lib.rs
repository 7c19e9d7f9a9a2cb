//! # Ensemble Store: Storage and Measurement Matching for Ensemble Workflows
//!
//! Ensemble Store is the persistence and interchange layer of an ensemble
//! data-assimilation loop. Many independent realizations each carry a set of
//! named, typed nodes that are loaded from simulator results, written per
//! report step, read back for analysis and compared against observations.
//!
//! ## 🚀 Quick Start
//!
//! Describe the node schemas in an [`EnsembleConfig`], mount an
//! [`EnsembleFilesystem`], hand both to an [`Ensemble`] together with an
//! [`ExternalSource`], dispatch loads and wait on the barrier. Then build a
//! [`MeasurementMatcher`] over the same filesystem to assemble the matrix of
//! predicted observations.
//!
//! ```rust,no_run
//! use ensemble_store::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> EnsembleResult<()> {
//! let config = EnsembleConfig::new(50, 10).with_node(
//!     NodeRole::Dynamic,
//!     NodeConfig::new("WELLS", [("WOPR", KeyType::Double), ("STATUS", KeyType::String)])?,
//! );
//! let run_path = PathTemplate::new("/scratch/run/step-%d/realization-%d")?;
//! let source = Arc::new(ResultFileSource::new(run_path));
//! let fs = EnsembleFilesystem::mount_plain("/scratch/enkf/Ensemble")?;
//!
//! let mut ensemble = Ensemble::new(config, fs, source)?;
//! ensemble.set_report_step(3)?;
//! for iens in 0..ensemble.size() {
//!     ensemble.load_realization(iens)?;
//! }
//! let report = ensemble.load_complete(0..ensemble.size()).await;
//!
//! let mut matcher = MeasurementMatcher::new(
//!     Arc::clone(ensemble.filesystem()),
//!     Arc::clone(ensemble.config()),
//! );
//! matcher.add_observation(Observation::new("WOPR_OP1", "WELLS", "WOPR").at_step(3, 512.0, 10.0))?;
//! let active = report.iter().filter(|(_, s)| s.is_success()).map(|(i, _)| i).collect::<Vec<_>>();
//! let (predicted, observed) = matcher
//!     .gather_with_obs(&[3], &active, Category::DynamicForecast)
//!     .await?;
//! let residuals = observed.residuals(&predicted)?;
//! # let _ = residuals;
//! # Ok(())
//! # }
//! ```
//!
//! ## 🎯 Core Concepts
//!
//! ### Nodes - Typed State
//!
//! A [`Node`] is a keyword map bound to a shared [`NodeConfig`]. Values are
//! held as text; doubles are written with a fixed 26-character, 10-decimal
//! format so the persisted form is stable. [`ScalarNode`] is a plain vector
//! of named doubles. Both implement [`NodeKind`] and are wrapped by
//! [`EnkfNode`].
//!
//! ### Storage - Four Categories, One Driver Each
//!
//! The [`EnsembleFilesystem`] routes every save and load to the
//! [`StorageDriver`] of its [`Category`]: forecast, analyzed, static or
//! parameter. [`MemoryDriver`] keeps blobs in-process; [`PlainDriver`] writes
//! one file per node under a [`PathTemplate`].
//!
//! ### Ensemble - Concurrent Loads With A Barrier
//!
//! [`Ensemble::load_realization`] spawns one task per realization, bounded by
//! a worker pool. [`Ensemble::load_complete`] waits for them and returns a
//! [`LoadReport`]; one failing realization never affects its siblings.
//!
//! ## 📦 Node Buffer Format
//!
//! ```text
//! i32 count
//! count x { i32 length, length bytes (no terminator) }
//! ```
//!
//! Integers are little-endian. There is no version tag or checksum.
//!
//! ## 📚 Module Overview
//!
//! - **[`node`]**: [`NodeKind`], [`Node`], [`NodeConfig`], [`ScalarNode`]
//! - **[`buffer`]**: [`BufferWriter`] and the bounds-checked [`BufferReader`]
//! - **[`store`]**: [`StorageDriver`], keys, categories and path templates
//! - **[`fs`]**: the category-routed [`EnsembleFilesystem`]
//! - **[`source`]**: [`ExternalSource`] and [`ExternalRecord`]
//! - **[`ensemble`]**: [`Ensemble`], [`Realization`], [`LoadReport`]
//! - **[`matcher`]**: [`MeasurementMatcher`], [`MeasurementMatrix`], [`ObsData`]
//! - **[`config`]** and **[`retry`]**: run configuration and resubmission
//! - **[`error`]**: [`EnsembleError`] and [`EnsembleResult`]

pub mod buffer;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod fs;
pub mod matcher;
pub mod matrix;
pub mod node;
pub mod retry;
pub mod source;
pub mod store;


// Core public API
pub use buffer::{BufferReader, BufferWriter};
pub use config::{EnsembleConfig, NodeRole, NodeSpec};
pub use ensemble::{
    Ensemble, LoadReport, LoadStatus, Realization, RealizationState, RealizationStatus,
};
pub use error::{EnsembleError, EnsembleResult};
pub use fs::EnsembleFilesystem;
pub use matcher::{MeasurementMatcher, MeasurementMatrix, ObsData, Observation, RowLabel};
pub use matrix::Matrix;
pub use node::{
    EnkfNode, KeyType, KindConfig, Node, NodeConfig, NodeKind, NodeState, ScalarConfig, ScalarNode,
};
pub use retry::RetryMode;
pub use source::{ExternalRecord, ExternalSource, MemorySource, ResultFileSource};
pub use store::{
    Category, MemoryDriver, PathTemplate, PlainDriver, StorageDriver, StorageKey, StoreError,
};

// Convenience re-exports for common patterns
pub mod prelude {
    //! Simplified imports for common usage patterns
    //!
    //! Use `use ensemble_store::prelude::*;` to import the most commonly used types and traits.

    pub use crate::{
        Category, EnkfNode, Ensemble, EnsembleConfig, EnsembleError, EnsembleFilesystem,
        EnsembleResult, ExternalRecord, ExternalSource, KeyType, LoadReport, Matrix,
        MeasurementMatcher, MemoryDriver, MemorySource, Node, NodeConfig, NodeKind, NodeRole,
        Observation, PathTemplate, PlainDriver, ResultFileSource, RetryMode, ScalarConfig,
        StorageDriver, StorageKey,
    };

    // Re-export async_trait for convenience
    pub use async_trait::async_trait;
}
