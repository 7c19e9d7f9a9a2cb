//! # Ensemble Filesystem
//!
//! Four storage drivers, one per [`Category`], behind a single node-level
//! API. Nodes are serialized to blobs on the way in and deserialized into a
//! caller-supplied node on the way out, so the schema is always known before
//! any bytes are interpreted.
//!
//! Routing is an exhaustive `match` on the closed [`Category`] enum: there is
//! no fallback driver, and a blob saved in one category is never visible
//! from another.

use crate::error::EnsembleResult;
use crate::node::EnkfNode;
use crate::store::{
    Category, MemoryDriver, PathTemplate, PlainDriver, StorageDriver, StorageKey,
};
use std::path::Path;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

/// Category-routed node storage
///
/// Drivers are held as `Arc`s, so in-flight load and save futures keep their
/// driver alive even if the filesystem handle is dropped first.
#[derive(Clone)]
pub struct EnsembleFilesystem {
    dynamic_forecast: Arc<dyn StorageDriver>,
    dynamic_analyzed: Arc<dyn StorageDriver>,
    eclipse_static: Arc<dyn StorageDriver>,
    parameter: Arc<dyn StorageDriver>,
}

impl EnsembleFilesystem {
    pub fn new(
        dynamic_forecast: Arc<dyn StorageDriver>,
        dynamic_analyzed: Arc<dyn StorageDriver>,
        eclipse_static: Arc<dyn StorageDriver>,
        parameter: Arc<dyn StorageDriver>,
    ) -> Self {
        Self {
            dynamic_forecast,
            dynamic_analyzed,
            eclipse_static,
            parameter,
        }
    }

    /// Four independent in-memory drivers
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryDriver::new()),
            Arc::new(MemoryDriver::new()),
            Arc::new(MemoryDriver::new()),
            Arc::new(MemoryDriver::new()),
        )
    }

    /// Plain drivers laid out as `root/<step>/mem<realization>/<Category>`
    pub fn mount_plain<P: AsRef<Path>>(root: P) -> EnsembleResult<Self> {
        let root = root.as_ref().display().to_string();
        let plain = |category: Category| -> EnsembleResult<Arc<dyn StorageDriver>> {
            let template =
                PathTemplate::new(&format!("{root}/%04d/mem%03d/{}", category.dir_name()))?;
            Ok(Arc::new(PlainDriver::new(template)))
        };
        Ok(Self::new(
            plain(Category::DynamicForecast)?,
            plain(Category::DynamicAnalyzed)?,
            plain(Category::Static)?,
            plain(Category::Parameter)?,
        ))
    }

    /// The driver serving `category`
    pub fn driver(&self, category: Category) -> &Arc<dyn StorageDriver> {
        match category {
            Category::DynamicForecast => &self.dynamic_forecast,
            Category::DynamicAnalyzed => &self.dynamic_analyzed,
            Category::Static => &self.eclipse_static,
            Category::Parameter => &self.parameter,
        }
    }

    /// Serialize `node` and store it under `key` in `category`
    #[cfg_attr(feature = "tracing", instrument(skip(self, key, node), fields(key = %key)))]
    pub async fn save_node(
        &self,
        category: Category,
        key: &StorageKey,
        node: &EnkfNode,
    ) -> EnsembleResult<()> {
        let key = key.with_category(category);
        let bytes = node.to_bytes();
        self.driver(category).save(&key, &bytes).await?;

        #[cfg(feature = "tracing")]
        debug!(bytes = bytes.len(), "Node saved");

        Ok(())
    }

    /// Load the blob under `key` in `category` into `into_node`
    ///
    /// `NotFound` and `CorruptBuffer` propagate unchanged; `into_node` is
    /// untouched on any error.
    pub async fn load_node(
        &self,
        category: Category,
        key: &StorageKey,
        into_node: &mut EnkfNode,
    ) -> EnsembleResult<()> {
        let key = key.with_category(category);
        let bytes = self.driver(category).load(&key).await?;
        into_node
            .read_bytes(&bytes)
            .map_err(|e| e.context(key.to_string()))
    }

    /// Whether a blob exists under `key` in `category`
    pub async fn has_node(&self, category: Category, key: &StorageKey) -> EnsembleResult<bool> {
        let key = key.with_category(category);
        Ok(self.driver(category).exists(&key).await?)
    }

    /// Flush every driver
    pub async fn sync(&self) -> EnsembleResult<()> {
        for category in Category::ALL {
            self.driver(category).sync().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EnsembleFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleFilesystem").finish_non_exhaustive()
    }
}
