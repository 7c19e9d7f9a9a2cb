use super::{PathTemplate, StorageDriver, StorageKey, StoreResult, error::StoreError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

#[cfg(feature = "tracing")]
use tracing::{debug, instrument};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One file per key on the local filesystem
///
/// A key resolves to `template.render(report_step, realization)/name`.
/// Saves go through a temporary file in the target directory followed by a
/// rename, so an interrupted save never leaves a truncated blob behind.
#[derive(Debug, Clone)]
pub struct PlainDriver {
    template: PathTemplate,
}

impl PlainDriver {
    pub fn new(template: PathTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Physical location of `key`
    pub fn path_of(&self, key: &StorageKey) -> PathBuf {
        self.template
            .render(key.report_step, key.realization)
            .join(&key.name)
    }
}

#[async_trait]
impl StorageDriver for PlainDriver {
    #[cfg_attr(
        feature = "tracing",
        instrument(skip(self, key, bytes), fields(key = %key, len = bytes.len()))
    )]
    async fn save(&self, key: &StorageKey, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_of(key);
        let dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(format!("create {}: {e}", dir.display())))?;

        let tmp = dir.join(format!(
            ".{}.tmp-{}-{}",
            key.name,
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::io(format!("write {}: {e}", path.display())));
        }

        #[cfg(feature = "tracing")]
        debug!(path = %path.display(), "Blob saved");

        Ok(())
    }

    async fn load(&self, key: &StorageKey) -> StoreResult<Vec<u8>> {
        let path = self.path_of(key);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::key_not_found(key.to_string()),
            _ => StoreError::io(format!("read {}: {e}", path.display())),
        })
    }

    async fn exists(&self, key: &StorageKey) -> StoreResult<bool> {
        let path = self.path_of(key);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(format!("stat {}: {e}", path.display())))
    }
}
