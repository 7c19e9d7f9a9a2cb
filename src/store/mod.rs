//! # Storage Drivers
//!
//! A [`StorageDriver`] persists opaque byte blobs keyed by [`StorageKey`].
//! The rest of the crate never knows which backend is bound; the
//! [`EnsembleFilesystem`](crate::fs::EnsembleFilesystem) holds one driver per
//! [`Category`] and routes node I/O to it.
//!
//! ## Available Drivers
//!
//! | Driver | Backend | Use |
//! |--------|---------|-----|
//! | [`MemoryDriver`] | `HashMap` behind `Arc<RwLock<_>>` | tests, short-lived runs |
//! | [`PlainDriver`] | one file per key under a [`PathTemplate`] | on-disk ensembles |
//!
//! Remote blob stores plug in by implementing the trait.
//!
//! ## Contract
//!
//! - `save` overwrites and is atomic per key: a reader sees the old blob or
//!   the new one, never a prefix of either.
//! - `load` of a key that was never saved fails with
//!   [`StoreError::KeyNotFound`].
//! - Concurrent operations on *different* keys must not interfere.
//!   Concurrent writes to the *same* key are unsupported; which write wins is
//!   unspecified.

pub mod error;
pub mod key;
pub mod memory;
pub mod plain;

use async_trait::async_trait;

/// Type alias for driver operation results
pub type StoreResult<T> = Result<T, error::StoreError>;

/// Byte-blob backend for one storage category
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Persist `bytes` under `key`, replacing any previous blob
    async fn save(&self, key: &StorageKey, bytes: &[u8]) -> StoreResult<()>;

    /// Fetch the blob stored under `key`
    async fn load(&self, key: &StorageKey) -> StoreResult<Vec<u8>>;

    async fn exists(&self, key: &StorageKey) -> StoreResult<bool>;

    /// Flush buffered state to durable storage
    ///
    /// Default implementation does nothing.
    async fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub use error::StoreError;
pub use key::{Category, PathTemplate, StorageKey};
pub use memory::MemoryDriver;
pub use plain::PlainDriver;
