//! # Store Error Types
//!
//! Errors raised by [`StorageDriver`](super::StorageDriver) implementations.
//! They convert into [`EnsembleError`](crate::EnsembleError), where
//! `KeyNotFound` becomes `NotFound` and everything else becomes `Io`.

use std::fmt;

/// Error type for storage driver operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Nothing has been saved under the requested key
    KeyNotFound(String),

    /// Backend I/O failed (disk, network)
    Io(String),

    /// Failed to acquire a lock on in-process storage
    ///
    /// Only happens when another thread panicked while holding the lock.
    LockError(String),
}

impl StoreError {
    /// Create a new key not found error
    pub fn key_not_found<S: Into<String>>(key: S) -> Self {
        StoreError::KeyNotFound(format!("Key '{}' not found in store", key.into()))
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(msg: S) -> Self {
        StoreError::Io(msg.into())
    }

    /// Create a new lock error
    pub fn lock_error<S: Into<String>>(msg: S) -> Self {
        StoreError::LockError(msg.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::KeyNotFound(msg) => write!(f, "Key not found: {msg}"),
            StoreError::Io(msg) => write!(f, "Store I/O error: {msg}"),
            StoreError::LockError(msg) => write!(f, "Lock error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_message() {
        let err = StoreError::key_not_found("Forecast/0000/0001/KW");
        assert_eq!(
            err.to_string(),
            "Key not found: Key 'Forecast/0000/0001/KW' not found in store"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(StoreError::io("disk full").to_string(), "Store I/O error: disk full");
        assert_eq!(StoreError::lock_error("poisoned").to_string(), "Lock error: poisoned");
    }
}
