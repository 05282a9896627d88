//! Store backend configuration and factory.
//!
//! Provides a unified interface for selecting and configuring record stores.

use crate::memory_store::MemoryStore;
use hebb_core::store::AssociationStore;
use std::sync::Arc;

#[cfg(feature = "sqlite")]
use std::path::PathBuf;

/// Configuration for store backend selection.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    /// No store at all: engines learn in memory only.
    Detached,

    /// In-memory map store (default, fast, no persistence across processes).
    #[default]
    InMemory,

    /// SQLite-backed persistent storage.
    #[cfg(feature = "sqlite")]
    Sqlite {
        /// Path to the SQLite database file.
        /// If None, uses an in-memory SQLite database.
        path: Option<PathBuf>,
    },
}

impl StoreConfig {
    /// Create an in-memory store configuration.
    pub fn in_memory() -> Self {
        StoreConfig::InMemory
    }

    /// Create an SQLite store configuration with a file path.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        StoreConfig::Sqlite {
            path: Some(path.into()),
        }
    }

    /// Create an SQLite store configuration with in-memory storage.
    #[cfg(feature = "sqlite")]
    pub fn sqlite_in_memory() -> Self {
        StoreConfig::Sqlite { path: None }
    }
}

/// Trait object for record stores.
pub type DynStore = Arc<dyn AssociationStore>;

/// Create a record store from configuration. `Detached` yields `None`.
///
/// # Errors
/// Returns an error if the backend cannot be created (e.g., SQLite file issues).
pub fn create_store(config: &StoreConfig) -> Result<Option<DynStore>, BackendError> {
    match config {
        StoreConfig::Detached => Ok(None),
        StoreConfig::InMemory => Ok(Some(Arc::new(MemoryStore::new()))),

        #[cfg(feature = "sqlite")]
        StoreConfig::Sqlite { path } => {
            use crate::sqlite_store::SqliteStore;

            let store = if let Some(p) = path {
                SqliteStore::open(p).map_err(|e| BackendError::Sqlite(e.to_string()))?
            } else {
                SqliteStore::new_in_memory().map_err(|e| BackendError::Sqlite(e.to_string()))?
            };

            Ok(Some(Arc::new(store)))
        }
    }
}

/// Errors that can occur when creating store backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// SQLite-specific error.
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(String),

    /// Generic backend error.
    #[error("Backend error: {0}")]
    Other(String),
}

impl From<BackendError> for hebb_core::error::HebbError {
    fn from(e: BackendError) -> Self {
        hebb_core::error::StoreError::Unavailable(e.to_string()).into()
    }
}
