//! Transport selection.
//!
//! A [`TransportConfig`] names the backend an engine writes to.
//! It is deserialised from the `transport` entry of a [`ConfigFile`](crate::config::ConfigFile)
//! or from the file at the `backendConfigPath` parameter.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use stepstore_storage::{transport::MemoryTransport, StorageTier, StorageTransport};
use thiserror::Error;

use crate::config::{read_json, ConfigurationError};

/// A transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum TransportConfig {
    /// An in-memory transport.
    Memory,
    /// A filesystem transport rooted at `path`.
    Filesystem {
        /// The base directory.
        path: PathBuf,
    },
    /// An `object_store` transport, e.g. `s3://bucket/prefix` or `file:///data`.
    ObjectStore {
        /// The store URL.
        url: String,
    },
}

/// A transport creation error.
#[derive(Debug, Error)]
pub enum TransportCreateError {
    /// The transport is not available in this build.
    #[error("{0} transport is not enabled, enable the {0} feature")]
    Disabled(&'static str),
    /// The backend could not be created.
    #[error("{0}")]
    Backend(String),
}

impl TransportConfig {
    /// Read a transport configuration from a JSON file.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        read_json(path.as_ref())
    }

    /// Create the transport, placing objects in the pool of `tier`.
    ///
    /// Objects in a memory transport ignore the tier.
    ///
    /// # Errors
    /// Returns a [`TransportCreateError`] if the backend cannot be created or is not enabled.
    pub fn create_transport(&self, tier: StorageTier) -> Result<StorageTransport, TransportCreateError> {
        match self {
            Self::Memory => Ok(Arc::new(MemoryTransport::new())),
            #[cfg(feature = "filesystem")]
            Self::Filesystem { path } => {
                let mut options = stepstore_filesystem::FilesystemTransportOptions::default();
                options.tier(tier);
                let transport =
                    stepstore_filesystem::FilesystemTransport::new_with_options(path, options)
                        .map_err(|err| TransportCreateError::Backend(err.to_string()))?;
                Ok(Arc::new(transport))
            }
            #[cfg(not(feature = "filesystem"))]
            Self::Filesystem { .. } => {
                let _ = tier;
                Err(TransportCreateError::Disabled("filesystem"))
            }
            #[cfg(feature = "object_store")]
            Self::ObjectStore { url } => {
                let block_on = stepstore_object_store::TokioBlockOn::new()
                    .map_err(|err| TransportCreateError::Backend(err.to_string()))?;
                let transport =
                    stepstore_object_store::ObjectStoreTransport::from_url(url, block_on, tier)
                        .map_err(|err| TransportCreateError::Backend(err.to_string()))?;
                Ok(Arc::new(transport))
            }
            #[cfg(not(feature = "object_store"))]
            Self::ObjectStore { .. } => Err(TransportCreateError::Disabled("object_store")),
        }
    }
}
