//! An [`object_store`] transport for the `stepstore` crate.
//!
//! [`ObjectStoreTransport`] wraps any [`ObjectStore`] (S3, GCS, Azure, local filesystem, in-memory, ...) and
//! drives its asynchronous API to completion with an [`AsyncToSyncBlockOn`] implementation.
//! Objects of a [`StorageTier`] are placed under the tier's pool name, below an optional base path.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use stepstore_object_store::{FuturesBlockOn, ObjectStoreTransport};
//! # use stepstore_storage::StorageTier;
//! let store = Arc::new(object_store::memory::InMemory::new());
//! let transport = ObjectStoreTransport::new(store, FuturesBlockOn, StorageTier::Fast);
//! ```
//!
//! ## Licence
//! `stepstore_object_store` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

use std::{future::Future, sync::Arc};

use object_store::{path::Path, ObjectStore, PutPayload};
use stepstore_storage::{
    transport::TransportOpenState, Bytes, MaybeBytes, ObjectKey, OpenMode, StorageError,
    StorageTier, StorageTransportTraits,
};
use thiserror::Error;
use url::Url;

/// Drives a future to completion on the calling thread.
pub trait AsyncToSyncBlockOn: Send + Sync {
    /// Runs the provided future to completion.
    fn block_on<F: Future>(&self, future: F) -> F::Output;
}

/// Blocks on futures with [`futures::executor::block_on`].
///
/// Sufficient for stores that do not depend on a `tokio` reactor, such as
/// [`InMemory`](object_store::memory::InMemory) and [`LocalFileSystem`](object_store::local::LocalFileSystem).
#[derive(Debug, Clone, Copy, Default)]
pub struct FuturesBlockOn;

impl AsyncToSyncBlockOn for FuturesBlockOn {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        futures::executor::block_on(future)
    }
}

/// Blocks on futures with a dedicated `tokio` runtime.
///
/// Required for network stores.
#[derive(Debug)]
pub struct TokioBlockOn(tokio::runtime::Runtime);

impl TokioBlockOn {
    /// Create a current thread runtime with the IO and time drivers enabled.
    ///
    /// # Errors
    /// Returns an [`std::io::Error`] if the runtime cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self(runtime))
    }
}

impl From<tokio::runtime::Runtime> for TokioBlockOn {
    fn from(runtime: tokio::runtime::Runtime) -> Self {
        Self(runtime)
    }
}

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.0.block_on(future)
    }
}

/// A transport over an [`ObjectStore`].
pub struct ObjectStoreTransport<TBlockOn: AsyncToSyncBlockOn> {
    store: Arc<dyn ObjectStore>,
    base: Vec<String>,
    tier: StorageTier,
    block_on: TBlockOn,
    state: TransportOpenState,
}

impl<TBlockOn: AsyncToSyncBlockOn> std::fmt::Debug for ObjectStoreTransport<TBlockOn> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreTransport")
            .field("store", &self.store.to_string())
            .field("base", &self.base)
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}

fn handle_result<T>(result: Result<T, object_store::Error>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(result) => Ok(Some(result)),
        Err(object_store::Error::NotFound { .. }) => Ok(None),
        Err(err) => Err(StorageError::Other(err.to_string())),
    }
}

impl<TBlockOn: AsyncToSyncBlockOn> ObjectStoreTransport<TBlockOn> {
    /// Create a new transport over `store`, placing objects under the pool of `tier`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, block_on: TBlockOn, tier: StorageTier) -> Self {
        Self {
            store,
            base: Vec::new(),
            tier,
            block_on,
            state: TransportOpenState::new(),
        }
    }

    /// Create a new transport from a URL such as `s3://bucket/path`, `file:///tmp/data` or `memory:///`.
    ///
    /// The path of the URL becomes the base path of every object.
    ///
    /// # Errors
    /// Returns an [`ObjectStoreTransportCreateError`] if the URL is invalid or names an unsupported scheme.
    pub fn from_url(
        url: &str,
        block_on: TBlockOn,
        tier: StorageTier,
    ) -> Result<Self, ObjectStoreTransportCreateError> {
        let url = Url::parse(url)?;
        let (store, path) = object_store::parse_url(&url)?;
        let mut transport = Self::new(Arc::from(store), block_on, tier);
        transport.base = path.parts().map(|part| part.as_ref().to_string()).collect();
        Ok(transport)
    }

    /// Returns the storage tier.
    #[must_use]
    pub fn tier(&self) -> StorageTier {
        self.tier
    }

    /// Maps an [`ObjectKey`] to an object store [`Path`].
    #[must_use]
    pub fn key_to_path(&self, key: &ObjectKey) -> Path {
        Path::from_iter(
            self.base
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(self.tier.pool_name()))
                .chain(key.segments()),
        )
    }
}

impl<TBlockOn: AsyncToSyncBlockOn> StorageTransportTraits for ObjectStoreTransport<TBlockOn> {
    fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError> {
        self.state.open(name, mode)?;
        log::debug!("object store transport opened {name} ({mode}) on {}", self.store);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn size_key(&self, key: &ObjectKey) -> Result<Option<u64>, StorageError> {
        let path = self.key_to_path(key);
        let meta = handle_result(self.block_on.block_on(self.store.head(&path)))?;
        Ok(meta.map(|meta| meta.size))
    }

    fn write(&self, key: &ObjectKey, value: Bytes, _size_hint: u64) -> Result<(), StorageError> {
        self.state.check_writable()?;
        let path = self.key_to_path(key);
        self.block_on
            .block_on(self.store.put(&path, PutPayload::from(value)))
            .map_err(|err| StorageError::Other(err.to_string()))?;
        Ok(())
    }

    fn read(&self, key: &ObjectKey) -> Result<MaybeBytes, StorageError> {
        self.state.check_open()?;
        let path = self.key_to_path(key);
        self.block_on.block_on(async {
            let Some(get) = handle_result(self.store.get(&path).await)? else {
                return Ok(None);
            };
            let bytes = get
                .bytes()
                .await
                .map_err(|err| StorageError::Other(err.to_string()))?;
            Ok(Some(bytes))
        })
    }

    fn close(&self) -> Result<(), StorageError> {
        if self.state.close() {
            log::debug!("object store transport closed on {}", self.store);
        }
        Ok(())
    }
}

/// An object store transport creation error.
#[derive(Debug, Error)]
pub enum ObjectStoreTransportCreateError {
    /// The URL could not be parsed.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// The URL scheme is unsupported or the store could not be built.
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_store_key_to_path() {
        let store = Arc::new(object_store::memory::InMemory::new());
        let transport = ObjectStoreTransport::new(store, FuturesBlockOn, StorageTier::Slow);
        let key = ObjectKey::new("job/exp/3/T/0/0/4/1").unwrap();
        assert_eq!(
            transport.key_to_path(&key).as_ref(),
            "slow_pool/job/exp/3/T/0/0/4/1"
        );
    }

    #[test]
    fn object_store_from_url_base() {
        let transport =
            ObjectStoreTransport::from_url("memory:///base/dir", FuturesBlockOn, StorageTier::Fast)
                .unwrap();
        let key = ObjectKey::new("k").unwrap();
        assert_eq!(
            transport.key_to_path(&key).as_ref(),
            "base/dir/storage_pool/k"
        );
    }

    #[test]
    fn object_store_invalid_url() {
        assert!(matches!(
            ObjectStoreTransport::from_url("not a url", FuturesBlockOn, StorageTier::Fast),
            Err(ObjectStoreTransportCreateError::Url(_))
        ));
    }
}
