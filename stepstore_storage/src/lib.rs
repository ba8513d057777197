//! The storage transport API for the `stepstore` crate.
//!
//! A transport is the narrow interface between the step engine and an object-storage backend.
//! Every unit of storage is an *object* addressed by an [`ObjectKey`]; a backend may be a
//! filesystem, an S3 bucket, an in-memory map, etc.
//!
//! This crate includes an in-memory transport ([`transport::MemoryTransport`]) and a
//! [`transport_adapter::performance_metrics`] adapter that counts transport operations.
//! See `stepstore_filesystem` and `stepstore_object_store` for other backends.
//!
//! ## Licence
//! `stepstore_storage` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod object_key;
mod open_mode;
mod storage_tier;
pub mod transport;
pub mod transport_adapter;
mod transport_sync;


use std::sync::Arc;

use thiserror::Error;

pub use object_key::{ObjectKey, ObjectKeyError, ObjectKeys};
pub use open_mode::OpenMode;
pub use storage_tier::{StorageTier, StorageTierError};
pub use transport_sync::StorageTransportTraits;

/// [`Arc`] wrapped storage transport.
pub type StorageTransport = Arc<dyn StorageTransportTraits>;

/// The type for bytes used in transport write and read methods.
///
/// An alias for [`bytes::Bytes`].
pub type Bytes = bytes::Bytes;

/// An alias for bytes which may or may not be available.
///
/// When an object is read from a transport, it returns `MaybeBytes` which is [`None`] if the key does not exist.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only transport.
    #[error("a write operation was attempted on a read only transport")]
    ReadOnly,
    /// An operation was attempted before [`StorageTransportTraits::open`] or after [`StorageTransportTraits::close`].
    #[error("transport {0} is not open")]
    NotOpen(String),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// An invalid object key.
    #[error("invalid object key {0}")]
    InvalidObjectKey(#[from] ObjectKeyError),
    /// A write stored fewer bytes than requested.
    #[error("short write to {key}: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// The object key.
        key: ObjectKey,
        /// The number of bytes written.
        written: u64,
        /// The number of bytes requested.
        expected: u64,
    },
    /// The requested method is not supported.
    #[error("{0}")]
    Unsupported(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
