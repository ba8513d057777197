use auto_impl::auto_impl;

use super::{Bytes, MaybeBytes, ObjectKey, OpenMode, StorageError};

/// Storage transport traits.
///
/// Methods take `&self` so that a single transport can be shared by every writer in a process.
/// Implementations use interior locking where they hold mutable state.
#[auto_impl(Arc, Box, &)]
pub trait StorageTransportTraits: Send + Sync {
    /// Open the transport for objects belonging to `name` in `mode`.
    ///
    /// Opening an already open transport replaces its name and mode.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the backend cannot be reached or `mode` is not supported.
    fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError>;

    /// Returns true if the transport is open.
    fn is_open(&self) -> bool;

    /// Return the size in bytes of the object at `key`.
    ///
    /// Returns [`None`] if the key does not exist.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn size_key(&self, key: &ObjectKey) -> Result<Option<u64>, StorageError>;

    /// Returns true if an object exists at `key`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        Ok(self.size_key(key)?.is_some())
    }

    /// Store `value` as the object at `key`, replacing any existing object.
    ///
    /// `size_hint` is the expected size of objects written through this transport.
    /// Backends may use it to size buffers, and may ignore it.
    ///
    /// # Errors
    /// Returns a [`StorageError`] on failure to store, including a short write.
    fn write(&self, key: &ObjectKey, value: Bytes, size_hint: u64) -> Result<(), StorageError>;

    /// Retrieve the object at `key`.
    ///
    /// Returns [`None`] if the key does not exist.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error or the transport is write only.
    fn read(&self, key: &ObjectKey) -> Result<MaybeBytes, StorageError> {
        Err(StorageError::Unsupported(format!(
            "read of {key} is not supported by this transport"
        )))
    }

    /// Flush pending writes.
    ///
    /// A no-op for transports where every write is synchronous.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if pending writes cannot be persisted.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Close the transport. Closing a closed transport is a no-op.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the backend fails to release its resources.
    fn close(&self) -> Result<(), StorageError>;
}
