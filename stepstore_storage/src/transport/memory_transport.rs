//! A synchronous in-memory transport.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::TransportOpenState;
use crate::{
    Bytes, MaybeBytes, ObjectKey, ObjectKeys, OpenMode, StorageError, StorageTransportTraits,
};

/// A synchronous in-memory transport.
///
/// Storage tiers have no meaning in memory, so objects are stored under their key as given.
#[derive(Debug)]
pub struct MemoryTransport {
    data_map: Mutex<BTreeMap<ObjectKey, Bytes>>,
    state: TransportOpenState,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Create a new memory transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_map: Mutex::default(),
            state: TransportOpenState::new(),
        }
    }

    /// Returns all keys in the transport, in sorted order.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn list(&self) -> ObjectKeys {
        let data_map = self.data_map.lock().unwrap();
        data_map.keys().cloned().collect()
    }

    /// Returns the total size in bytes of all objects.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn size(&self) -> u64 {
        let data_map = self.data_map.lock().unwrap();
        data_map.values().map(|value| value.len() as u64).sum()
    }
}

impl StorageTransportTraits for MemoryTransport {
    fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError> {
        self.state.open(name, mode)
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn size_key(&self, key: &ObjectKey) -> Result<Option<u64>, StorageError> {
        let data_map = self.data_map.lock().unwrap();
        Ok(data_map.get(key).map(|value| value.len() as u64))
    }

    fn write(&self, key: &ObjectKey, value: Bytes, _size_hint: u64) -> Result<(), StorageError> {
        self.state.check_writable()?;
        let mut data_map = self.data_map.lock().unwrap();
        data_map.insert(key.clone(), value);
        Ok(())
    }

    fn read(&self, key: &ObjectKey) -> Result<MaybeBytes, StorageError> {
        self.state.check_open()?;
        let data_map = self.data_map.lock().unwrap();
        Ok(data_map.get(key).cloned())
    }

    fn close(&self) -> Result<(), StorageError> {
        self.state.close();
        Ok(())
    }
}
