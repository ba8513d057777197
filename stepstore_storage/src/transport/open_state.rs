use parking_lot::Mutex;

use crate::{OpenMode, StorageError};

/// The open/closed state shared by the transports in this workspace.
///
/// Tracks the name and [`OpenMode`] a transport was opened with and rejects [`OpenMode::Append`].
#[derive(Debug, Default)]
pub struct TransportOpenState(Mutex<Option<(String, OpenMode)>>);

impl TransportOpenState {
    /// Create a closed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the transport as open for `name` in `mode`.
    ///
    /// # Errors
    /// Returns [`StorageError::Unsupported`] for [`OpenMode::Append`].
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError> {
        if mode == OpenMode::Append {
            // TODO: resume into existing objects once the existence and size checks are wired through the key encoding
            return Err(StorageError::Unsupported(format!(
                "cannot open {name}: append mode is not implemented"
            )));
        }
        *self.0.lock() = Some((name.to_string(), mode));
        Ok(())
    }

    /// Mark the transport as closed. Returns true if it was open.
    pub fn close(&self) -> bool {
        self.0.lock().take().is_some()
    }

    /// Returns true if open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.0.lock().is_some()
    }

    /// Returns the name and mode if open.
    #[must_use]
    pub fn get(&self) -> Option<(String, OpenMode)> {
        self.0.lock().clone()
    }

    /// Check that the transport is open in a writable mode.
    ///
    /// # Errors
    /// Returns [`StorageError::NotOpen`] if closed, or [`StorageError::ReadOnly`] if opened for reading.
    pub fn check_writable(&self) -> Result<(), StorageError> {
        match &*self.0.lock() {
            None => Err(StorageError::NotOpen("transport".to_string())),
            Some((_, mode)) if !mode.is_writable() => Err(StorageError::ReadOnly),
            Some(_) => Ok(()),
        }
    }

    /// Check that the transport is open.
    ///
    /// # Errors
    /// Returns [`StorageError::NotOpen`] if closed.
    pub fn check_open(&self) -> Result<(), StorageError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StorageError::NotOpen("transport".to_string()))
        }
    }
}
