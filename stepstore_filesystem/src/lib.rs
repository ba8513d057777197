//! A filesystem transport for the `stepstore` crate.
//!
//! Every object is a file at `<base_path>/<pool>/<key>`, where `<pool>` is the pool of the configured
//! [`StorageTier`] and the `/` separated segments of the key become directories.
//!
//! ## Licence
//! `stepstore_filesystem` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

use stepstore_storage::{
    transport::TransportOpenState, Bytes, MaybeBytes, ObjectKey, ObjectKeys, OpenMode,
    StorageError, StorageTier, StorageTransportTraits,
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

use std::{
    collections::HashMap,
    fs::OpenOptions,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

/// The largest write buffer used for a single object.
const MAX_WRITE_BUFFER: u64 = 8 * 1024 * 1024;

/// Options for use with [`FilesystemTransport`]
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct FilesystemTransportOptions {
    tier: StorageTier,
    sync_data: bool,
}

impl FilesystemTransportOptions {
    /// Set the storage tier. Objects are placed under the tier's pool directory.
    pub fn tier(&mut self, tier: StorageTier) -> &mut Self {
        self.tier = tier;
        self
    }

    /// Set whether or not every write is synced to the device before returning.
    pub fn sync_data(&mut self, sync_data: bool) -> &mut Self {
        self.sync_data = sync_data;
        self
    }
}

/// A synchronous file system transport.
#[derive(Debug)]
pub struct FilesystemTransport {
    base_path: PathBuf,
    readonly: bool,
    options: FilesystemTransportOptions,
    state: TransportOpenState,
    files: Mutex<HashMap<ObjectKey, Arc<RwLock<()>>>>,
}

impl FilesystemTransport {
    /// Create a new file system transport at a given `base_path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemTransportCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemTransportCreateError> {
        Self::new_with_options(base_path, FilesystemTransportOptions::default())
    }

    /// Create a new file system transport at a given `base_path` and `options`.
    ///
    /// # Errors
    /// Returns a [`FilesystemTransportCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new_with_options<P: AsRef<Path>>(
        base_path: P,
        options: FilesystemTransportOptions,
    ) -> Result<Self, FilesystemTransportCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemTransportCreateError::InvalidBasePath(base_path));
        }

        let readonly = if base_path.exists() {
            let md = std::fs::metadata(&base_path)?;
            if !md.is_dir() {
                return Err(FilesystemTransportCreateError::NotADirectory(base_path));
            }
            md.permissions().readonly()
        } else {
            // the path does not exist, so try and create it. If this succeeds, the filesystem is not read only
            std::fs::create_dir_all(&base_path)?;
            std::fs::remove_dir(&base_path)?;
            false
        };

        Ok(Self {
            base_path,
            readonly,
            options,
            state: TransportOpenState::new(),
            files: Mutex::default(),
        })
    }

    /// Returns the storage tier.
    #[must_use]
    pub fn tier(&self) -> StorageTier {
        self.options.tier
    }

    /// Returns the directory holding the objects of the configured tier.
    #[must_use]
    pub fn pool_path(&self) -> PathBuf {
        self.base_path.join(self.options.tier.pool_name())
    }

    /// Maps an [`ObjectKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &ObjectKey) -> PathBuf {
        let mut path = self.pool_path();
        path.extend(key.segments());
        path
    }

    /// Returns all keys in the configured tier, in sorted order.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if a file path cannot be mapped to a key.
    pub fn list(&self) -> Result<ObjectKeys, StorageError> {
        let pool_path = self.pool_path();
        WalkDir::new(&pool_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| {
                let relative = entry
                    .path()
                    .strip_prefix(&pool_path)
                    .map_err(|err| StorageError::Other(err.to_string()))?;
                let segments: Vec<_> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Ok(ObjectKey::new(segments.join("/"))?)
            })
            .collect()
    }

    fn get_file_mutex(&self, key: &ObjectKey) -> Arc<RwLock<()>> {
        let mut files = self.files.lock();
        let file = files
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone();
        drop(files);
        file
    }

    /// Release a lock from [`get_file_mutex`](Self::get_file_mutex), forgetting it if no one else holds it.
    fn release_file_mutex(&self, key: &ObjectKey, file: Arc<RwLock<()>>) {
        let mut files = self.files.lock();
        drop(file);
        if files
            .get(key)
            .is_some_and(|file| Arc::strong_count(file) == 1)
        {
            files.remove(key);
        }
    }

    fn write_file(&self, key: &ObjectKey, value: &Bytes, size_hint: u64) -> Result<(), StorageError> {
        // Create directories
        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&key_path)?;
        let capacity = usize::try_from(size_hint.clamp(1, MAX_WRITE_BUFFER)).unwrap_or(1);
        let mut writer = BufWriter::with_capacity(capacity, file);
        writer.write_all(value)?;
        let file = writer.into_inner().map_err(|err| err.into_error())?;
        if self.options.sync_data {
            file.sync_data()?;
        }

        let written = file.metadata()?.len();
        let expected = value.len() as u64;
        if written == expected {
            Ok(())
        } else {
            Err(StorageError::ShortWrite {
                key: key.clone(),
                written,
                expected,
            })
        }
    }

    fn read_file(&self, key: &ObjectKey) -> Result<MaybeBytes, StorageError> {
        let mut file = match OpenOptions::new().read(true).open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) => {
                if err.kind() == std::io::ErrorKind::NotFound {
                    return Ok(None);
                }
                return Err(err.into());
            }
        };
        if !file.metadata()?.is_file() {
            return Ok(None);
        }
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(Some(Bytes::from(buffer)))
    }
}

impl StorageTransportTraits for FilesystemTransport {
    fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError> {
        if mode.is_writable() && self.readonly {
            return Err(StorageError::ReadOnly);
        }
        self.state.open(name, mode)?;
        log::debug!(
            "filesystem transport opened {name} ({mode}) at {}",
            self.pool_path().display()
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn size_key(&self, key: &ObjectKey) -> Result<Option<u64>, StorageError> {
        let key_path = self.key_to_fspath(key);
        match std::fs::metadata(key_path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &ObjectKey, value: Bytes, size_hint: u64) -> Result<(), StorageError> {
        self.state.check_writable()?;

        let file = self.get_file_mutex(key);
        let result = {
            let _lock = file.write();
            self.write_file(key, &value, size_hint)
        };
        self.release_file_mutex(key, file);
        result
    }

    fn read(&self, key: &ObjectKey) -> Result<MaybeBytes, StorageError> {
        self.state.check_open()?;

        let file = self.get_file_mutex(key);
        let result = {
            let _lock = file.read();
            self.read_file(key)
        };
        self.release_file_mutex(key, file);
        result
    }

    fn close(&self) -> Result<(), StorageError> {
        if self.state.close() {
            log::debug!("filesystem transport closed {}", self.pool_path().display());
        }
        Ok(())
    }
}

/// A filesystem transport creation error.
#[derive(Debug, Error)]
pub enum FilesystemTransportCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
    /// The path points to an existing file.
    #[error("base path {0} is not a directory")]
    NotADirectory(PathBuf),
}
