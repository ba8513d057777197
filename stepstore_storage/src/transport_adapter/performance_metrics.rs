//! A transport adapter which records performance metrics.

use crate::{Bytes, MaybeBytes, ObjectKey, OpenMode, StorageError, StorageTransportTraits};

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// The performance metrics transport adapter. Accumulates metrics, such as bytes read and written.
///
/// It is intended to aid in testing by allowing the application to validate that metrics
/// (e.g., bytes written, total write and existence check operations) match expected values for specific operations.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use stepstore_storage::transport::MemoryTransport;
/// # use stepstore_storage::transport_adapter::performance_metrics::PerformanceMetricsTransportAdapter;
/// let transport = Arc::new(MemoryTransport::new());
/// let transport = Arc::new(PerformanceMetricsTransportAdapter::new(transport));
/// // do some transport operations...
/// // assert_eq!(transport.bytes_written(), ...);
/// // assert_eq!(transport.writes(), ...);
/// // assert_eq!(transport.exists_checks(), ...);
/// ```
#[derive(Debug)]
pub struct PerformanceMetricsTransportAdapter<TTransport: ?Sized> {
    transport: Arc<TTransport>,
    bytes_read: AtomicUsize,
    bytes_written: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
    exists_checks: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl<TTransport: ?Sized> PerformanceMetricsTransportAdapter<TTransport> {
    /// Create a new performance metrics transport adapter.
    #[must_use]
    pub fn new(transport: Arc<TTransport>) -> Self {
        Self {
            transport,
            bytes_read: AtomicUsize::default(),
            bytes_written: AtomicUsize::default(),
            reads: AtomicUsize::default(),
            writes: AtomicUsize::default(),
            exists_checks: AtomicUsize::default(),
            opens: AtomicUsize::default(),
            closes: AtomicUsize::default(),
        }
    }

    /// Reset the performance metrics.
    pub fn reset(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.exists_checks.store(0, Ordering::Relaxed);
        self.opens.store(0, Ordering::Relaxed);
        self.closes.store(0, Ordering::Relaxed);
    }

    /// Returns the number of bytes read.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Returns the number of bytes written.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Returns the number of read requests.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of write requests.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of existence checks.
    pub fn exists_checks(&self) -> usize {
        self.exists_checks.load(Ordering::Relaxed)
    }

    /// Returns the number of open requests.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    /// Returns the number of close requests.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }
}

impl<TTransport: ?Sized + StorageTransportTraits> StorageTransportTraits
    for PerformanceMetricsTransportAdapter<TTransport>
{
    fn open(&self, name: &str, mode: OpenMode) -> Result<(), StorageError> {
        self.opens.fetch_add(1, Ordering::Relaxed);
        self.transport.open(name, mode)
    }

    fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    fn size_key(&self, key: &ObjectKey) -> Result<Option<u64>, StorageError> {
        self.transport.size_key(key)
    }

    fn exists(&self, key: &ObjectKey) -> Result<bool, StorageError> {
        self.exists_checks.fetch_add(1, Ordering::Relaxed);
        self.transport.exists(key)
    }

    fn write(&self, key: &ObjectKey, value: Bytes, size_hint: u64) -> Result<(), StorageError> {
        self.bytes_written.fetch_add(value.len(), Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.transport.write(key, value, size_hint)
    }

    fn read(&self, key: &ObjectKey) -> Result<MaybeBytes, StorageError> {
        let value = self.transport.read(key);
        let bytes_read = value
            .as_ref()
            .map_or(0, |v| v.as_ref().map_or(0, Bytes::len));
        self.bytes_read.fetch_add(bytes_read, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
        value
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.transport.flush()
    }

    fn close(&self) -> Result<(), StorageError> {
        self.closes.fetch_add(1, Ordering::Relaxed);
        self.transport.close()
    }
}
