//! The step engine.
//!
//! A [`StepEngine`] captures the variables of one rank step by step and writes each variable's block
//! of a step as one object to a [`StorageTransport`].
//!
//! The engine moves through `Opened -> (Stepping <-> Idle) -> Closed`:
//! - [`StepEngine::begin_step`] enters a step; the first step is step 0.
//! - [`StepEngine::put`] serializes values into the buffer of their variable.
//! - [`StepEngine::perform_puts`] writes every non-empty buffer.
//! - [`StepEngine::end_step`] flushes and advances the step counter.
//! - [`StepEngine::close`] flushes and closes the transport.
//!
//! The engine never retries: transport errors are returned to the caller with the rank, step,
//! variable and object key they occurred at.

use std::{collections::HashMap, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use derive_more::Display;
use stepstore_decomposition::DecompositionError;
use stepstore_object_key::{DefaultObjectKeyEncoding, ObjectKeyEncoding, ObjectKeyParts};
use stepstore_storage::{ObjectKey, OpenMode, StorageError, StorageTransport};
use thiserror::Error;

use crate::{
    buffer::{UnknownVariableError, VariableBufferStore},
    config::{CollisionPolicy, ConfigurationError, EngineConfig, MAX_VERBOSE},
    element::Element,
    transform::{BytesTransform, TransformError},
    variable::{ElementType, Variable, VariableCatalog},
};

/// The mode of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum StepMode {
    /// Add data to a new step.
    #[default]
    #[display("append")]
    Append,
    /// Update the data of the current step.
    #[display("update")]
    Update,
    /// Read a step. Not supported by a writer.
    #[display("read")]
    Read,
}

/// The status returned by [`StepEngine::begin_step`].
///
/// A writer always returns [`StepStatus::Ok`]; the other variants exist for readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StepStatus {
    /// The step began.
    #[display("ok")]
    Ok,
    /// No step is available yet.
    #[display("not ready")]
    NotReady,
    /// There are no more steps.
    #[display("end of stream")]
    EndOfStream,
    /// The step could not begin.
    #[display("other error")]
    OtherError,
}

/// How a [`StepEngine::put`] is flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum PutMode {
    /// The values are captured on return. They are written at the next flush.
    #[display("sync")]
    Sync,
    /// The values are captured on return and the engine records that a flush is owed.
    #[default]
    #[display("deferred")]
    Deferred,
}

/// The lifecycle status of a [`StepEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EngineStatus {
    /// Opened, no step has begun.
    #[display("opened")]
    Opened,
    /// Inside a step.
    #[display("stepping")]
    Stepping,
    /// Between steps.
    #[display("idle")]
    Idle,
    /// Closed. No further operations are accepted.
    #[display("closed")]
    Closed,
}

/// A step engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An invalid configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// An invalid decomposition.
    #[error(transparent)]
    Decomposition(#[from] DecompositionError),
    /// The transport could not be opened or probed.
    #[error("rank {rank}: cannot connect transport for {name}: {source}")]
    TransportConnect {
        /// The engine name.
        name: String,
        /// The rank.
        rank: u64,
        /// The transport error.
        source: StorageError,
    },
    /// An object already exists at a key the engine would write.
    #[error("rank {rank} step {step}: object {key} of variable {variable} already exists")]
    ObjectCollision {
        /// The rank.
        rank: u64,
        /// The step.
        step: u64,
        /// The variable name.
        variable: String,
        /// The object key.
        key: ObjectKey,
    },
    /// An object could not be written.
    #[error("rank {rank} step {step}: cannot write object {key} of variable {variable}: {source}")]
    Write {
        /// The rank.
        rank: u64,
        /// The step.
        step: u64,
        /// The variable name.
        variable: String,
        /// The object key.
        key: ObjectKey,
        /// The transport error.
        source: StorageError,
    },
    /// The variable is not in the catalog.
    #[error("rank {rank}: unknown variable {variable}")]
    UnknownVariable {
        /// The rank.
        rank: u64,
        /// The variable name.
        variable: String,
    },
    /// The element type of a put does not match the variable.
    #[error("rank {rank}: variable {variable} has element type {expected}, got {got}")]
    IncompatibleElementType {
        /// The rank.
        rank: u64,
        /// The variable name.
        variable: String,
        /// The element type of the variable.
        expected: ElementType,
        /// The element type of the put.
        got: ElementType,
    },
    /// The number of elements of a put does not match the local block of the variable.
    #[error("rank {rank}: variable {variable} expects {expected} elements, got {got}")]
    InvalidElementCount {
        /// The rank.
        rank: u64,
        /// The variable name.
        variable: String,
        /// The number of elements in the local block.
        expected: u64,
        /// The number of elements of the put.
        got: u64,
    },
    /// The length of pre-serialized bytes does not match the local block of the variable.
    #[error("rank {rank}: variable {variable} expects {expected} bytes, got {got}")]
    InvalidBytesLength {
        /// The rank.
        rank: u64,
        /// The variable name.
        variable: String,
        /// The size of the local block in bytes.
        expected: u64,
        /// The number of bytes of the put.
        got: u64,
    },
    /// The operation is not valid in the current status.
    #[error("rank {rank}: {operation} is invalid when the engine is {status}")]
    InvalidState {
        /// The rank.
        rank: u64,
        /// The operation.
        operation: &'static str,
        /// The engine status.
        status: EngineStatus,
    },
    /// The operation is not supported.
    #[error("{0}")]
    Unsupported(String),
    /// A buffer could not be transformed.
    #[error("rank {rank} step {step}: cannot transform variable {variable}: {source}")]
    Transform {
        /// The rank.
        rank: u64,
        /// The step.
        step: u64,
        /// The variable name.
        variable: String,
        /// The transform error.
        source: TransformError,
    },
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A step engine.
///
/// One engine writes the data of one rank and closes its transport on [`close`](StepEngine::close).
/// Engines of different ranks may write to one backend through separate transports;
/// their objects never collide while they share a job identifier and experiment name and differ in rank.
///
/// ### Example
/// ```rust
/// # use std::sync::Arc;
/// # use stepstore::{EngineConfig, PutMode, StepEngine, StepMode};
/// # use stepstore::variable::{ElementType, Variable, VariableCatalog};
/// # use stepstore::storage::{transport::MemoryTransport, OpenMode};
/// let mut catalog = VariableCatalog::new();
/// catalog.declare(Variable::new("T", ElementType::Float64, vec![4], vec![0], vec![4])?)?;
/// let transport = Arc::new(MemoryTransport::new());
/// let mut engine = StepEngine::open(
///     "run",
///     Arc::new(catalog),
///     transport.clone(),
///     EngineConfig::default(),
///     0,
///     OpenMode::Write,
/// )?;
/// engine.begin_step(StepMode::Append, None)?;
/// engine.put("T", &[1.0f64, 2.0, 3.0, 4.0], PutMode::Deferred)?;
/// engine.end_step()?;
/// engine.close()?;
/// assert_eq!(transport.list().len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct StepEngine {
    name: String,
    rank: u64,
    catalog: Arc<VariableCatalog>,
    transport: StorageTransport,
    config: EngineConfig,
    key_encoding: ObjectKeyEncoding,
    transform: BytesTransform,
    buffers: VariableBufferStore,
    /// The untransformed bytes written for each variable in the current step.
    written: HashMap<String, Bytes>,
    current_step: Option<u64>,
    needs_flush: bool,
    status: EngineStatus,
}

impl core::fmt::Debug for StepEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StepEngine")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .field("config", &self.config)
            .field("current_step", &self.current_step)
            .field("needs_flush", &self.needs_flush)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl StepEngine {
    /// Open an engine named `name` for `rank`, writing the variables of `catalog` to `transport`.
    ///
    /// The transport is opened, and with [`CollisionPolicy::Abort`] the step 0 key of every variable
    /// is probed before the engine is returned.
    ///
    /// # Errors
    /// Returns an [`EngineError`] if
    /// - `mode` is not [`OpenMode::Write`],
    /// - the configured compression cannot be created,
    /// - the transport cannot be opened, or
    /// - an object already exists at a step 0 key.
    pub fn open(
        name: impl Into<String>,
        catalog: Arc<VariableCatalog>,
        transport: StorageTransport,
        config: EngineConfig,
        rank: u64,
        mode: OpenMode,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if mode != OpenMode::Write {
            return Err(EngineError::Unsupported(format!(
                "cannot open {name} in {mode} mode, a step engine only writes"
            )));
        }
        let transform = config.compression().create_transform().map_err(|err| {
            ConfigurationError::InvalidValue {
                key: "compression".to_string(),
                value: config.compression().to_string(),
                reason: err.to_string(),
            }
        })?;
        let key_encoding =
            ObjectKeyEncoding::new(DefaultObjectKeyEncoding::new(config.key_separator()));
        let buffers = VariableBufferStore::new(&catalog, config.target_object_size());

        transport
            .open(&name, mode)
            .map_err(|source| EngineError::TransportConnect {
                name: name.clone(),
                rank,
                source,
            })?;

        let mut engine = Self {
            name,
            rank,
            catalog,
            transport,
            config,
            key_encoding,
            transform,
            buffers,
            written: HashMap::new(),
            current_step: None,
            needs_flush: false,
            status: EngineStatus::Opened,
        };

        match engine.config.collision_policy() {
            CollisionPolicy::Abort => {
                if let Err(err) = engine.probe() {
                    engine.status = EngineStatus::Closed;
                    if let Err(close_err) = engine.transport.close() {
                        log::warn!(
                            "rank {}: cannot close transport of {}: {close_err}",
                            engine.rank,
                            engine.name
                        );
                    }
                    return Err(err);
                }
            }
            CollisionPolicy::Overwrite => log::warn!(
                "rank {}: collision policy is overwrite, existing objects of {} will be replaced",
                engine.rank,
                engine.name
            ),
        }

        if engine.tracing() {
            log::debug!(
                "rank {}: opened {} with {} variables, {:?}",
                engine.rank,
                engine.name,
                engine.catalog.len(),
                engine.config
            );
        }
        Ok(engine)
    }

    fn tracing(&self) -> bool {
        self.config.verbose() == MAX_VERBOSE
    }

    /// Check that no object exists at the step 0 key of any variable.
    fn probe(&self) -> Result<(), EngineError> {
        for variable in self.catalog.iter() {
            let key = self.variable_key(variable, 0);
            let exists = self
                .transport
                .exists(&key)
                .map_err(|source| EngineError::TransportConnect {
                    name: self.name.clone(),
                    rank: self.rank,
                    source,
                })?;
            if exists {
                return Err(EngineError::ObjectCollision {
                    rank: self.rank,
                    step: 0,
                    variable: variable.name().to_string(),
                    key,
                });
            }
        }
        Ok(())
    }

    fn variable_key(&self, variable: &Variable, step: u64) -> ObjectKey {
        let parts = ObjectKeyParts::new(
            self.config.job_id(),
            self.config.experiment_name(),
            variable.name(),
        )
        .with_timestep(step)
        .with_variable_version(variable.version())
        .with_offsets(variable.start())
        .with_rank(self.rank);
        self.key_encoding.encode(&parts)
    }

    fn variable(&self, name: &str) -> Result<&Variable, EngineError> {
        self.catalog
            .get(name)
            .ok_or_else(|| EngineError::UnknownVariable {
                rank: self.rank,
                variable: name.to_string(),
            })
    }

    fn invalid_state(&self, operation: &'static str) -> EngineError {
        EngineError::InvalidState {
            rank: self.rank,
            operation,
            status: self.status,
        }
    }

    /// The key of the object holding variable `name` at `step` for this rank.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownVariable`] if `name` is not in the catalog.
    pub fn object_key(&self, name: &str, step: u64) -> Result<ObjectKey, EngineError> {
        Ok(self.variable_key(self.variable(name)?, step))
    }

    /// Begin a step.
    ///
    /// The first step is step 0. Calling `begin_step` inside a step does nothing.
    /// `timeout` is accepted for interface compatibility with readers and is not used.
    ///
    /// # Errors
    /// Returns [`EngineError::Unsupported`] for [`StepMode::Read`], or [`EngineError::InvalidState`] if closed.
    pub fn begin_step(
        &mut self,
        mode: StepMode,
        _timeout: Option<Duration>,
    ) -> Result<StepStatus, EngineError> {
        if mode == StepMode::Read {
            return Err(EngineError::Unsupported(format!(
                "rank {}: {} cannot begin a read step, a step engine only writes",
                self.rank, self.name
            )));
        }
        match self.status {
            EngineStatus::Closed => return Err(self.invalid_state("begin_step")),
            EngineStatus::Stepping => return Ok(StepStatus::Ok),
            EngineStatus::Opened | EngineStatus::Idle => {}
        }
        let step = *self.current_step.get_or_insert(0);
        self.status = EngineStatus::Stepping;
        if self.tracing() {
            log::debug!("rank {}: begin_step {step} ({mode})", self.rank);
        }
        Ok(StepStatus::Ok)
    }

    /// Put `values` of variable `name`.
    ///
    /// The values are serialized into the buffer of the variable before returning, so `values` may be
    /// reused immediately. A put outside a step begins the next step.
    ///
    /// # Errors
    /// Returns an [`EngineError`] if
    /// - the engine is closed,
    /// - `name` is not in the catalog,
    /// - `T` does not match the element type of the variable, or
    /// - the number of values differs from the number of elements in the local block.
    pub fn put<T: Element>(
        &mut self,
        name: &str,
        values: &[T],
        mode: PutMode,
    ) -> Result<(), EngineError> {
        let variable = self.variable(name)?;
        if variable.element_type() != T::ELEMENT_TYPE {
            return Err(EngineError::IncompatibleElementType {
                rank: self.rank,
                variable: name.to_string(),
                expected: variable.element_type(),
                got: T::ELEMENT_TYPE,
            });
        }
        let expected = variable.num_elements();
        if values.len() as u64 != expected {
            return Err(EngineError::InvalidElementCount {
                rank: self.rank,
                variable: name.to_string(),
                expected,
                got: values.len() as u64,
            });
        }
        self.capture(name, &T::to_bytes(values), mode)
    }

    /// Put pre-serialized `bytes` of variable `name`.
    ///
    /// For fixed size element types, `bytes` must hold exactly the local block of the variable.
    ///
    /// # Errors
    /// Returns an [`EngineError`] if the engine is closed, `name` is not in the catalog, or `bytes` has the wrong length.
    pub fn put_bytes(&mut self, name: &str, bytes: &[u8], mode: PutMode) -> Result<(), EngineError> {
        let variable = self.variable(name)?;
        if let Some(expected) = variable.local_size() {
            if bytes.len() as u64 != expected {
                return Err(EngineError::InvalidBytesLength {
                    rank: self.rank,
                    variable: name.to_string(),
                    expected,
                    got: bytes.len() as u64,
                });
            }
        }
        self.capture(name, bytes, mode)
    }

    fn capture(&mut self, name: &str, bytes: &[u8], mode: PutMode) -> Result<(), EngineError> {
        match self.status {
            EngineStatus::Closed => return Err(self.invalid_state("put")),
            EngineStatus::Opened | EngineStatus::Idle => {
                self.begin_step(StepMode::Append, None)?;
            }
            EngineStatus::Stepping => {}
        }
        self.buffers
            .append(name, bytes)
            .map_err(|err| EngineError::UnknownVariable {
                rank: self.rank,
                variable: err.name().to_string(),
            })?;
        if mode == PutMode::Deferred {
            self.needs_flush = true;
        }
        if self.tracing() {
            log::debug!(
                "rank {}: put {name} ({mode}, {} bytes)",
                self.rank,
                bytes.len()
            );
        }
        Ok(())
    }

    /// Write every non-empty buffer.
    ///
    /// Buffers are written in catalog order, one object per variable. A variable written earlier in
    /// the same step is rewritten with all of its data for the step.
    ///
    /// # Errors
    /// Returns an [`EngineError`] if the engine is closed, an object collides, or a write fails.
    pub fn perform_puts(&mut self) -> Result<(), EngineError> {
        if self.status == EngineStatus::Closed {
            return Err(self.invalid_state("perform_puts"));
        }
        if self.tracing() {
            log::debug!("rank {}: perform_puts", self.rank);
        }
        self.flush()
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        let step = self.current_step.unwrap_or(0);
        let names: Vec<String> = self.buffers.non_empty().map(str::to_string).collect();
        for name in names {
            let rank = self.rank;
            let unknown_variable = move |err: UnknownVariableError| EngineError::UnknownVariable {
                rank,
                variable: err.name().to_string(),
            };
            // Drain only after the write succeeds
            let pending = self.buffers.pending(&name).map_err(unknown_variable)?;
            let (data, rewrite) = match self.written.get(&name) {
                Some(previous) => {
                    let mut data = BytesMut::with_capacity(previous.len() + pending.len());
                    data.extend_from_slice(previous);
                    data.extend_from_slice(pending);
                    (data.freeze(), true)
                }
                None => (Bytes::copy_from_slice(pending), false),
            };
            self.write_object(&name, step, data.clone(), rewrite)?;
            self.buffers.drain(&name).map_err(unknown_variable)?;
            self.written.insert(name, data);
        }
        self.needs_flush = false;
        Ok(())
    }

    fn write_object(
        &self,
        name: &str,
        step: u64,
        data: Bytes,
        rewrite: bool,
    ) -> Result<(), EngineError> {
        let key = self.variable_key(self.variable(name)?, step);
        let payload = self
            .transform
            .transform(data)
            .map_err(|source| EngineError::Transform {
                rank: self.rank,
                step,
                variable: name.to_string(),
                source,
            })?;
        let write_error = |source| EngineError::Write {
            rank: self.rank,
            step,
            variable: name.to_string(),
            key: key.clone(),
            source,
        };

        if self.config.collision_policy() == CollisionPolicy::Abort
            && !rewrite
            && self.transport.exists(&key).map_err(write_error)?
        {
            return Err(EngineError::ObjectCollision {
                rank: self.rank,
                step,
                variable: name.to_string(),
                key: key.clone(),
            });
        }

        let size = payload.len() as u64;
        let target_object_size = self.config.target_object_size();
        if size > target_object_size {
            log::warn!(
                "rank {}: object {key} is {size} bytes, larger than the target object size of {target_object_size} bytes",
                self.rank
            );
        }
        self.transport
            .write(&key, payload, target_object_size)
            .map_err(write_error)?;
        if self.tracing() {
            log::debug!(
                "rank {}: wrote {key} ({size} bytes, {})",
                self.rank,
                self.transform.name()
            );
        }
        Ok(())
    }

    /// End the current step.
    ///
    /// Every non-empty buffer is written, whether or not a flush is owed, then the step counter advances.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidState`] outside a step, or an [`EngineError`] if a write fails.
    /// After a failed write the engine stays in the step and keeps the unwritten bytes, so the call can be retried.
    pub fn end_step(&mut self) -> Result<(), EngineError> {
        if self.status != EngineStatus::Stepping {
            return Err(self.invalid_state("end_step"));
        }
        self.flush()?;
        self.written.clear();
        self.current_step = self.current_step.map(|step| step + 1);
        self.status = EngineStatus::Idle;
        if self.tracing() {
            log::debug!("rank {}: end_step", self.rank);
        }
        Ok(())
    }

    /// Write every non-empty buffer and close the transport.
    ///
    /// Closing a closed engine does nothing.
    ///
    /// # Errors
    /// Returns an [`EngineError`] if a write fails or the transport cannot be closed.
    /// The engine is closed either way.
    pub fn close(&mut self) -> Result<(), EngineError> {
        if self.status == EngineStatus::Closed {
            return Ok(());
        }
        if self.tracing() {
            log::debug!("rank {}: close {}", self.rank, self.name);
        }
        let flushed = self.flush();
        self.written.clear();
        let closed = self.transport.close().map_err(EngineError::Storage);
        self.status = EngineStatus::Closed;
        flushed.and(closed)
    }

    /// The engine name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rank.
    #[must_use]
    pub fn rank(&self) -> u64 {
        self.rank
    }

    /// The variable catalog.
    #[must_use]
    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// The current step, or [`None`] if no step has begun.
    #[must_use]
    pub fn current_step(&self) -> Option<u64> {
        self.current_step
    }

    /// Returns true if a deferred put has not been flushed.
    #[must_use]
    pub fn needs_flush(&self) -> bool {
        self.needs_flush
    }

    /// The number of captured bytes not yet written.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffers.pending_bytes()
    }
}

impl Drop for StepEngine {
    fn drop(&mut self) {
        let pending = self.buffers.pending_bytes();
        if self.status != EngineStatus::Closed && pending > 0 {
            log::warn!(
                "rank {}: {} dropped without close, {pending} captured bytes were not written",
                self.rank,
                self.name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use stepstore_storage::{
        transport::MemoryTransport,
        transport_adapter::performance_metrics::PerformanceMetricsTransportAdapter,
        StorageTransportTraits,
    };

    use super::*;

    type Metrics = PerformanceMetricsTransportAdapter<MemoryTransport>;

    fn catalog() -> Arc<VariableCatalog> {
        Arc::new(
            VariableCatalog::try_from(vec![
                Variable::new("varA", ElementType::Float64, vec![4], vec![0], vec![4]).unwrap(),
                Variable::new("varB", ElementType::Int32, vec![2], vec![0], vec![2]).unwrap(),
            ])
            .unwrap(),
        )
    }

    fn open(config: EngineConfig) -> (StepEngine, Arc<MemoryTransport>, Arc<Metrics>) {
        let memory = Arc::new(MemoryTransport::new());
        let metrics = Arc::new(PerformanceMetricsTransportAdapter::new(memory.clone()));
        let engine = StepEngine::open(
            "test",
            catalog(),
            metrics.clone(),
            config,
            0,
            OpenMode::Write,
        )
        .unwrap();
        (engine, memory, metrics)
    }

    #[test]
    fn engine_open_unsupported_modes() {
        for mode in [OpenMode::Read, OpenMode::Append] {
            let transport = Arc::new(MemoryTransport::new());
            let result = StepEngine::open(
                "test",
                catalog(),
                transport.clone(),
                EngineConfig::default(),
                0,
                mode,
            );
            assert!(matches!(result, Err(EngineError::Unsupported(_))));
            assert!(!transport.is_open());
        }
    }

    #[test]
    fn engine_step_counter() {
        let (mut engine, _, _) = open(EngineConfig::default());
        assert_eq!(engine.status(), EngineStatus::Opened);
        assert_eq!(engine.current_step(), None);
        assert_eq!(
            engine.begin_step(StepMode::Append, None).unwrap(),
            StepStatus::Ok
        );
        assert_eq!(engine.current_step(), Some(0));
        assert_eq!(
            engine
                .begin_step(StepMode::Update, Some(Duration::from_secs(1)))
                .unwrap(),
            StepStatus::Ok
        );
        assert_eq!(engine.current_step(), Some(0));
        engine.end_step().unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert_eq!(engine.current_step(), Some(1));
        assert!(matches!(
            engine.end_step(),
            Err(EngineError::InvalidState {
                operation: "end_step",
                status: EngineStatus::Idle,
                ..
            })
        ));
        engine.begin_step(StepMode::Append, None).unwrap();
        assert_eq!(engine.current_step(), Some(1));
        assert!(matches!(
            engine.begin_step(StepMode::Read, None),
            Err(EngineError::Unsupported(_))
        ));
    }

    #[test]
    fn engine_put_validation() {
        let (mut engine, _, _) = open(EngineConfig::default());
        assert!(matches!(
            engine.put("varC", &[1.0f64], PutMode::Sync),
            Err(EngineError::UnknownVariable { .. })
        ));
        assert!(matches!(
            engine.put("varA", &[1i32, 2, 3, 4], PutMode::Sync),
            Err(EngineError::IncompatibleElementType {
                expected: ElementType::Float64,
                got: ElementType::Int32,
                ..
            })
        ));
        assert!(matches!(
            engine.put("varA", &[1.0f64], PutMode::Sync),
            Err(EngineError::InvalidElementCount {
                expected: 4,
                got: 1,
                ..
            })
        ));
        assert!(matches!(
            engine.put_bytes("varB", &[0; 7], PutMode::Sync),
            Err(EngineError::InvalidBytesLength {
                expected: 8,
                got: 7,
                ..
            })
        ));
        assert_eq!(engine.pending_bytes(), 0);
        assert_eq!(engine.status(), EngineStatus::Opened);
    }

    #[test]
    fn engine_put_implicit_step() {
        let (mut engine, _, _) = open(EngineConfig::default());
        engine.put("varB", &[1i32, 2], PutMode::Sync).unwrap();
        assert_eq!(engine.status(), EngineStatus::Stepping);
        assert_eq!(engine.current_step(), Some(0));
        assert!(!engine.needs_flush());
        engine.put_bytes("varB", &[0; 8], PutMode::Deferred).unwrap();
        assert!(engine.needs_flush());
        assert_eq!(engine.pending_bytes(), 16);
        engine.perform_puts().unwrap();
        assert!(!engine.needs_flush());
        assert_eq!(engine.pending_bytes(), 0);
    }

    #[test]
    fn engine_perform_puts_empty() {
        let (mut engine, _, metrics) = open(EngineConfig::default());
        engine.perform_puts().unwrap();
        engine.begin_step(StepMode::Append, None).unwrap();
        engine.perform_puts().unwrap();
        engine.end_step().unwrap();
        assert_eq!(metrics.writes(), 0);
    }

    #[test]
    fn engine_rewrite_within_step() {
        let (mut engine, memory, metrics) = open(EngineConfig::default());
        engine.begin_step(StepMode::Append, None).unwrap();
        engine.put("varB", &[1i32, 2], PutMode::Deferred).unwrap();
        engine.perform_puts().unwrap();
        engine.put("varB", &[3i32, 4], PutMode::Deferred).unwrap();
        engine.end_step().unwrap();
        assert_eq!(metrics.writes(), 2);
        let key = engine.object_key("varB", 0).unwrap();
        assert_eq!(memory.list(), vec![key.clone()]);
        let expected = i32::to_bytes(&[1, 2, 3, 4]).into_owned();
        assert_eq!(memory.read(&key).unwrap().unwrap(), Bytes::from(expected));
    }

    #[test]
    fn engine_closed() {
        let (mut engine, memory, metrics) = open(EngineConfig::default());
        engine.put("varB", &[1i32, 2], PutMode::Deferred).unwrap();
        engine.close().unwrap();
        assert_eq!(engine.status(), EngineStatus::Closed);
        assert_eq!(metrics.writes(), 1);
        assert_eq!(metrics.closes(), 1);
        assert!(!memory.is_open());
        engine.close().unwrap();
        assert_eq!(metrics.closes(), 1);
        assert!(matches!(
            engine.put("varB", &[1i32, 2], PutMode::Sync),
            Err(EngineError::InvalidState { operation: "put", .. })
        ));
        assert!(matches!(
            engine.perform_puts(),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(matches!(
            engine.begin_step(StepMode::Append, None),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn engine_object_key() {
        let mut config = EngineConfig::default();
        config.set_job_id("job").set_experiment_name("exp");
        let (engine, _, _) = open(config);
        assert_eq!(
            engine.object_key("varA", 3).unwrap().as_str(),
            "job/exp/3/varA/0/0/0"
        );
        assert!(engine.object_key("varC", 0).is_err());
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn engine_gzip() {
        use crate::transform::Compression;

        let mut config = EngineConfig::default();
        config.set_compression(Compression::Gzip { level: 9 });
        let (mut engine, memory, _) = open(config);
        engine.put("varA", &[0.0f64; 4], PutMode::Deferred).unwrap();
        engine.end_step().unwrap();
        let key = engine.object_key("varA", 0).unwrap();
        let object = memory.read(&key).unwrap().unwrap();
        assert_eq!(&object[..2], &[0x1f, 0x8b]);
    }
}
