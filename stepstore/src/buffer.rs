//! Per-variable step buffers.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::variable::VariableCatalog;

/// The variable is not in the catalog the buffers were created for.
#[derive(Clone, Debug, Error)]
#[error("unknown variable {_0}")]
pub struct UnknownVariableError(String);

impl UnknownVariableError {
    /// The variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct StepBuffer {
    name: String,
    data: BytesMut,
    reserve: usize,
}

/// One growable byte buffer per catalog variable.
///
/// Buffers are created empty once per run. Draining a buffer hands its bytes out and leaves it empty
/// with its reserved capacity restored, so a buffer never holds bytes of more than one flush.
#[derive(Debug, Default)]
pub struct VariableBufferStore {
    buffers: Vec<StepBuffer>,
    index: HashMap<String, usize>,
}

impl VariableBufferStore {
    /// Create an empty buffer for every variable of `catalog`.
    ///
    /// Each buffer reserves the smaller of `target_object_size` and the size of the variable's local block.
    #[must_use]
    pub fn new(catalog: &VariableCatalog, target_object_size: u64) -> Self {
        let mut store = Self::default();
        store.init(catalog, target_object_size);
        store
    }

    /// Discard all buffers and create an empty buffer for every variable of `catalog`.
    pub fn init(&mut self, catalog: &VariableCatalog, target_object_size: u64) {
        self.buffers.clear();
        self.index.clear();
        for variable in catalog {
            let reserve = variable
                .local_size()
                .unwrap_or(0)
                .min(target_object_size);
            let reserve = usize::try_from(reserve).unwrap_or(usize::MAX);
            self.index
                .insert(variable.name().to_string(), self.buffers.len());
            self.buffers.push(StepBuffer {
                name: variable.name().to_string(),
                data: BytesMut::with_capacity(reserve),
                reserve,
            });
        }
    }

    fn buffer(&self, name: &str) -> Result<&StepBuffer, UnknownVariableError> {
        let index = *self
            .index
            .get(name)
            .ok_or_else(|| UnknownVariableError(name.to_string()))?;
        Ok(&self.buffers[index])
    }

    fn buffer_mut(&mut self, name: &str) -> Result<&mut StepBuffer, UnknownVariableError> {
        let index = *self
            .index
            .get(name)
            .ok_or_else(|| UnknownVariableError(name.to_string()))?;
        Ok(&mut self.buffers[index])
    }

    /// Append `data` to the buffer of `name`.
    ///
    /// # Errors
    /// Returns an [`UnknownVariableError`] if `name` has no buffer.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<(), UnknownVariableError> {
        self.buffer_mut(name)?.data.extend_from_slice(data);
        Ok(())
    }

    /// Returns true if the buffer of `name` is empty.
    ///
    /// # Errors
    /// Returns an [`UnknownVariableError`] if `name` has no buffer.
    pub fn is_empty(&self, name: &str) -> Result<bool, UnknownVariableError> {
        Ok(self.buffer(name)?.data.is_empty())
    }

    /// The bytes of the buffer of `name`, without taking them.
    ///
    /// # Errors
    /// Returns an [`UnknownVariableError`] if `name` has no buffer.
    pub fn pending(&self, name: &str) -> Result<&[u8], UnknownVariableError> {
        Ok(&self.buffer(name)?.data)
    }

    /// Take the bytes of the buffer of `name`, leaving it empty.
    ///
    /// # Errors
    /// Returns an [`UnknownVariableError`] if `name` has no buffer.
    pub fn drain(&mut self, name: &str) -> Result<Bytes, UnknownVariableError> {
        let buffer = self.buffer_mut(name)?;
        let bytes = buffer.data.split().freeze();
        buffer.data.reserve(buffer.reserve);
        Ok(bytes)
    }

    /// Iterate over the names of the buffers holding bytes, in catalog order.
    pub fn non_empty(&self) -> impl Iterator<Item = &str> {
        self.buffers
            .iter()
            .filter(|buffer| !buffer.data.is_empty())
            .map(|buffer| buffer.name.as_str())
    }

    /// The total number of buffered bytes.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffers.iter().map(|buffer| buffer.data.len()).sum()
    }

    /// The number of buffers.
    #[must_use]
    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }
}
