//! The object key encoding API for the `stepstore` crate.
//!
//! An object key encoding maps the [`ObjectKeyParts`] of one write (job, experiment, timestep, variable,
//! variable version, block offsets and rank) to the [`ObjectKey`] of the object that holds it.
//! Encodings are pure: existence checks belong to the transport.
//!
//! ## Licence
//! `stepstore_object_key` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

mod default;
mod parts;
mod separator;

use std::sync::Arc;

use derive_more::{Deref, From};
use thiserror::Error;

pub use default::DefaultObjectKeyEncoding;
pub use parts::ObjectKeyParts;
pub use separator::{ObjectKeySeparator, ObjectKeySeparatorError};
pub use stepstore_storage::ObjectKey;

/// An object key encoding.
#[derive(Debug, Clone, From, Deref)]
pub struct ObjectKeyEncoding(Arc<dyn ObjectKeyEncodingTraits>);

impl ObjectKeyEncoding {
    /// Create an object key encoding.
    pub fn new<T: ObjectKeyEncodingTraits + 'static>(object_key_encoding: T) -> Self {
        let object_key_encoding: Arc<dyn ObjectKeyEncodingTraits> = Arc::new(object_key_encoding);
        object_key_encoding.into()
    }
}

impl<T> From<T> for ObjectKeyEncoding
where
    T: ObjectKeyEncodingTraits + 'static,
{
    fn from(object_key_encoding: T) -> Self {
        Self::new(object_key_encoding)
    }
}

impl Default for ObjectKeyEncoding {
    fn default() -> Self {
        Self::new(DefaultObjectKeyEncoding::default())
    }
}

/// Object key encoding traits.
pub trait ObjectKeyEncodingTraits: core::fmt::Debug + Send + Sync {
    /// Encode `parts` into an object key.
    ///
    /// Distinct `parts` must produce distinct keys.
    fn encode(&self, parts: &ObjectKeyParts) -> ObjectKey;

    /// Decode an object key produced by [`encode`](ObjectKeyEncodingTraits::encode).
    ///
    /// # Errors
    /// Returns an [`ObjectKeyDecodeError`] if `key` was not produced by this encoding.
    fn decode(&self, key: &ObjectKey) -> Result<ObjectKeyParts, ObjectKeyDecodeError>;
}

/// An object key decoding error.
#[derive(Clone, Debug, Error)]
pub enum ObjectKeyDecodeError {
    /// The key has too few fields.
    #[error("object key {_0} has {_1} fields")]
    FieldCount(ObjectKey, usize),
    /// A field could not be decoded.
    #[error("object key {_0} has an invalid {_1} field")]
    InvalidField(ObjectKey, &'static str),
}
