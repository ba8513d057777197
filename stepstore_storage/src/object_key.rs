use derive_more::Display;
use thiserror::Error;

/// An object key.
///
/// A key is a `/` delimited path of one or more segments.
/// A valid key does not start or end with `/`, has no empty segments and has no `.` or `..` segments.
/// These rules keep the mapping from keys to filesystem paths and object store paths one-to-one.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display)]
#[display("{_0}")]
pub struct ObjectKey(String);

/// A list of [`ObjectKey`].
pub type ObjectKeys = Vec<ObjectKey>;

/// An invalid object key.
#[derive(Clone, Debug, Error)]
#[error("invalid object key {_0}")]
pub struct ObjectKeyError(String);

impl From<String> for ObjectKeyError {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl ObjectKey {
    /// Create a new object key from `key`.
    ///
    /// # Errors
    /// Returns [`ObjectKeyError`] if `key` is not valid according to [`ObjectKey::validate()`].
    pub fn new(key: impl Into<String>) -> Result<Self, ObjectKeyError> {
        let key = key.into();
        if Self::validate(&key) {
            Ok(Self(key))
        } else {
            Err(ObjectKeyError(key))
        }
    }

    /// Create a new object key from `key` without validation.
    ///
    /// # Safety
    /// `key` is not validated, so this can result in an invalid object key.
    #[must_use]
    pub unsafe fn new_unchecked(key: impl Into<String>) -> Self {
        let key = key.into();
        debug_assert!(Self::validate(&key));
        Self(key)
    }

    /// Extracts a string slice of the underlying object key [String].
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Validates a key.
    #[must_use]
    pub fn validate(key: &str) -> bool {
        !key.is_empty() && key.split('/').all(|segment| !matches!(segment, "" | "." | ".."))
    }

    /// Returns the segments of the key.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Returns true if the key starts with `prefix`, where `prefix` is a sequence of whole segments.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        prefix.is_empty()
            || self
                .0
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// Return a new key with `prefix` prepended as leading segments.
    ///
    /// # Errors
    /// Returns [`ObjectKeyError`] if the resulting key is not valid.
    pub fn with_prefix(&self, prefix: &str) -> Result<Self, ObjectKeyError> {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            Ok(self.clone())
        } else {
            Self::new(format!("{prefix}/{}", self.0))
        }
    }
}

impl TryFrom<&str> for ObjectKey {
    type Error = ObjectKeyError;

    fn try_from(key: &str) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = ObjectKeyError;

    fn try_from(key: String) -> Result<Self, Self::Error> {
        Self::new(key)
    }
}
