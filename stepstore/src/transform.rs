//! Byte transforms applied to a drained buffer before it is written.

use std::sync::Arc;

use bytes::Bytes;
use derive_more::{Deref, Display, From};
use thiserror::Error;

/// A byte transform error.
#[derive(Debug, Error)]
pub enum TransformError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid compression specification.
    #[error("invalid compression {0:?}, expected none or gzip[:level] with a level of 0 to 9")]
    InvalidCompression(String),
    /// The transform is not available in this build.
    #[error("{0} transform is not enabled, enable the {0} feature")]
    Disabled(&'static str),
}

/// Byte transform traits.
pub trait BytesTransformTraits: core::fmt::Debug + Send + Sync {
    /// The transform name.
    fn name(&self) -> &'static str;

    /// Transform `bytes`.
    ///
    /// # Errors
    /// Returns a [`TransformError`] if the transform fails.
    fn transform(&self, bytes: Bytes) -> Result<Bytes, TransformError>;
}

/// A byte transform.
#[derive(Debug, Clone, From, Deref)]
pub struct BytesTransform(Arc<dyn BytesTransformTraits>);

impl BytesTransform {
    /// Create a byte transform.
    pub fn new<T: BytesTransformTraits + 'static>(transform: T) -> Self {
        let transform: Arc<dyn BytesTransformTraits> = Arc::new(transform);
        transform.into()
    }
}

impl Default for BytesTransform {
    fn default() -> Self {
        Self::new(IdentityTransform)
    }
}

/// The identity transform. Bytes pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl BytesTransformTraits for IdentityTransform {
    fn name(&self) -> &'static str {
        "none"
    }

    fn transform(&self, bytes: Bytes) -> Result<Bytes, TransformError> {
        Ok(bytes)
    }
}

/// A `gzip` transform.
#[cfg(feature = "gzip")]
#[derive(Debug, Clone)]
pub struct GzipTransform {
    level: u32,
}

#[cfg(feature = "gzip")]
impl GzipTransform {
    /// Create a new `gzip` transform.
    ///
    /// # Errors
    /// Returns [`TransformError::InvalidCompression`] if `level` is greater than 9.
    pub fn new(level: u32) -> Result<Self, TransformError> {
        if level > 9 {
            return Err(TransformError::InvalidCompression(format!("gzip:{level}")));
        }
        Ok(Self { level })
    }
}

#[cfg(feature = "gzip")]
impl BytesTransformTraits for GzipTransform {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn transform(&self, bytes: Bytes) -> Result<Bytes, TransformError> {
        use std::io::{Cursor, Read};

        let mut encoder = flate2::bufread::GzEncoder::new(
            Cursor::new(bytes),
            flate2::Compression::new(self.level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(Bytes::from(out))
    }
}

/// The compression applied to every object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Compression {
    /// No compression.
    #[default]
    #[display("none")]
    None,
    /// `gzip` compression at `level` (0 to 9).
    #[display("gzip:{level}")]
    Gzip {
        /// The compression level.
        level: u32,
    },
}

impl Compression {
    /// The default `gzip` compression level.
    pub const DEFAULT_GZIP_LEVEL: u32 = 6;

    /// Create the transform.
    ///
    /// # Errors
    /// Returns a [`TransformError`] if the transform is invalid or not enabled.
    pub fn create_transform(&self) -> Result<BytesTransform, TransformError> {
        match self {
            Self::None => Ok(BytesTransform::new(IdentityTransform)),
            #[cfg(feature = "gzip")]
            Self::Gzip { level } => Ok(BytesTransform::new(GzipTransform::new(*level)?)),
            #[cfg(not(feature = "gzip"))]
            Self::Gzip { .. } => Err(TransformError::Disabled("gzip")),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let (name, level) = match lower.split_once(':') {
            Some((name, level)) => (name, Some(level)),
            None => (lower.as_str(), None),
        };
        match (name, level) {
            ("none" | "", None) => Ok(Self::None),
            ("gzip", None) => Ok(Self::Gzip {
                level: Self::DEFAULT_GZIP_LEVEL,
            }),
            ("gzip", Some(level)) => match level.parse::<u32>() {
                Ok(level) if level <= 9 => Ok(Self::Gzip { level }),
                _ => Err(TransformError::InvalidCompression(s.to_string())),
            },
            _ => Err(TransformError::InvalidCompression(s.to_string())),
        }
    }
}
