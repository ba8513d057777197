use std::str::FromStr;

use derive_more::Display;
use thiserror::Error;

/// A storage tier.
///
/// A tier selects a pool within a backend.
/// Transports place every object under the pool prefix returned by [`StorageTier::pool_name`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Display)]
pub enum StorageTier {
    /// Fast storage, e.g. SSD.
    #[default]
    #[display("fast")]
    Fast,
    /// Slow storage, e.g. HDD.
    #[display("slow")]
    Slow,
    /// Archival storage, e.g. tape.
    #[display("archive")]
    Archive,
}

/// An unrecognised storage tier.
#[derive(Clone, Debug, Error)]
#[error("unknown storage tier {_0}, expected one of fast, slow, archive")]
pub struct StorageTierError(String);

impl StorageTier {
    /// The pool prefix used for objects in this tier.
    #[must_use]
    pub const fn pool_name(self) -> &'static str {
        match self {
            Self::Fast => "storage_pool",
            Self::Slow => "slow_pool",
            Self::Archive => "archive_pool",
        }
    }
}

impl FromStr for StorageTier {
    type Err = StorageTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "slow" => Ok(Self::Slow),
            "archive" | "tape" => Ok(Self::Archive),
            _ => Err(StorageTierError(s.to_string())),
        }
    }
}
