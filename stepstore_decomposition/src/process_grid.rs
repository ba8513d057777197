use std::num::NonZeroU64;

use derive_more::{Deref, Display};
use itertools::Itertools;

use crate::{ArrayIndices, ArrayShape, DecompositionError};

/// A regular grid of processes.
///
/// Ranks are assigned to grid positions in row-major order: the last axis varies fastest.
/// In 2D with a grid of `npx` by `npy`, rank `r` sits at `(r / npy, r % npy)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deref, Display)]
#[display("[{}]", _0.iter().join(", "))]
pub struct ProcessGrid(Vec<NonZeroU64>);

impl ProcessGrid {
    /// Create a process grid with `extents` processes along each axis.
    #[must_use]
    pub fn new(extents: Vec<NonZeroU64>) -> Self {
        Self(extents)
    }

    /// Create a 2D process grid.
    #[must_use]
    pub fn new_2d(npx: NonZeroU64, npy: NonZeroU64) -> Self {
        Self(vec![npx, npy])
    }

    /// Returns the number of axes.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.0.len()
    }

    /// Returns the extents as [`u64`].
    #[must_use]
    pub fn extents_u64(&self) -> Vec<u64> {
        self.0.iter().copied().map(NonZeroU64::get).collect()
    }

    /// Returns the number of ranks in the grid, or [`None`] if it overflows a [`u64`].
    #[must_use]
    pub fn num_ranks(&self) -> Option<u64> {
        self.0
            .iter()
            .try_fold(1u64, |acc, extent| acc.checked_mul(extent.get()))
    }

    /// Returns the grid position of `rank`.
    ///
    /// # Errors
    /// Returns [`DecompositionError::RankOutOfRange`] if `rank` is not in the grid.
    pub fn position_of(&self, rank: u64) -> Result<ArrayIndices, DecompositionError> {
        let num_ranks = self.num_ranks().unwrap_or(u64::MAX);
        if rank >= num_ranks {
            return Err(DecompositionError::RankOutOfRange { rank, num_ranks });
        }
        let mut position = vec![0; self.0.len()];
        let mut remainder = rank;
        for (p, extent) in position.iter_mut().zip(&self.0).rev() {
            *p = remainder % extent.get();
            remainder /= extent.get();
        }
        Ok(position)
    }

    /// Returns the rank at grid `position`. The inverse of [`position_of`](ProcessGrid::position_of).
    ///
    /// # Errors
    /// Returns a [`DecompositionError`] if `position` has the wrong dimensionality or lies outside the grid.
    pub fn rank_of(&self, position: &[u64]) -> Result<u64, DecompositionError> {
        if position.len() != self.0.len() {
            return Err(DecompositionError::IncompatibleDimensionality {
                got: position.len(),
                expected: self.0.len(),
            });
        }
        if std::iter::zip(position, &self.0).any(|(p, extent)| *p >= extent.get()) {
            return Err(DecompositionError::PositionOutOfRange {
                position: position.to_vec(),
                grid: self.clone(),
            });
        }
        // Positions are in range, so the rank is below num_ranks
        Ok(std::iter::zip(position, &self.0)
            .fold(0, |rank, (p, extent)| rank * extent.get() + p))
    }

    /// Returns the global shape of an array where every rank holds a block of `local_shape`.
    ///
    /// # Errors
    /// Returns a [`DecompositionError`] if `local_shape` has the wrong dimensionality or the product overflows.
    pub fn global_shape(&self, local_shape: &[u64]) -> Result<ArrayShape, DecompositionError> {
        if local_shape.len() != self.0.len() {
            return Err(DecompositionError::IncompatibleDimensionality {
                got: local_shape.len(),
                expected: self.0.len(),
            });
        }
        std::iter::zip(local_shape, &self.0)
            .enumerate()
            .map(|(axis, (local, extent))| {
                local
                    .checked_mul(extent.get())
                    .ok_or(DecompositionError::Overflow { axis })
            })
            .collect()
    }
}

impl TryFrom<&[u64]> for ProcessGrid {
    type Error = DecompositionError;

    fn try_from(extents: &[u64]) -> Result<Self, Self::Error> {
        extents
            .iter()
            .enumerate()
            .map(|(axis, extent)| {
                NonZeroU64::new(*extent).ok_or(DecompositionError::ZeroGridExtent { axis })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl From<Vec<NonZeroU64>> for ProcessGrid {
    fn from(extents: Vec<NonZeroU64>) -> Self {
        Self(extents)
    }
}
