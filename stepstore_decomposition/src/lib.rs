//! The array domain decomposition API for the `stepstore` crate.
//!
//! A global N-dimensional array is split evenly over a [`ProcessGrid`].
//! Every rank owns one rectangular block: [`decompose`] returns its local shape, its position in the grid
//! and the global offset of its first element.
//!
//! ```rust
//! # use std::num::NonZeroU64;
//! # use stepstore_decomposition::decompose_2d;
//! let two = NonZeroU64::new(2).unwrap();
//! let decomposition = decompose_2d((8, 6), (two, two), 3)?;
//! assert_eq!(decomposition.local_shape(), &[4, 3]);
//! assert_eq!(decomposition.position(), &[1, 1]);
//! assert_eq!(decomposition.offset(), &[4, 3]);
//! # Ok::<(), stepstore_decomposition::DecompositionError>(())
//! ```
//!
//! ## Licence
//! `stepstore_decomposition` is licensed under either of
//! - the Apache License, Version 2.0 or <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license or <http://opensource.org/licenses/MIT>, at your option.

mod process_grid;

use std::{num::NonZeroU64, ops::Range};

use thiserror::Error;

pub use process_grid::ProcessGrid;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;

/// An ND index into an array or grid.
pub type ArrayIndices = Vec<u64>;

/// A decomposition error.
#[derive(Clone, Debug, Error)]
pub enum DecompositionError {
    /// The array and the grid have different dimensionality.
    #[error("incompatible dimensionality {got}, expected {expected}")]
    IncompatibleDimensionality {
        /// The dimensionality of the argument.
        got: usize,
        /// The dimensionality of the grid.
        expected: usize,
    },
    /// A global extent is not a multiple of the grid extent.
    #[error("global extent {extent} on axis {axis} is not divisible by the process grid extent {grid_extent}")]
    NotDivisible {
        /// The axis.
        axis: usize,
        /// The global extent.
        extent: u64,
        /// The grid extent.
        grid_extent: u64,
    },
    /// The rank is not in the grid.
    #[error("rank {rank} is out of range for a process grid of {num_ranks} ranks")]
    RankOutOfRange {
        /// The rank.
        rank: u64,
        /// The number of ranks in the grid.
        num_ranks: u64,
    },
    /// A grid position is outside the grid.
    #[error("position {position:?} is outside the process grid {grid}")]
    PositionOutOfRange {
        /// The position.
        position: ArrayIndices,
        /// The grid.
        grid: ProcessGrid,
    },
    /// A grid extent is zero.
    #[error("process grid extent on axis {axis} is zero")]
    ZeroGridExtent {
        /// The axis.
        axis: usize,
    },
    /// A shape overflows a [`u64`].
    #[error("shape overflows on axis {axis}")]
    Overflow {
        /// The axis.
        axis: usize,
    },
}

/// The block of a global array owned by one rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayDecomposition {
    global_shape: ArrayShape,
    grid: ProcessGrid,
    rank: u64,
    local_shape: ArrayShape,
    position: ArrayIndices,
    offset: ArrayIndices,
}

impl ArrayDecomposition {
    /// The global array shape.
    #[must_use]
    pub fn global_shape(&self) -> &[u64] {
        &self.global_shape
    }

    /// The process grid.
    #[must_use]
    pub fn grid(&self) -> &ProcessGrid {
        &self.grid
    }

    /// The rank owning the block.
    #[must_use]
    pub fn rank(&self) -> u64 {
        self.rank
    }

    /// The shape of the local block.
    #[must_use]
    pub fn local_shape(&self) -> &[u64] {
        &self.local_shape
    }

    /// The position of the rank in the process grid.
    #[must_use]
    pub fn position(&self) -> &[u64] {
        &self.position
    }

    /// The global index of the first element of the local block.
    #[must_use]
    pub fn offset(&self) -> &[u64] {
        &self.offset
    }

    /// The number of elements in the local block.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.local_shape.iter().product()
    }

    /// The local block as a global half-open range per axis.
    #[must_use]
    pub fn subset(&self) -> Vec<Range<u64>> {
        std::iter::zip(&self.offset, &self.local_shape)
            .map(|(offset, shape)| *offset..offset + shape)
            .collect()
    }
}

/// Decompose an array of `global_shape` over `grid` and return the block owned by `rank`.
///
/// Every global extent must be a multiple of the corresponding grid extent, so all blocks have the same shape.
///
/// # Errors
/// Returns a [`DecompositionError`] if
///  - `global_shape` and `grid` have different dimensionality,
///  - a global extent is not divisible by its grid extent, or
///  - `rank` is not less than the number of ranks in the grid.
pub fn decompose(
    global_shape: &[u64],
    grid: &ProcessGrid,
    rank: u64,
) -> Result<ArrayDecomposition, DecompositionError> {
    if global_shape.len() != grid.dimensionality() {
        return Err(DecompositionError::IncompatibleDimensionality {
            got: global_shape.len(),
            expected: grid.dimensionality(),
        });
    }
    let local_shape = std::iter::zip(global_shape, grid.iter())
        .enumerate()
        .map(|(axis, (&extent, grid_extent))| {
            if extent % grid_extent.get() == 0 {
                Ok(extent / grid_extent.get())
            } else {
                Err(DecompositionError::NotDivisible {
                    axis,
                    extent,
                    grid_extent: grid_extent.get(),
                })
            }
        })
        .collect::<Result<ArrayShape, _>>()?;
    let position = grid.position_of(rank)?;
    let offset = std::iter::zip(&position, &local_shape)
        .map(|(p, n)| p * n)
        .collect();
    Ok(ArrayDecomposition {
        global_shape: global_shape.to_vec(),
        grid: grid.clone(),
        rank,
        local_shape,
        position,
        offset,
    })
}

/// Decompose a 2D array of `(gx, gy)` over a grid of `(npx, npy)` processes.
///
/// See [`decompose`].
///
/// # Errors
/// Returns a [`DecompositionError`] if an extent is not divisible or `rank >= npx * npy`.
pub fn decompose_2d(
    (gx, gy): (u64, u64),
    (npx, npy): (NonZeroU64, NonZeroU64),
    rank: u64,
) -> Result<ArrayDecomposition, DecompositionError> {
    decompose(&[gx, gy], &ProcessGrid::new_2d(npx, npy), rank)
}
