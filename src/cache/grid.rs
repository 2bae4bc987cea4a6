//! Cell grids over N-dimensional volumes.
//!
//! The grid partitions an image (or the feature volume derived from it) into
//! fixed-size, non-overlapping cells. The last cell along a dimension is
//! clipped to the volume bounds when the extent is not a multiple of the
//! cell size.
//!
//! # Cell Size
//!
//! Cells are sized so that each holds roughly [`TARGET_CELL_VOLUME`] voxels
//! whatever the dimensionality: a uniform side length `s` is chosen as the
//! smallest integer with `s^n >= 128 * 128`. A trailing time axis is left out
//! of that balance and gets [`TIME_CELL_LENGTH`] frames per cell.

use crate::error::StoreError;
use crate::image::Interval;

/// Target number of voxels per cell (`128 * 128`).
pub const TARGET_CELL_VOLUME: usize = 128 * 128;

/// Frames per cell along a time axis.
pub const TIME_CELL_LENGTH: usize = 2;

// =============================================================================
// Partitioning
// =============================================================================

/// Smallest side length `s` with `s^n >= TARGET_CELL_VOLUME`.
fn side_length(n: usize) -> usize {
    let target = TARGET_CELL_VOLUME as u128;
    let volume = |s: usize| (s as u128).checked_pow(n as u32).unwrap_or(u128::MAX);

    let mut s = (TARGET_CELL_VOLUME as f64).powf(1.0 / n as f64).ceil() as usize;
    s = s.max(1);
    // Correct for floating-point error in either direction.
    while s > 1 && volume(s - 1) >= target {
        s -= 1;
    }
    while volume(s) < target {
        s += 1;
    }
    s
}

/// Cell side lengths for an `n`-dimensional image.
///
/// With `is_time_series`, the last of the `n` dimensions is treated as time.
pub fn cell_dimensions(n: usize, is_time_series: bool) -> Result<Vec<usize>, StoreError> {
    if n == 0 {
        return Err(StoreError::Configuration(
            "image must have at least one dimension".to_string(),
        ));
    }
    if is_time_series {
        if n == 1 {
            return Err(StoreError::Configuration(
                "a time series needs at least one spatial dimension".to_string(),
            ));
        }
        let mut dims = vec![side_length(n - 1); n - 1];
        dims.push(TIME_CELL_LENGTH);
        Ok(dims)
    } else {
        Ok(vec![side_length(n); n])
    }
}

// =============================================================================
// CellGrid
// =============================================================================

/// A regular grid of cells over a volume anchored at the origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellGrid {
    img_dimensions: Vec<usize>,
    cell_dimensions: Vec<usize>,
}

impl CellGrid {
    /// Create a grid from volume and cell extents.
    pub fn new(img_dimensions: Vec<usize>, cell_dimensions: Vec<usize>) -> Result<Self, StoreError> {
        if img_dimensions.is_empty() {
            return Err(StoreError::Configuration(
                "grid must have at least one dimension".to_string(),
            ));
        }
        if img_dimensions.len() != cell_dimensions.len() {
            return Err(StoreError::Configuration(format!(
                "grid has {} dimensions but {} cell dimensions",
                img_dimensions.len(),
                cell_dimensions.len()
            )));
        }
        if cell_dimensions.contains(&0) {
            return Err(StoreError::Configuration(
                "cell dimensions must be positive".to_string(),
            ));
        }
        Ok(Self {
            img_dimensions,
            cell_dimensions,
        })
    }

    /// Grid over an image using the balanced cell size.
    pub fn for_image(img_dimensions: &[usize], is_time_series: bool) -> Result<Self, StoreError> {
        let cells = cell_dimensions(img_dimensions.len(), is_time_series)?;
        Self::new(img_dimensions.to_vec(), cells)
    }

    /// Append an axis covered by a single cell, e.g. the channel axis.
    pub fn extend(&self, len: usize) -> Result<Self, StoreError> {
        let mut img = self.img_dimensions.clone();
        let mut cell = self.cell_dimensions.clone();
        img.push(len);
        cell.push(len);
        Self::new(img, cell)
    }

    pub fn num_dimensions(&self) -> usize {
        self.img_dimensions.len()
    }

    pub fn img_dimensions(&self) -> &[usize] {
        &self.img_dimensions
    }

    pub fn cell_dimensions(&self) -> &[usize] {
        &self.cell_dimensions
    }

    /// Number of cells along each dimension.
    pub fn grid_dimensions(&self) -> Vec<usize> {
        self.img_dimensions
            .iter()
            .zip(&self.cell_dimensions)
            .map(|(img, cell)| img.div_ceil(*cell))
            .collect()
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.grid_dimensions().iter().product()
    }

    /// Voxels in a full (unclipped) cell.
    pub fn cell_volume(&self) -> usize {
        self.cell_dimensions.iter().product()
    }

    /// Bounds of the whole volume.
    pub fn interval(&self) -> Interval {
        Interval::from_dimensions(&self.img_dimensions)
    }

    /// Linear cell index of a grid position, dimension 0 fastest.
    pub fn linear_index(&self, grid_position: &[usize]) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for (pos, len) in grid_position.iter().zip(self.grid_dimensions()) {
            index += pos * stride;
            stride *= len;
        }
        index
    }

    /// Grid position of a linear cell index.
    pub fn grid_position(&self, index: usize) -> Vec<usize> {
        let mut rest = index;
        self.grid_dimensions()
            .into_iter()
            .map(|len| {
                let pos = rest % len;
                rest /= len;
                pos
            })
            .collect()
    }

    /// Bounds of a cell, clipped to the volume.
    pub fn cell_interval(&self, index: usize) -> Interval {
        let grid_position = self.grid_position(index);
        let mut min = Vec::with_capacity(grid_position.len());
        let mut max = Vec::with_capacity(grid_position.len());
        for (d, pos) in grid_position.into_iter().enumerate() {
            let lo = pos * self.cell_dimensions[d];
            let hi = (lo + self.cell_dimensions[d]).min(self.img_dimensions[d]);
            min.push(lo as i64);
            max.push(hi as i64 - 1);
        }
        Interval::new(min, max)
    }

    /// Linear indices of the cells overlapping `interval`, dimension 0 fastest.
    ///
    /// Only the grid positions between the cells holding the interval's
    /// corners are visited. `interval` must lie inside the volume.
    pub fn cells_overlapping(&self, interval: &Interval) -> Vec<usize> {
        if interval.is_empty() {
            return Vec::new();
        }
        let first: Vec<i64> = (0..self.num_dimensions())
            .map(|d| interval.min()[d] / self.cell_dimensions[d] as i64)
            .collect();
        let last: Vec<i64> = (0..self.num_dimensions())
            .map(|d| interval.max()[d] / self.cell_dimensions[d] as i64)
            .collect();
        Interval::new(first, last)
            .positions()
            .map(|position| {
                let grid_position: Vec<usize> = position.iter().map(|&p| p as usize).collect();
                self.linear_index(&grid_position)
            })
            .collect()
    }

    /// Linear index of the cell containing `position`, `None` when outside.
    pub fn cell_of(&self, position: &[i64]) -> Option<usize> {
        if !self.interval().contains(position) {
            return None;
        }
        let grid_position: Vec<usize> = position
            .iter()
            .zip(&self.cell_dimensions)
            .map(|(p, cell)| *p as usize / cell)
            .collect();
        Some(self.linear_index(&grid_position))
    }
}
