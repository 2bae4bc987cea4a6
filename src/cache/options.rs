//! Store configuration and resident-set sizing.

use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Share of available memory the resident set may use by default (percent).
pub const MEMORY_PERCENT: u64 = 25;

/// Lower bound for the default resident set, in cells.
pub const MIN_RESIDENT_CELLS: usize = 16;

/// Upper bound for the default resident set, in cells.
pub const MAX_RESIDENT_CELLS: usize = 65_536;

/// Options for creating a [`super::FeatureStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Maximum number of cells kept in memory; derived from available
    /// memory when `None`.
    pub resident_cells: Option<NonZeroUsize>,

    /// Directory under which the backing area is allocated; the system temp
    /// directory when `None`.
    pub cache_dir: Option<PathBuf>,
}

impl StoreOptions {
    pub fn with_resident_cells(mut self, cells: NonZeroUsize) -> Self {
        self.resident_cells = Some(cells);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Resident-set bound for cells of `cell_bytes` bytes.
    pub fn resident_capacity(&self, cell_bytes: usize) -> NonZeroUsize {
        self.resident_cells
            .unwrap_or_else(|| resident_cells_for_memory(cell_bytes, available_memory()))
    }
}

/// Get available system memory in bytes.
fn available_memory() -> u64 {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Number of cells that fit in the default share of `available_memory`.
///
/// Separated from the system query for testability.
pub fn resident_cells_for_memory(cell_bytes: usize, available_memory: u64) -> NonZeroUsize {
    let usable = available_memory / 100 * MEMORY_PERCENT;
    let cells = usable / cell_bytes.max(1) as u64;
    let cells = (cells.min(MAX_RESIDENT_CELLS as u64) as usize).max(MIN_RESIDENT_CELLS);

    tracing::debug!(
        available_memory_mb = available_memory / (1024 * 1024),
        cell_bytes,
        cells,
        "Resident cell capacity computed"
    );

    NonZeroUsize::new(cells).unwrap_or(NonZeroUsize::MIN)
}
