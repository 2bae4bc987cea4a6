//! Configuration for the feature-cache demo binary.
//!
//! Options come from command-line arguments with `FEATURE_CACHE_*`
//! environment-variable fallbacks:
//!
//! - `FEATURE_CACHE_SHAPE` - Image extents, comma-separated (default: 1024,1024)
//! - `FEATURE_CACHE_TIME_SERIES` - Treat the last axis as time (default: false)
//! - `FEATURE_CACHE_THREADS` - Worker threads, 0 for all cores (default: 0)
//! - `FEATURE_CACHE_RESIDENT_CELLS` - Resident cell bound, 0 for memory-based (default: 0)
//! - `FEATURE_CACHE_DIR` - Parent directory of the backing area (default: system temp)
//! - `FEATURE_CACHE_CHANNELS` - Channels of the demo feature set (default: 3)

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use crate::cache::{StoreOptions, WorkerPool};
use crate::error::StoreError;

// =============================================================================
// Default Values
// =============================================================================

/// Default image extents.
pub const DEFAULT_SHAPE: &str = "1024,1024";

/// Default channel count of the demo feature set.
pub const DEFAULT_CHANNELS: usize = 3;

/// Largest accepted channel count.
pub const MAX_CHANNELS: usize = 16;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Feature cache - lazily computed, disk-backed feature stacks.
///
/// Builds a synthetic image, computes a multi-scale feature stack over it
/// cell by cell and reports cache statistics.
#[derive(Parser, Debug, Clone)]
#[command(name = "feature-cache")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Image extents, one per axis.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = DEFAULT_SHAPE,
        env = "FEATURE_CACHE_SHAPE"
    )]
    pub shape: Vec<usize>,

    /// Treat the last axis as time.
    #[arg(long, default_value_t = false, env = "FEATURE_CACHE_TIME_SERIES")]
    pub time_series: bool,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Number of worker threads; 0 uses all available cores.
    #[arg(long, default_value_t = 0, env = "FEATURE_CACHE_THREADS")]
    pub threads: usize,

    /// Maximum number of cells kept in memory; 0 derives it from available
    /// memory.
    #[arg(long, default_value_t = 0, env = "FEATURE_CACHE_RESIDENT_CELLS")]
    pub resident_cells: usize,

    /// Directory in which the backing area is created.
    #[arg(long, env = "FEATURE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of channels of the demo feature set.
    #[arg(long, default_value_t = DEFAULT_CHANNELS, env = "FEATURE_CACHE_CHANNELS")]
    pub channels: usize,

    // =========================================================================
    // Output Configuration
    // =========================================================================
    /// Print statistics as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.shape.is_empty() {
            return Err("shape must name at least one axis".to_string());
        }
        if self.shape.iter().any(|&extent| extent == 0) {
            return Err(format!("shape {:?} has an empty axis", self.shape));
        }
        if self.time_series && self.shape.len() < 2 {
            return Err("a time series needs at least one spatial axis besides time".to_string());
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(format!("channels must be between 1 and {MAX_CHANNELS}"));
        }
        if let Some(dir) = &self.cache_dir {
            if !dir.is_dir() {
                return Err(format!("cache directory {} does not exist", dir.display()));
            }
        }
        Ok(())
    }

    /// Store options described by this configuration.
    pub fn store_options(&self) -> StoreOptions {
        let mut options = StoreOptions::default();
        if let Some(cells) = NonZeroUsize::new(self.resident_cells) {
            options = options.with_resident_cells(cells);
        }
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }
        options
    }

    /// Build the worker pool described by this configuration.
    pub fn worker_pool(&self) -> Result<WorkerPool, StoreError> {
        match NonZeroUsize::new(self.threads) {
            Some(threads) => WorkerPool::new(threads),
            None => WorkerPool::with_available_parallelism(),
        }
    }

    /// Number of samples in the configured image.
    pub fn voxel_count(&self) -> usize {
        self.shape.iter().product()
    }
}

// =============================================================================
// Tests
// =============================================================================
