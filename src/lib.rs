//! # Feature Cache
//!
//! Lazily computed, disk-backed feature stacks for N-dimensional images.
//!
//! A feature configuration turns an image into a multi-channel feature
//! volume. Volumes easily outgrow memory, so this crate tiles them into
//! cells, computes each cell on demand on a worker pool, persists it to a
//! private disk area and keeps only a bounded set of cells resident.
//!
//! ## Features
//!
//! - **Lazy tiling**: balanced cells of roughly 16K voxels, computed on first read
//! - **At-most-once computation**: concurrent readers of a cell share one job
//! - **Bounded memory**: LRU resident set, evicted cells reload from disk
//! - **Atomic reconfiguration**: a new configuration swaps in a fresh store
//!   and notifies listeners after the swap
//! - **Type normalization**: any real-valued pixel kind is read as `f32`
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`image`] - Source images, `f32` normalization and border extension
//! - [`features`] - Feature configurations and cell targets
//! - [`cache`] - Cell grid, worker pool, disk area and the feature store
//! - [`stack`] - Feature stack, per-channel slices and notifications
//! - [`config`] - CLI configuration of the demo binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use feature_cache::{BoxMean, FeatureConfig, FeatureStack, Image, StoreOptions, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = Image::from_fn(&[2048, 2048], |p| ((p[0] + p[1]) % 256) as u8);
//!     let pool = WorkerPool::with_available_parallelism()?;
//!
//!     let stack = FeatureStack::new(
//!         image.into(),
//!         FeatureConfig::new(BoxMean::new(3)),
//!         false,
//!         pool,
//!         StoreOptions::default(),
//!     )?;
//!
//!     // Only the cell holding (100, 100) is computed
//!     let smoothed = stack.slices()[2].get(&[100, 100]).await?;
//!     println!("{smoothed}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod features;
pub mod image;
pub mod stack;

// Re-export commonly used types
pub use cache::{
    cell_dimensions, CellGrid, CellValues, DiskArea, FeatureStore, StoreOptions, StoreStats,
    WorkerPool, TARGET_CELL_VOLUME, TIME_CELL_LENGTH,
};
pub use config::Config;
pub use error::{FeatureError, StackError, StoreError};
pub use features::{
    BoxMean, CellTarget, ChannelSliceMut, FeatureConfig, FeatureSet, Identity,
};
pub use image::{
    prepare_image, ExtendedView, Image, Interval, PixelKind, PreparedImage, Rgb, SourceImage,
};
pub use stack::{FeatureSlice, FeatureStack, Notifier, SubscriptionId};
