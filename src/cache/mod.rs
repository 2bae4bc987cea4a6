//! Feature cache layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      FeatureStore                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐  │
//! │  │ resident LRU │  │  in-flight   │  │   DiskArea    │  │
//! │  │ (cell data)  │  │ (singleflight│  │ (one file per │  │
//! │  │              │  │  per cell)   │  │  computed cell│  │
//! │  └──────────────┘  └──────┬───────┘  └───────────────┘  │
//! └───────────────────────────┼─────────────────────────────┘
//!                             │ compute / reload
//!                             ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │            WorkerPool (shared compute threads)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`CellGrid`]: partitions a volume into balanced, clipped cells
//! - [`FeatureStore`]: lazily computes, persists and serves cells
//! - [`DiskArea`]: private backing directory of a store
//! - [`WorkerPool`]: explicitly passed pool running cell jobs
//! - [`StoreOptions`]: resident-set bound and cache location

mod disk;
mod grid;
mod options;
mod pool;
mod store;

pub use disk::DiskArea;
pub use grid::{cell_dimensions, CellGrid, TARGET_CELL_VOLUME, TIME_CELL_LENGTH};
pub use options::{
    resident_cells_for_memory, StoreOptions, MAX_RESIDENT_CELLS, MEMORY_PERCENT,
    MIN_RESIDENT_CELLS,
};
pub use pool::WorkerPool;
pub use store::{CellValues, FeatureStore, StoreStats};
