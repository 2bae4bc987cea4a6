//! Disk-backed, lazily computed feature store.
//!
//! The store holds the feature volume of one (image, configuration) pair:
//! the image's spatial extent plus a trailing channel axis. The volume is
//! tiled into cells by a [`CellGrid`]; every cell holds all channels of its
//! spatial block.
//!
//! # Cell Lifecycle
//!
//! ```text
//!  unmaterialized ──compute──▶ resident + on disk ──evict──▶ on disk
//!        ▲                           ▲                          │
//!        └──── computation error     └─────────reload───────────┘
//! ```
//!
//! A cell is computed at most once per store. Once written it is never
//! rewritten: eviction drops the in-memory copy and the next access reloads
//! the same bytes from disk.
//!
//! # Concurrency
//!
//! Readers of the same missing cell converge on a single job (singleflight);
//! jobs for different cells run in parallel on the shared [`WorkerPool`].
//! Bookkeeping (resident table, materialized set, in-flight table) sits
//! behind one short-held lock that is never held while computing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::features::{CellTarget, FeatureConfig};
use crate::image::{prepare_image, ExtendedView, SourceImage};

use super::disk::DiskArea;
use super::grid::CellGrid;
use super::options::StoreOptions;
use super::pool::WorkerPool;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Values of one materialized cell, channel planes back to back.
pub type CellValues = Arc<[f32]>;

// =============================================================================
// Statistics
// =============================================================================

/// Counters describing how a store has served reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Reads served from the resident set
    pub hits: u64,
    /// Cells computed by the feature set
    pub computed: u64,
    /// Cells reloaded from disk after eviction
    pub reloaded: u64,
    /// Resident cells dropped from memory
    pub evicted: u64,
    /// Failed cell jobs (computation or storage)
    pub failures: u64,
    /// Bytes written to the backing area
    pub bytes_written: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    computed: AtomicU64,
    reloaded: AtomicU64,
    evicted: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// A cell job in progress and the readers waiting on it.
struct InFlight {
    notify: Notify,
    result: Mutex<Option<Result<CellValues, StoreError>>>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            result: Mutex::new(None),
        }
    }
}

/// Bookkeeping guarded by a single short-held lock.
struct State {
    /// Backing area; `None` once the store is closed
    disk: Option<Arc<DiskArea>>,
    /// Cells currently held in memory
    resident: LruCache<usize, CellValues>,
    /// Cells written to disk
    materialized: HashSet<usize>,
    /// Cell jobs in progress
    in_flight: HashMap<usize, Arc<InFlight>>,
    /// First storage failure; the store is unusable afterwards
    failure: Option<StoreError>,
}

impl State {
    fn check_usable(&self, id: u64) -> Result<Arc<DiskArea>, StoreError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.disk
            .clone()
            .ok_or_else(|| StoreError::Lifecycle(format!("feature store {id} is closed")))
    }
}

struct Shared {
    id: u64,
    grid: CellGrid,
    feature_grid: CellGrid,
    config: FeatureConfig,
    source: ExtendedView,
    pool: WorkerPool,
    capacity: NonZeroUsize,
    state: Mutex<State>,
    counters: Counters,
}

// =============================================================================
// FeatureStore
// =============================================================================

/// A lazily materialized, disk-backed feature volume.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct FeatureStore {
    shared: Arc<Shared>,
}

impl FeatureStore {
    /// Create a store over `grid` (the spatial grid of `source`).
    ///
    /// Allocates the backing disk area eagerly; no cell is computed until it
    /// is first read.
    ///
    /// # Errors
    /// - [`StoreError::Configuration`] if the configuration has no channels
    ///   or the grid does not match the source image
    /// - [`StoreError::Storage`] if the backing area cannot be allocated
    pub fn create(
        grid: CellGrid,
        config: FeatureConfig,
        source: ExtendedView,
        pool: WorkerPool,
        options: &StoreOptions,
    ) -> Result<Self, StoreError> {
        let channels = config.channel_count();
        if channels == 0 {
            return Err(StoreError::Configuration(format!(
                "feature set {config:?} has no output channels"
            )));
        }
        if grid.img_dimensions() != source.interval().dimensions().as_slice() {
            return Err(StoreError::Configuration(format!(
                "grid dimensions {:?} do not match image dimensions {:?}",
                grid.img_dimensions(),
                source.interval().dimensions()
            )));
        }
        let feature_grid = grid.extend(channels)?;

        let disk = DiskArea::create(options.cache_dir.as_deref())?;
        let cell_bytes = feature_grid.cell_volume() * std::mem::size_of::<f32>();
        let capacity = options.resident_capacity(cell_bytes);
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);

        info!(
            store = id,
            dimensions = ?feature_grid.img_dimensions(),
            cell_dimensions = ?feature_grid.cell_dimensions(),
            cells = feature_grid.cell_count(),
            resident_cells = capacity.get(),
            path = %disk.path().display(),
            "Created feature store"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                grid,
                feature_grid,
                config,
                source,
                pool,
                capacity,
                state: Mutex::new(State {
                    disk: Some(Arc::new(disk)),
                    resident: LruCache::new(capacity),
                    materialized: HashSet::new(),
                    in_flight: HashMap::new(),
                    failure: None,
                }),
                counters: Counters::default(),
            }),
        })
    }

    /// Create a standalone store over a whole image with a balanced,
    /// non-time grid.
    pub fn for_image(
        config: FeatureConfig,
        image: &SourceImage,
        pool: WorkerPool,
        options: &StoreOptions,
    ) -> Result<Self, StoreError> {
        if !config.accepts(image.kind()) {
            return Err(StoreError::Configuration(format!(
                "feature set {config:?} does not accept {:?} pixels",
                image.kind()
            )));
        }
        let grid = CellGrid::for_image(&image.dimensions(), false)?;
        let source = ExtendedView::new(prepare_image(image));
        Self::create(grid, config, source, pool, options)
    }

    /// Process-unique identifier of this store.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Spatial grid of the source image.
    pub fn grid(&self) -> &CellGrid {
        &self.shared.grid
    }

    /// Grid of the feature volume (spatial axes plus channel axis).
    pub fn feature_grid(&self) -> &CellGrid {
        &self.shared.feature_grid
    }

    pub fn channel_count(&self) -> usize {
        self.shared.config.channel_count()
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.shared.config
    }

    /// Maximum number of resident cells.
    pub fn resident_capacity(&self) -> usize {
        self.shared.capacity.get()
    }

    pub fn resident_count(&self) -> usize {
        self.shared.state.lock().resident.len()
    }

    pub fn is_materialized(&self, index: usize) -> bool {
        self.shared.state.lock().materialized.contains(&index)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().disk.is_none()
    }

    /// Location of the backing area, `None` once closed.
    pub fn disk_path(&self) -> Option<PathBuf> {
        self.shared
            .state
            .lock()
            .disk
            .as_ref()
            .map(|disk| disk.path().to_path_buf())
    }

    pub fn stats(&self) -> StoreStats {
        let counters = &self.shared.counters;
        let bytes_written = self
            .shared
            .state
            .lock()
            .disk
            .as_ref()
            .map_or(0, |disk| disk.bytes_written());
        StoreStats {
            hits: counters.hits.load(Ordering::Relaxed),
            computed: counters.computed.load(Ordering::Relaxed),
            reloaded: counters.reloaded.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            bytes_written,
        }
    }

    /// Read one sample of the feature volume.
    ///
    /// `position` holds the spatial coordinates followed by the channel.
    /// Suspends until the enclosing cell is available.
    pub async fn get(&self, position: &[i64]) -> Result<f32, StoreError> {
        let feature_grid = &self.shared.feature_grid;
        let index = feature_grid
            .cell_of(position)
            .ok_or_else(|| StoreError::OutOfBounds {
                position: position.to_vec(),
                dimensions: feature_grid.img_dimensions().to_vec(),
            })?;
        let values = self.read_cell(index).await?;
        let offset = feature_grid.cell_interval(index).offset_of(position);
        Ok(values[offset])
    }

    /// Read all values of a cell, computing or reloading it if necessary.
    ///
    /// Implements the singleflight pattern: concurrent readers of the same
    /// missing cell share one job and all observe its result.
    pub async fn read_cell(&self, index: usize) -> Result<CellValues, StoreError> {
        if index >= self.shared.feature_grid.cell_count() {
            return Err(StoreError::OutOfBounds {
                position: vec![index as i64],
                dimensions: self.shared.feature_grid.grid_dimensions(),
            });
        }

        loop {
            let flight = {
                let mut state = self.shared.state.lock();
                let disk = state.check_usable(self.shared.id)?;

                // Fast path: resident
                if let Some(values) = state.resident.get(&index) {
                    Counters::bump(&self.shared.counters.hits, 1);
                    return Ok(values.clone());
                }

                let existing = state.in_flight.get(&index).cloned();
                match existing {
                    // Another reader already started a job for this cell
                    Some(flight) => flight,
                    None => {
                        let flight = Arc::new(InFlight::new());
                        state.in_flight.insert(index, flight.clone());
                        let materialized = state.materialized.contains(&index);
                        drop(state);

                        let shared = self.shared.clone();
                        let job_flight = flight.clone();
                        self.shared.pool.spawn(move || {
                            shared.run_job(index, materialized, disk, job_flight);
                        });
                        flight
                    }
                }
            };

            // A Notified future registered before the result is published
            // is guaranteed to see `notify_waiters`.
            let notified = flight.notify.notified();
            let ready = flight.result.lock().clone();
            if let Some(result) = ready {
                return result;
            }
            notified.await;
            let ready = flight.result.lock().clone();
            if let Some(result) = ready {
                return result;
            }
        }
    }

    /// Drop every resident cell; later reads reload them from disk.
    pub fn evict_resident(&self) {
        let mut state = self.shared.state.lock();
        let count = state.resident.len() as u64;
        state.resident.clear();
        Counters::bump(&self.shared.counters.evicted, count);
        debug!(store = self.shared.id, count, "Evicted resident cells");
    }

    /// Release resident cells and the backing area.
    ///
    /// Jobs already running finish and hand their result to the readers
    /// waiting on them; nothing they produce is kept. Returns `false` if the
    /// store was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.shared.state.lock();
        let Some(disk) = state.disk.take() else {
            return false;
        };
        state.resident.clear();
        state.materialized.clear();
        let pending = state.in_flight.len();
        drop(state);

        info!(
            store = self.shared.id,
            pending,
            bytes_written = disk.bytes_written(),
            "Closed feature store"
        );
        true
    }
}

impl fmt::Debug for FeatureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureStore")
            .field("id", &self.shared.id)
            .field("dimensions", &self.shared.feature_grid.img_dimensions())
            .field("cell_dimensions", &self.shared.feature_grid.cell_dimensions())
            .field("config", &self.shared.config)
            .finish()
    }
}

// =============================================================================
// Cell Jobs
// =============================================================================

impl Shared {
    /// Produce a cell on a worker thread and publish the result.
    fn run_job(&self, index: usize, materialized: bool, disk: Arc<DiskArea>, flight: Arc<InFlight>) {
        let result = if materialized {
            self.reload(index, &disk)
        } else {
            self.compute(index, &disk)
        };
        // Release the area before waking readers so a close() they trigger
        // removes it immediately.
        drop(disk);
        self.publish(index, &flight, result);
    }

    fn compute(&self, index: usize, disk: &DiskArea) -> Result<CellValues, StoreError> {
        let interval = self.grid.cell_interval(index);
        let channels = self.config.channel_count();
        let mut target = CellTarget::new(interval, channels);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.config.apply(&self.source, &mut target.slices_mut())
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(StoreError::Computation {
                    cell: index,
                    message: e.to_string(),
                })
            }
            Err(panic) => {
                return Err(StoreError::Computation {
                    cell: index,
                    message: panic_message(panic.as_ref()),
                })
            }
        }

        let values: CellValues = target.into_data().into();
        disk.write_cell(index, &values)?;
        Counters::bump(&self.counters.computed, 1);
        debug!(store = self.id, cell = index, "Computed cell");
        Ok(values)
    }

    fn reload(&self, index: usize, disk: &DiskArea) -> Result<CellValues, StoreError> {
        let len = self.feature_grid.cell_interval(index).volume();
        let values: CellValues = disk.read_cell(index, len)?.into();
        Counters::bump(&self.counters.reloaded, 1);
        debug!(store = self.id, cell = index, "Reloaded cell from disk");
        Ok(values)
    }

    /// Record the job's outcome and wake every waiting reader.
    fn publish(&self, index: usize, flight: &InFlight, result: Result<CellValues, StoreError>) {
        let mut state = self.state.lock();
        let open = state.disk.is_some();
        match &result {
            Ok(values) if open => {
                state.materialized.insert(index);
                if let Some((evicted, _)) = state.resident.push(index, values.clone()) {
                    if evicted != index {
                        Counters::bump(&self.counters.evicted, 1);
                    }
                }
            }
            Ok(_) => {
                debug!(store = self.id, cell = index, "Discarding cell of closed store");
            }
            Err(e) => {
                Counters::bump(&self.counters.failures, 1);
                warn!(store = self.id, cell = index, error = %e, "Cell job failed");
                if open && matches!(e, StoreError::Storage(_)) && state.failure.is_none() {
                    state.failure = Some(e.clone());
                }
            }
        }
        *flight.result.lock() = Some(result);
        state.in_flight.remove(&index);
        drop(state);

        flight.notify.notify_waiters();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("feature computation panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("feature computation panicked: {message}")
    } else {
        "feature computation panicked".to_string()
    }
}
