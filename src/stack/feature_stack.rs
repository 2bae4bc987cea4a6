//! Feature stack: the cached feature volume of one source image.
//!
//! The stack owns the current generation, i.e. one (configuration, store,
//! slices) triple. Changing the configuration builds a complete new
//! generation next to the old one and swaps it in; consumers are told about
//! the swap through the stack's listeners.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::cache::{CellGrid, FeatureStore, StoreOptions, WorkerPool};
use crate::error::StackError;
use crate::features::FeatureConfig;
use crate::image::{prepare_image, ExtendedView, Interval, PreparedImage, SourceImage};

use super::notifier::{Notifier, SubscriptionId};
use super::slice::{slices_of, FeatureSlice};

/// One (configuration, store, slices) pairing.
struct Generation {
    number: u64,
    config: FeatureConfig,
    prepared: PreparedImage,
    store: FeatureStore,
    slices: Arc<[FeatureSlice]>,
}

/// Lazily computed, disk-backed features of a source image.
///
/// # Example
///
/// ```no_run
/// use feature_cache::{FeatureConfig, FeatureStack, Identity, Image, StoreOptions, WorkerPool};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let image = Image::from_fn(&[512, 512], |p| (p[0] ^ p[1]) as u8);
/// let pool = WorkerPool::with_available_parallelism()?;
/// let stack = FeatureStack::new(
///     image.into(),
///     FeatureConfig::new(Identity),
///     false,
///     pool,
///     StoreOptions::default(),
/// )?;
///
/// stack.listeners().subscribe(|_| println!("features recomputed"));
/// let value = stack.slices()[0].get(&[5, 5]).await?;
/// # Ok(())
/// # }
/// ```
pub struct FeatureStack {
    source: SourceImage,
    is_time_series: bool,
    grid: CellGrid,
    pool: WorkerPool,
    options: StoreOptions,
    current: RwLock<Generation>,
    /// Serializes configuration changes
    update: Mutex<()>,
    listeners: Notifier,
}

impl FeatureStack {
    /// Bind a stack to `source` and build the cache for `config`.
    ///
    /// With `is_time_series`, the image's last axis is treated as time.
    pub fn new(
        source: SourceImage,
        config: FeatureConfig,
        is_time_series: bool,
        pool: WorkerPool,
        options: StoreOptions,
    ) -> Result<Self, StackError> {
        let grid = CellGrid::for_image(&source.dimensions(), is_time_series)?;
        let generation = build_generation(&source, &grid, &pool, &options, config, 1)?;

        Ok(Self {
            source,
            is_time_series,
            grid,
            pool,
            options,
            current: RwLock::new(generation),
            update: Mutex::new(()),
            listeners: Notifier::new(),
        })
    }

    /// Switch to a new feature configuration.
    ///
    /// A configuration equal to the current one is a no-op and returns
    /// `Ok(false)`. Otherwise a new store is built, swapped in, the old store
    /// is closed, and every listener is called once after the swap.
    ///
    /// On error the previous generation stays active and no listener runs.
    pub fn set_filter(&self, config: FeatureConfig) -> Result<bool, StackError> {
        let update = self.update.lock();

        let number = {
            let current = self.current.read();
            if current.config == config {
                return Ok(false);
            }
            current.number + 1
        };

        let generation = build_generation(
            &self.source,
            &self.grid,
            &self.pool,
            &self.options,
            config,
            number,
        )?;
        let store_id = generation.store.id();
        let previous = std::mem::replace(&mut *self.current.write(), generation);
        previous.store.close();
        drop(update);

        info!(
            generation = number,
            store = store_id,
            previous_store = previous.store.id(),
            "Feature configuration changed"
        );

        self.listeners.fire();
        Ok(true)
    }

    /// Follow a classifier's feature-configuration notifications.
    ///
    /// Every configuration broadcast on `settings` is applied with
    /// [`set_filter`](Self::set_filter). Only a weak reference to the stack
    /// is kept, so the subscription does not extend its lifetime.
    pub fn follow(stack: &Arc<FeatureStack>, settings: &Notifier<FeatureConfig>) -> SubscriptionId {
        let stack = Arc::downgrade(stack);
        settings.subscribe(move |config: &FeatureConfig| {
            let Some(stack) = stack.upgrade() else {
                return;
            };
            if let Err(e) = stack.set_filter(config.clone()) {
                warn!(error = %e, config = ?config, "Keeping previous feature configuration");
            }
        })
    }

    /// Per-channel views of the current feature volume.
    ///
    /// The returned list belongs to the current generation; fetch it again
    /// after a listener fires.
    pub fn slices(&self) -> Arc<[FeatureSlice]> {
        self.current.read().slices.clone()
    }

    /// Callbacks invoked after every successful configuration change.
    pub fn listeners(&self) -> &Notifier {
        &self.listeners
    }

    /// Spatial extent of the source image.
    pub fn extent(&self) -> Interval {
        self.source.interval().clone()
    }

    /// Current feature configuration.
    pub fn filter(&self) -> FeatureConfig {
        self.current.read().config.clone()
    }

    /// Spatial cell grid.
    pub fn grid(&self) -> &CellGrid {
        &self.grid
    }

    pub fn is_time_series(&self) -> bool {
        self.is_time_series
    }

    /// The type-normalized image features are computed from.
    pub fn prepared_image(&self) -> PreparedImage {
        self.current.read().prepared.clone()
    }

    /// Store of the current generation.
    pub fn store(&self) -> FeatureStore {
        self.current.read().store.clone()
    }

    /// Number of the current generation, starting at 1.
    pub fn generation(&self) -> u64 {
        self.current.read().number
    }
}

impl Drop for FeatureStack {
    fn drop(&mut self) {
        self.current.get_mut().store.close();
    }
}

impl fmt::Debug for FeatureStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.read();
        f.debug_struct("FeatureStack")
            .field("extent", self.source.interval())
            .field("is_time_series", &self.is_time_series)
            .field("generation", &current.number)
            .field("config", &current.config)
            .field("store", &current.store)
            .finish()
    }
}

/// Build a complete generation without touching the stack.
fn build_generation(
    source: &SourceImage,
    grid: &CellGrid,
    pool: &WorkerPool,
    options: &StoreOptions,
    config: FeatureConfig,
    number: u64,
) -> Result<Generation, StackError> {
    if !config.accepts(source.kind()) {
        return Err(StackError::UnsupportedPixelKind {
            feature: format!("{config:?}"),
            kind: source.kind(),
        });
    }
    let prepared = prepare_image(source);
    let extended = ExtendedView::new(prepared.clone());
    let store = FeatureStore::create(grid.clone(), config.clone(), extended, pool.clone(), options)?;
    let slices = slices_of(&store);

    Ok(Generation {
        number,
        config,
        prepared,
        store,
        slices,
    })
}
