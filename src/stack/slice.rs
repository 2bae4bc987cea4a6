//! Per-channel views of a feature store.

use std::sync::Arc;

use crate::cache::FeatureStore;
use crate::error::StoreError;
use crate::image::Interval;

/// One channel of a feature volume, indexed by spatial position.
///
/// Slices are cheap handles into the store that produced them; reads
/// compute cells lazily like any other store access.
#[derive(Debug, Clone)]
pub struct FeatureSlice {
    store: FeatureStore,
    channel: usize,
    interval: Interval,
}

impl FeatureSlice {
    pub(crate) fn new(store: FeatureStore, channel: usize) -> Self {
        let interval = store.grid().interval();
        Self {
            store,
            channel,
            interval,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Spatial bounds of the slice.
    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Identifier of the store backing this slice.
    pub fn store_id(&self) -> u64 {
        self.store.id()
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Feature value at a spatial position.
    pub async fn get(&self, position: &[i64]) -> Result<f32, StoreError> {
        if position.len() != self.interval.num_dimensions() {
            return Err(self.out_of_bounds(position));
        }
        let mut full = Vec::with_capacity(position.len() + 1);
        full.extend_from_slice(position);
        full.push(self.channel as i64);
        self.store.get(&full).await
    }

    /// Feature values over `interval`, dimension 0 fastest.
    ///
    /// Each cell overlapping the interval is fetched once.
    pub async fn read_interval(&self, interval: &Interval) -> Result<Vec<f32>, StoreError> {
        if interval.num_dimensions() != self.interval.num_dimensions() {
            return Err(self.out_of_bounds(interval.max()));
        }
        if interval.is_empty() {
            return Ok(Vec::new());
        }
        if interval.intersect(&self.interval).as_ref() != Some(interval) {
            return Err(self.out_of_bounds(interval.max()));
        }
        let grid = self.store.grid();
        let mut out = vec![0.0; interval.volume()];
        for index in grid.cells_overlapping(interval) {
            let cell = grid.cell_interval(index);
            let Some(overlap) = cell.intersect(interval) else {
                continue;
            };
            let values = self.store.read_cell(index).await?;
            let plane = &values[self.channel * cell.volume()..(self.channel + 1) * cell.volume()];
            for position in overlap.positions() {
                out[interval.offset_of(&position)] = plane[cell.offset_of(&position)];
            }
        }
        Ok(out)
    }

    fn out_of_bounds(&self, position: &[i64]) -> StoreError {
        StoreError::OutOfBounds {
            position: position.to_vec(),
            dimensions: self.interval.dimensions(),
        }
    }
}

/// One slice per channel of `store`.
pub(crate) fn slices_of(store: &FeatureStore) -> Arc<[FeatureSlice]> {
    (0..store.channel_count())
        .map(|channel| FeatureSlice::new(store.clone(), channel))
        .collect()
}
