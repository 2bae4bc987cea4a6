//! Feature store integration tests.
//!
//! Tests verify:
//! - Concurrent readers of a cell share a single computation
//! - Reads are bit-identical across eviction and reload
//! - The resident set stays bounded
//! - Computation failures are not cached
//! - Storage failures make the store unusable
//! - Closing a store while a cell is in flight

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use feature_cache::{CellGrid, FeatureConfig, FeatureStore, Interval, StoreError, StoreOptions};

use super::test_utils::{pool, ramp_image, store_for, CountingFeatures, Flaky, NoChannels};

// =============================================================================
// At-Most-Once Computation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_compute_once() {
    let features = CountingFeatures::new(2).with_delay(Duration::from_millis(50));
    let store = store_for(features.clone(), &[300, 300], &StoreOptions::default());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.get(&[10, 20, 1]).await }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(features.calls(), 1);
    assert!(values.iter().all(|v| v.to_bits() == 110.0f32.to_bits()));
    assert_eq!(store.stats().computed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cell_reads_share_values() {
    let features = CountingFeatures::new(1).with_delay(Duration::from_millis(20));
    let store = store_for(features.clone(), &[200, 200], &StoreOptions::default());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move { store.read_cell(3).await }));
    }

    let mut cells = Vec::new();
    for handle in handles {
        cells.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(features.calls(), 1);
    // Every reader holds the same allocation
    assert!(cells.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_cells_computed_once_each() {
    let features = CountingFeatures::new(1);
    let store = store_for(features.clone(), &[400, 300], &StoreOptions::default());
    let cells = store.grid().cell_count();

    let mut handles = Vec::new();
    for _ in 0..3 {
        for index in 0..cells {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.read_cell(index).await }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(features.calls(), cells);
    assert!((0..cells).all(|index| store.is_materialized(index)));
}

// =============================================================================
// Idempotent Reads
// =============================================================================

#[tokio::test]
async fn test_reads_identical_after_eviction() {
    let features = CountingFeatures::new(3);
    let store = store_for(features.clone(), &[150, 40], &StoreOptions::default());

    let first = store.read_cell(1).await.unwrap();
    let value = store.get(&[3, 5, 2]).await.unwrap();
    assert_eq!(value, 203.0);

    store.evict_resident();
    assert_eq!(store.resident_count(), 0);

    let again = store.read_cell(1).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &again));
    let bits = |values: &[f32]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&first), bits(&again));
    assert_eq!(
        store.get(&[3, 5, 2]).await.unwrap().to_bits(),
        value.to_bits()
    );

    let stats = store.stats();
    assert_eq!(features.calls(), 2);
    assert_eq!(stats.computed, 2);
    assert_eq!(stats.reloaded, 2);
    assert!(stats.bytes_written > 0);
}

#[tokio::test]
async fn test_resident_set_is_bounded() {
    let features = CountingFeatures::new(1);
    let options = StoreOptions::default().with_resident_cells(NonZeroUsize::new(2).unwrap());
    let store = store_for(features.clone(), &[640, 128], &options);
    let cells = store.grid().cell_count();
    assert_eq!(cells, 5);

    for index in 0..cells {
        store.read_cell(index).await.unwrap();
        assert!(store.resident_count() <= 2);
    }
    for index in 0..cells {
        store.read_cell(index).await.unwrap();
    }

    let stats = store.stats();
    assert_eq!(features.calls(), cells);
    assert_eq!(stats.reloaded, cells as u64);
    assert!(stats.evicted >= 3);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_computation_error_is_retried() {
    let features = Flaky::new(2);
    let store = store_for(features.clone(), &[32, 32], &StoreOptions::default());

    for _ in 0..2 {
        let err = store.get(&[1, 1, 0]).await.unwrap_err();
        assert!(matches!(err, StoreError::Computation { .. }));
        assert!(err.is_retryable());
    }
    assert_eq!(store.get(&[1, 1, 0]).await.unwrap(), 0.0);
    assert_eq!(features.calls(), 3);
    assert_eq!(store.stats().failures, 2);
}

#[tokio::test]
async fn test_storage_failure_makes_store_unusable() {
    let store = store_for(CountingFeatures::new(1), &[256, 128], &StoreOptions::default());
    assert_eq!(store.grid().cell_count(), 2);
    store.get(&[0, 0, 0]).await.unwrap();

    let path = store.disk_path().unwrap();
    for entry in std::fs::read_dir(&path).unwrap() {
        std::fs::remove_file(entry.unwrap().path()).unwrap();
    }
    store.evict_resident();

    assert!(matches!(
        store.get(&[0, 0, 0]).await,
        Err(StoreError::Storage(_))
    ));
    // Cell 1 was never computed, yet the store refuses it too
    assert!(matches!(
        store.get(&[200, 0, 0]).await,
        Err(StoreError::Storage(_))
    ));
    assert!(!store.is_materialized(1));
}

#[tokio::test]
async fn test_zero_channel_config_rejected() {
    let result = FeatureStore::for_image(
        FeatureConfig::new(NoChannels),
        &ramp_image(&[8, 8]),
        pool(1),
        &StoreOptions::default(),
    );
    assert!(matches!(result, Err(StoreError::Configuration(_))));
}

#[tokio::test]
async fn test_cache_dir_is_used() {
    let parent = tempfile::tempdir().unwrap();
    let options = StoreOptions::default().with_cache_dir(parent.path());
    let store = store_for(CountingFeatures::new(1), &[16, 16], &options);

    let path = store.disk_path().unwrap();
    assert!(path.starts_with(parent.path()));

    store.get(&[0, 0, 0]).await.unwrap();
    assert_eq!(std::fs::read_dir(&path).unwrap().count(), 1);

    store.close();
    assert!(!path.exists());
}

// =============================================================================
// Closing
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_joined_reader_completes_after_close() {
    let features = CountingFeatures::new(1).with_delay(Duration::from_millis(200));
    let store = store_for(features.clone(), &[64, 64], &StoreOptions::default());
    let path = store.disk_path().unwrap();

    let reader = {
        let store = store.clone();
        tokio::spawn(async move { store.get(&[3, 0, 0]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.close());
    assert_eq!(reader.await.unwrap().unwrap(), 3.0);

    // Nothing produced after the close is kept
    assert_eq!(store.resident_count(), 0);
    assert!(!store.is_materialized(0));
    assert!(!path.exists());
    assert!(matches!(
        store.get(&[3, 0, 0]).await,
        Err(StoreError::Lifecycle(_))
    ));
}

// =============================================================================
// Tiling
// =============================================================================

#[test]
fn test_cells_cover_image_exactly() {
    for dims in [vec![1000], vec![300, 129], vec![27, 53, 26], vec![13, 12, 25, 11]] {
        let grid = CellGrid::for_image(&dims, false).unwrap();
        let image = Interval::from_dimensions(&dims);

        let mut seen = HashSet::new();
        for index in 0..grid.cell_count() {
            for position in grid.cell_interval(index).positions() {
                assert!(image.contains(&position));
                assert!(seen.insert(position), "cells overlap in {dims:?}");
            }
        }
        assert_eq!(seen.len(), image.volume());
    }
}

#[test]
fn test_time_series_grid() {
    let grid = CellGrid::for_image(&[500, 400, 9], true).unwrap();
    assert_eq!(grid.cell_dimensions(), &[128, 128, 2]);
    assert_eq!(grid.grid_dimensions(), vec![4, 4, 5]);
    // The last time cell is clipped to a single frame
    let last = grid.cell_interval(grid.cell_count() - 1);
    assert_eq!(last.dimensions(), vec![500 - 384, 400 - 384, 1]);
}
