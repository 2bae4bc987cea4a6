//! Feature stack integration tests.
//!
//! Tests verify:
//! - End-to-end reads through slices across a configuration change
//! - Equal configurations do not rebuild anything
//! - Configuration changes swap every slice and notify once, after the swap
//! - Failed configuration changes keep the previous generation
//! - Source images are normalized to `f32` without copying
//! - Following a classifier's configuration notifications

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feature_cache::{
    FeatureConfig, FeatureStack, Identity, Image, Interval, Notifier, PixelKind, PreparedImage,
    SourceImage, StackError, StoreError, StoreOptions,
};

use super::test_utils::{
    pool, ramp_image, Constant, Coordinates, CountingFeatures, Flaky, NoChannels,
};

fn stack_over(image: SourceImage, config: FeatureConfig) -> FeatureStack {
    FeatureStack::new(image, config, false, pool(4), StoreOptions::default()).unwrap()
}

fn count_notifications(stack: &FeatureStack) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    stack.listeners().subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

// =============================================================================
// End-to-End
// =============================================================================

#[tokio::test]
async fn test_coordinates_then_constant() {
    let image: SourceImage = Image::from_fn(&[256, 256], |p| (p[0] * p[1]) as f32).into();
    let stack = stack_over(image, FeatureConfig::new(Constant(0.0)));
    let notifications = count_notifications(&stack);

    assert!(stack.set_filter(FeatureConfig::new(Coordinates)).unwrap());
    let slices = stack.slices();
    assert_eq!(slices.len(), 2);
    assert_eq!(slices[0].get(&[5, 5]).await.unwrap(), 5.0);
    assert_eq!(slices[1].get(&[5, 5]).await.unwrap(), 5.0);
    assert_eq!(slices[0].get(&[200, 7]).await.unwrap(), 200.0);
    assert_eq!(slices[1].get(&[200, 7]).await.unwrap(), 7.0);

    assert!(stack.set_filter(FeatureConfig::new(Constant(1.0))).unwrap());
    let slices = stack.slices();
    assert_eq!(slices.len(), 1);
    assert_eq!(slices[0].get(&[5, 5]).await.unwrap(), 1.0);

    assert_eq!(notifications.load(Ordering::SeqCst), 2);
    assert_eq!(stack.generation(), 3);
}

#[tokio::test]
async fn test_read_interval_across_cells() {
    let stack = stack_over(ramp_image(&[300, 200]), FeatureConfig::new(Coordinates));
    let region = Interval::new(vec![120, 125], vec![135, 131]);

    let xs = stack.slices()[0].read_interval(&region).await.unwrap();
    let ys = stack.slices()[1].read_interval(&region).await.unwrap();

    let positions: Vec<Vec<i64>> = region.positions().collect();
    assert_eq!(xs.len(), positions.len());
    for (i, p) in positions.iter().enumerate() {
        assert_eq!(xs[i], p[0] as f32);
        assert_eq!(ys[i], p[1] as f32);
    }
    // Region straddles the corner shared by four cells
    assert_eq!(stack.store().stats().computed, 4);
}

#[tokio::test]
async fn test_small_region_of_large_image() {
    let image = Image::from_vec(&[4096, 4096], vec![0u8; 4096 * 4096]).unwrap();
    let stack = stack_over(image.into(), FeatureConfig::new(Coordinates));
    assert_eq!(stack.grid().cell_count(), 1024);

    let region = Interval::new(vec![2000, 3000], vec![2002, 3002]);
    let ys = stack.slices()[1].read_interval(&region).await.unwrap();

    let expected: Vec<f32> = region.positions().map(|p| p[1] as f32).collect();
    assert_eq!(ys, expected);
    assert_eq!(stack.store().stats().computed, 1);
}

// =============================================================================
// Configuration Changes
// =============================================================================

#[tokio::test]
async fn test_equal_configuration_short_circuits() {
    let features = CountingFeatures::new(2);
    let stack = stack_over(ramp_image(&[64, 64]), FeatureConfig::new(features.clone()));
    let notifications = count_notifications(&stack);

    stack.slices()[0].get(&[1, 1]).await.unwrap();
    let store_id = stack.store().id();
    let slices = stack.slices();

    // A structurally equal instance, not the same object
    assert!(!stack.set_filter(FeatureConfig::new(CountingFeatures::new(2))).unwrap());

    assert_eq!(notifications.load(Ordering::SeqCst), 0);
    assert_eq!(stack.store().id(), store_id);
    assert!(Arc::ptr_eq(&slices, &stack.slices()));
    // The cached cell is still served without recomputation
    stack.slices()[1].get(&[1, 1]).await.unwrap();
    assert_eq!(features.calls(), 1);
}

#[tokio::test]
async fn test_configuration_change_swaps_every_slice() {
    let stack = Arc::new(stack_over(ramp_image(&[64, 64]), FeatureConfig::new(Coordinates)));
    let old_slices = stack.slices();
    let old_store = stack.store();

    // Record what a listener observes when it runs
    let observed = Arc::new(Mutex::new(Vec::new()));
    {
        let weak = Arc::downgrade(&stack);
        let observed = observed.clone();
        stack.listeners().subscribe(move |_| {
            if let Some(stack) = weak.upgrade() {
                let ids: Vec<u64> = stack.slices().iter().map(|s| s.store_id()).collect();
                observed.lock().unwrap().push(ids);
            }
        });
    }

    assert!(stack
        .set_filter(FeatureConfig::new(CountingFeatures::new(3)))
        .unwrap());

    let new_slices = stack.slices();
    assert_eq!(new_slices.len(), 3);
    for new in new_slices.iter() {
        assert!(old_slices.iter().all(|old| old.store_id() != new.store_id()));
    }

    {
        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0], vec![stack.store().id(); 3]);
    }

    assert!(old_store.is_closed());
    assert!(matches!(
        old_slices[0].get(&[0, 0]).await,
        Err(StoreError::Lifecycle(_))
    ));
}

#[tokio::test]
async fn test_failed_configuration_keeps_previous() {
    let stack = stack_over(ramp_image(&[32, 32]), FeatureConfig::new(Coordinates));
    let notifications = count_notifications(&stack);
    let slices = stack.slices();

    let err = stack.set_filter(FeatureConfig::new(NoChannels)).unwrap_err();
    assert!(matches!(err, StackError::Store(StoreError::Configuration(_))));

    assert_eq!(notifications.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&slices, &stack.slices()));
    assert_eq!(stack.filter(), FeatureConfig::new(Coordinates));
    assert_eq!(stack.slices()[1].get(&[4, 9]).await.unwrap(), 9.0);
}

#[tokio::test]
async fn test_colour_image_rejects_real_features() {
    let image: SourceImage = Image::from_fn(&[16, 16], |_| feature_cache::Rgb::new(9, 9, 9)).into();
    let result = FeatureStack::new(
        image,
        FeatureConfig::new(Identity),
        false,
        pool(1),
        StoreOptions::default(),
    );
    assert!(matches!(
        result,
        Err(StackError::UnsupportedPixelKind {
            kind: PixelKind::Rgb,
            ..
        })
    ));
}

/// `set_filter` does not compute any cell to validate a configuration, so a
/// configuration whose computation fails is installed and its error surfaces,
/// retryable, on the first read of each cell.
#[tokio::test]
async fn test_failing_computation_surfaces_on_read() {
    let stack = stack_over(ramp_image(&[32, 32]), FeatureConfig::new(Coordinates));
    let notifications = count_notifications(&stack);

    // Cells are computed lazily, so the change itself succeeds
    assert!(stack.set_filter(FeatureConfig::new(Flaky::new(1))).unwrap());
    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    let err = stack.slices()[0].get(&[0, 0]).await.unwrap_err();
    assert!(matches!(err, StoreError::Computation { .. }));
    assert_eq!(stack.slices()[0].get(&[0, 0]).await.unwrap(), 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reader_joined_before_change_completes() {
    let slow = CountingFeatures::new(1).with_delay(Duration::from_millis(200));
    let stack = stack_over(ramp_image(&[64, 64]), FeatureConfig::new(slow));

    let old_slice = stack.slices()[0].clone();
    let reader = tokio::spawn(async move { old_slice.get(&[7, 1]).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(stack.set_filter(FeatureConfig::new(Constant(2.0))).unwrap());

    // The in-flight read finishes against the old configuration
    assert_eq!(reader.await.unwrap().unwrap(), 7.0);
    assert_eq!(stack.slices()[0].get(&[7, 1]).await.unwrap(), 2.0);
}

// =============================================================================
// Type Normalization
// =============================================================================

#[tokio::test]
async fn test_integer_image_is_converted() {
    let image = Image::from_fn(&[20, 10], |p| (p[0] * 1000 - p[1] * 7) as i32);
    let stack = stack_over(image.clone().into(), FeatureConfig::new(Identity));

    let prepared = stack.prepared_image();
    assert!(!prepared.is_passthrough());
    assert_eq!(prepared.source_kind(), PixelKind::I32);
    let PreparedImage::Real(view) = prepared else {
        panic!("expected a real-valued view");
    };
    for position in Interval::from_dimensions(&[20, 10]).positions() {
        let expected = image.get(&position) as f32;
        assert_eq!(view.get(&position).to_bits(), expected.to_bits());
    }

    let slice = &stack.slices()[0];
    assert_eq!(slice.get(&[19, 9]).await.unwrap(), (19 * 1000 - 9 * 7) as f32);
}

#[tokio::test]
async fn test_float_image_passes_through() {
    let image = Image::from_fn(&[8, 8], |p| p[0] as f32 * 0.5);
    let stack = stack_over(image.into(), FeatureConfig::new(Identity));

    let prepared = stack.prepared_image();
    assert!(prepared.is_passthrough());
    assert_eq!(prepared.source_kind(), PixelKind::F32);
    assert_eq!(stack.slices()[0].get(&[3, 0]).await.unwrap(), 1.5);
}

// =============================================================================
// Classifier Notifications
// =============================================================================

#[tokio::test]
async fn test_follow_classifier_configuration() {
    let stack = Arc::new(stack_over(ramp_image(&[32, 32]), FeatureConfig::new(Coordinates)));
    let notifications = count_notifications(&stack);
    let classifier: Notifier<FeatureConfig> = Notifier::new();
    FeatureStack::follow(&stack, &classifier);

    classifier.fire_with(&FeatureConfig::new(Constant(4.0)));
    assert_eq!(stack.slices()[0].get(&[2, 2]).await.unwrap(), 4.0);

    // Repeating the same configuration is a no-op
    classifier.fire_with(&FeatureConfig::new(Constant(4.0)));
    // Rejected configurations are logged and ignored
    classifier.fire_with(&FeatureConfig::new(NoChannels));

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(stack.filter(), FeatureConfig::new(Constant(4.0)));

    // The subscription does not keep the stack alive
    let store = stack.store();
    drop(stack);
    assert!(store.is_closed());
    classifier.fire_with(&FeatureConfig::new(Constant(5.0)));
}
