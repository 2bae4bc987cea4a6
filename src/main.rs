//! Feature Cache - demo driver.
//!
//! Builds a synthetic image, warms a multi-scale feature stack over it and
//! reports how the cache served the reads.

use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feature_cache::{
    BoxMean, Config, FeatureConfig, FeatureStack, FeatureStore, Image, StoreStats,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&config).await {
        Ok(report) => {
            print_report(&report, config.json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Run
// =============================================================================

#[derive(Debug, Serialize)]
struct Report {
    shape: Vec<usize>,
    cell_dimensions: Vec<usize>,
    cells: usize,
    channels: usize,
    threads: usize,
    resident_capacity: usize,
    warm_ms: u128,
    reread_ms: u128,
    reconfigurations: usize,
    stats: StoreStats,
}

async fn run(config: &Config) -> Result<Report, Box<dyn std::error::Error>> {
    let pool = config.worker_pool()?;

    info!("Configuration:");
    info!("  Shape: {:?} ({} voxels)", config.shape, config.voxel_count());
    info!("  Time series: {}", config.time_series);
    info!("  Threads: {}", pool.threads());
    info!("  Channels: {}", config.channels);

    let image = synthetic_image(&config.shape);
    let stack = Arc::new(FeatureStack::new(
        image.into(),
        FeatureConfig::new(BoxMean::new(1)),
        config.time_series,
        pool.clone(),
        config.store_options(),
    )?);

    let reconfigurations = Arc::new(AtomicUsize::new(0));
    {
        let reconfigurations = reconfigurations.clone();
        stack.listeners().subscribe(move |_| {
            reconfigurations.fetch_add(1, Ordering::Relaxed);
        });
    }

    // The single-scale store is replaced before any cell of it is read
    stack.set_filter(FeatureConfig::new(BoxMean::new(config.channels)))?;
    let store = stack.store();

    info!(
        "  Cells: {} of {:?}",
        store.grid().cell_count(),
        store.grid().cell_dimensions()
    );
    info!("  Resident capacity: {} cells", store.resident_capacity());

    let started = Instant::now();
    read_all_cells(&store).await?;
    let warm_ms = started.elapsed().as_millis();
    info!("Warmed {} cells in {} ms", store.grid().cell_count(), warm_ms);

    store.evict_resident();
    let started = Instant::now();
    read_all_cells(&store).await?;
    let reread_ms = started.elapsed().as_millis();
    info!("Reread evicted cells in {} ms", reread_ms);

    let center: Vec<i64> = config.shape.iter().map(|&d| (d / 2) as i64).collect();
    for slice in stack.slices().iter() {
        let value = slice.get(&center).await?;
        info!("  Channel {} at {:?}: {:.3}", slice.channel(), center, value);
    }

    Ok(Report {
        shape: config.shape.clone(),
        cell_dimensions: store.grid().cell_dimensions().to_vec(),
        cells: store.grid().cell_count(),
        channels: store.channel_count(),
        threads: pool.threads(),
        resident_capacity: store.resident_capacity(),
        warm_ms,
        reread_ms,
        reconfigurations: reconfigurations.load(Ordering::Relaxed),
        stats: store.stats(),
    })
}

/// Read every cell of `store` concurrently.
async fn read_all_cells(store: &FeatureStore) -> Result<(), Box<dyn std::error::Error>> {
    let mut tasks = JoinSet::new();
    for index in 0..store.feature_grid().cell_count() {
        let store = store.clone();
        tasks.spawn(async move { store.read_cell(index).await.map(|_| ()) });
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }
    Ok(())
}

/// Interference pattern with a few distinct features per cell.
fn synthetic_image(shape: &[usize]) -> Image<u16> {
    Image::from_fn(shape, |position| {
        let value: f64 = position
            .iter()
            .enumerate()
            .map(|(d, &x)| ((x as f64) / (8.0 + 4.0 * d as f64)).sin())
            .sum();
        let normalized = (value / shape.len() as f64 + 1.0) / 2.0;
        (normalized * f64::from(u16::MAX)) as u16
    })
}

// =============================================================================
// Output
// =============================================================================

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
        return;
    }

    println!();
    println!("Feature cache report");
    println!("────────────────────────────────────────────────────────────────");
    println!("  Shape:              {:?}", report.shape);
    println!("  Cell dimensions:    {:?}", report.cell_dimensions);
    println!("  Cells:              {}", report.cells);
    println!("  Channels:           {}", report.channels);
    println!("  Threads:            {}", report.threads);
    println!("  Resident capacity:  {}", report.resident_capacity);
    println!("  Reconfigurations:   {}", report.reconfigurations);
    println!("  Warm:               {} ms", report.warm_ms);
    println!("  Reread:             {} ms", report.reread_ms);
    println!();
    println!("  Computed:           {}", report.stats.computed);
    println!("  Reloaded:           {}", report.stats.reloaded);
    println!("  Hits:               {}", report.stats.hits);
    println!("  Evicted:            {}", report.stats.evicted);
    println!("  Failures:           {}", report.stats.failures);
    println!("  Bytes written:      {}", report.stats.bytes_written);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "feature_cache=debug"
    } else {
        "feature_cache=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
