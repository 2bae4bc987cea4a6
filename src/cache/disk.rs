//! Backing disk area for computed cells.
//!
//! Each store owns one private temporary directory. A materialized cell is
//! written once as a file of raw native-endian `f32` values named after its
//! linear index (`cell-00000042.f32`). The layout is private cache state:
//! it carries no header, no versioning, and is deleted with the area.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempDir;

use crate::error::StoreError;

const DIR_PREFIX: &str = "feature-cache-";

/// A temporary directory holding one file per materialized cell.
///
/// The directory is removed when the area is dropped.
#[derive(Debug)]
pub struct DiskArea {
    dir: TempDir,
    bytes_written: AtomicU64,
}

impl DiskArea {
    /// Allocate a new area under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self, StoreError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DIR_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(|e| StoreError::Storage(format!("failed to allocate cache directory: {e}")))?;

        tracing::debug!(path = %dir.path().display(), "Allocated disk area");

        Ok(Self {
            dir,
            bytes_written: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn cell_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("cell-{index:08}.f32"))
    }

    /// Persist the values of a cell.
    pub fn write_cell(&self, index: usize, values: &[f32]) -> Result<(), StoreError> {
        let path = self.cell_path(index);
        let bytes: &[u8] = bytemuck::cast_slice(values);
        File::create(&path)
            .and_then(|mut file| file.write_all(bytes))
            .map_err(|e| {
                StoreError::Storage(format!("failed to write {}: {e}", path.display()))
            })?;
        self.bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Load the values of a previously written cell.
    pub fn read_cell(&self, index: usize, len: usize) -> Result<Vec<f32>, StoreError> {
        let path = self.cell_path(index);
        let mut bytes = Vec::with_capacity(len * std::mem::size_of::<f32>());
        File::open(&path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(|e| StoreError::Storage(format!("failed to read {}: {e}", path.display())))?;

        if bytes.len() != len * std::mem::size_of::<f32>() {
            return Err(StoreError::Storage(format!(
                "{} holds {} bytes, expected {}",
                path.display(),
                bytes.len(),
                len * std::mem::size_of::<f32>()
            )));
        }
        Ok(bytes
            .chunks_exact(std::mem::size_of::<f32>())
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect())
    }

    /// Total bytes written to the area.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}
