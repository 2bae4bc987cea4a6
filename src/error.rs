use thiserror::Error;

use crate::image::PixelKind;

/// Errors raised by the disk-backed feature store.
///
/// The type is `Clone` so that a single cell result can be handed to every
/// reader waiting on that cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Invalid channel count, zero-dimensional image or malformed configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The feature computation failed while producing a cell
    #[error("Computation error in cell {cell}: {message}")]
    Computation { cell: usize, message: String },

    /// Backing disk allocation or I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Access after the store was closed
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Requested position lies outside the feature volume
    #[error("Position {position:?} is outside the feature volume {dimensions:?}")]
    OutOfBounds {
        position: Vec<i64>,
        dimensions: Vec<usize>,
    },
}

impl StoreError {
    /// Whether a later access to the same cell may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Computation { .. })
    }
}

/// Error returned by a feature set while filling a cell.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FeatureError(pub String);

impl FeatureError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors raised by the feature stack when switching configurations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// Store creation failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The configuration cannot process the image's pixel kind
    #[error("Feature set {feature} does not accept {kind:?} pixels")]
    UnsupportedPixelKind { feature: String, kind: PixelKind },
}
