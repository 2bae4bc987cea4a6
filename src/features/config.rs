use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::FeatureError;
use crate::image::{ExtendedView, PixelKind};

use super::target::ChannelSliceMut;

// =============================================================================
// FeatureSet Trait
// =============================================================================

/// Structural equality across trait objects.
///
/// Implemented automatically for every `PartialEq + 'static` type.
pub trait DynEq: Any {
    fn as_any(&self) -> &dyn Any;

    fn dyn_eq(&self, other: &dyn Any) -> bool;
}

impl<T: PartialEq + Any> DynEq for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| other == self)
    }
}

/// A collection of feature computations producing a fixed number of channels.
///
/// Implementations must be immutable once constructed and safe to call
/// concurrently for disjoint cells.
pub trait FeatureSet: DynEq + fmt::Debug + Send + Sync {
    /// Number of output channels, at least one for a usable configuration.
    fn channel_count(&self) -> usize;

    /// Fill one slice per channel for the cell covered by `targets`.
    ///
    /// `targets.len()` equals [`channel_count`](FeatureSet::channel_count)
    /// and every slice spans the same spatial interval.
    fn apply(
        &self,
        source: &ExtendedView,
        targets: &mut [ChannelSliceMut<'_>],
    ) -> Result<(), FeatureError>;

    /// Whether images of `kind` can be processed.
    ///
    /// Colour images are rejected unless a feature set opts in.
    fn accepts(&self, kind: PixelKind) -> bool {
        kind.is_real()
    }
}

// =============================================================================
// FeatureConfig
// =============================================================================

/// Shared, value-compared handle to a [`FeatureSet`].
#[derive(Clone)]
pub struct FeatureConfig(Arc<dyn FeatureSet>);

impl FeatureConfig {
    pub fn new(features: impl FeatureSet) -> Self {
        Self(Arc::new(features))
    }

    pub fn channel_count(&self) -> usize {
        self.0.channel_count()
    }

    pub fn accepts(&self, kind: PixelKind) -> bool {
        self.0.accepts(kind)
    }

    pub fn apply(
        &self,
        source: &ExtendedView,
        targets: &mut [ChannelSliceMut<'_>],
    ) -> Result<(), FeatureError> {
        self.0.apply(source, targets)
    }

    /// Borrow the feature set, e.g. to downcast to a concrete type.
    pub fn features(&self) -> &dyn FeatureSet {
        self.0.as_ref()
    }
}

impl From<Arc<dyn FeatureSet>> for FeatureConfig {
    fn from(features: Arc<dyn FeatureSet>) -> Self {
        Self(features)
    }
}

impl PartialEq for FeatureConfig {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.as_ref().dyn_eq(other.0.as_ref().as_any())
    }
}

impl fmt::Debug for FeatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}
