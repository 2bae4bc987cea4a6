//! Feature configurations.
//!
//! A feature set names which derived channels to compute and fills them for
//! one cell at a time. The store treats it as an opaque, pure function of
//! (image, cell); the stack compares configurations by value to decide
//! whether the cache must be rebuilt.
//!
//! ```
//! use feature_cache::features::{FeatureConfig, Identity};
//!
//! let a = FeatureConfig::new(Identity);
//! let b = FeatureConfig::new(Identity);
//! assert_eq!(a, b);
//! assert_eq!(a.channel_count(), 1);
//! ```

mod box_mean;
mod config;
mod identity;
mod target;

pub use box_mean::BoxMean;
pub use config::{DynEq, FeatureConfig, FeatureSet};
pub use identity::Identity;
pub use target::{CellTarget, ChannelSliceMut};
