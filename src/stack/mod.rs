//! Feature stack layer.
//!
//! Binds a source image to a feature configuration and exposes the cached
//! result as one [`FeatureSlice`] per channel:
//!
//! ```text
//!  classifier settings ──Notifier<FeatureConfig>──▶ FeatureStack::set_filter
//!                                                        │
//!                      ┌─────────────────────────────────┤
//!                      ▼                                 ▼
//!             new FeatureStore + slices           listeners.fire()
//!             (old store closed)                  (consumers re-fetch slices)
//! ```

mod feature_stack;
mod notifier;
mod slice;

pub use feature_stack::FeatureStack;
pub use notifier::{Notifier, SubscriptionId};
pub use slice::FeatureSlice;
