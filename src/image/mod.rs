//! Image layer.
//!
//! Source images are read-only, randomly indexable N-dimensional sample
//! arrays. Before feature computation they are normalized to `f32` and
//! extended past their borders:
//!
//! ```text
//! SourceImage ──prepare_image──▶ PreparedImage ──▶ ExtendedView
//!  (any kind)                    (f32 or RGB)      (replicate border)
//! ```

mod adapter;
mod buffer;
mod extend;
mod interval;

pub use adapter::{prepare_image, ConvertedView, FloatAccess, PreparedImage};
pub use buffer::{Image, PixelKind, RealSample, Rgb, Sample, SourceImage};
pub use extend::ExtendedView;
pub use interval::{Interval, Positions};
