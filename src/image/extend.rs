//! Replicate-border extension of prepared images.

use super::adapter::PreparedImage;
use super::buffer::{PixelKind, Rgb};
use super::Interval;

/// A view over a [`PreparedImage`] that is defined everywhere.
///
/// Positions outside the image are clamped to the nearest edge sample, so
/// window-based features can read past cell and image boundaries.
#[derive(Debug, Clone)]
pub struct ExtendedView {
    image: PreparedImage,
}

impl ExtendedView {
    pub fn new(image: PreparedImage) -> Self {
        Self { image }
    }

    /// Bounds of the underlying image (the view itself is unbounded).
    pub fn interval(&self) -> &Interval {
        self.image.interval()
    }

    pub fn num_dimensions(&self) -> usize {
        self.interval().num_dimensions()
    }

    pub fn source_kind(&self) -> PixelKind {
        self.image.source_kind()
    }

    pub fn prepared(&self) -> &PreparedImage {
        &self.image
    }

    /// Real sample at any position, `None` for colour images.
    pub fn real(&self, position: &[i64]) -> Option<f32> {
        match &self.image {
            PreparedImage::Real(view) => Some(view.get(&self.clamp(position))),
            PreparedImage::Rgb(_) => None,
        }
    }

    /// Colour sample at any position, `None` for real-valued images.
    pub fn rgb(&self, position: &[i64]) -> Option<Rgb> {
        match &self.image {
            PreparedImage::Rgb(image) => Some(image.get(&self.clamp(position))),
            PreparedImage::Real(_) => None,
        }
    }

    fn clamp(&self, position: &[i64]) -> Vec<i64> {
        let interval = self.interval();
        position
            .iter()
            .zip(interval.min().iter().zip(interval.max()))
            .map(|(p, (lo, hi))| (*p).clamp(*lo, *hi))
            .collect()
    }
}
