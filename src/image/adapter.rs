//! Conversion of source images to the canonical floating-point type.
//!
//! Feature sets always read `f32` samples. A real-valued image of another
//! kind is wrapped in a converting view; an `f32` image passes through
//! untouched and colour images are handed over as-is for the feature set to
//! handle or reject.

use std::fmt;
use std::sync::Arc;

use super::buffer::{Image, PixelKind, RealSample, Rgb, SourceImage};
use super::Interval;

/// Read access to real samples as `f32`.
pub trait FloatAccess: Send + Sync {
    fn interval(&self) -> &Interval;

    /// Sample at an in-bounds position.
    fn get(&self, position: &[i64]) -> f32;

    /// Kind of the underlying samples before conversion.
    fn source_kind(&self) -> PixelKind;
}

impl FloatAccess for Image<f32> {
    fn interval(&self) -> &Interval {
        Image::interval(self)
    }

    #[inline]
    fn get(&self, position: &[i64]) -> f32 {
        Image::get(self, position)
    }

    fn source_kind(&self) -> PixelKind {
        PixelKind::F32
    }
}

/// A lazily converting view of a real-valued image.
pub struct ConvertedView<T> {
    source: Image<T>,
}

impl<T: RealSample> ConvertedView<T> {
    pub fn new(source: Image<T>) -> Self {
        Self { source }
    }
}

impl<T: RealSample> FloatAccess for ConvertedView<T> {
    fn interval(&self) -> &Interval {
        self.source.interval()
    }

    #[inline]
    fn get(&self, position: &[i64]) -> f32 {
        self.source.get(position).to_f32()
    }

    fn source_kind(&self) -> PixelKind {
        T::KIND
    }
}

/// A source image normalized for feature computation.
#[derive(Clone)]
pub enum PreparedImage {
    /// Real-valued samples read as `f32`
    Real(Arc<dyn FloatAccess>),
    /// Colour samples passed through unchanged
    Rgb(Image<Rgb>),
}

impl PreparedImage {
    pub fn interval(&self) -> &Interval {
        match self {
            PreparedImage::Real(view) => view.interval(),
            PreparedImage::Rgb(image) => image.interval(),
        }
    }

    /// Kind of the samples the view was built from.
    pub fn source_kind(&self) -> PixelKind {
        match self {
            PreparedImage::Real(view) => view.source_kind(),
            PreparedImage::Rgb(_) => PixelKind::Rgb,
        }
    }

    /// Whether the source was used without a converting view.
    pub fn is_passthrough(&self) -> bool {
        self.source_kind() == PixelKind::F32 || self.source_kind() == PixelKind::Rgb
    }
}

impl fmt::Debug for PreparedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedImage")
            .field("source_kind", &self.source_kind())
            .field("interval", self.interval())
            .finish()
    }
}

fn converted<T: RealSample>(image: &Image<T>) -> PreparedImage {
    PreparedImage::Real(Arc::new(ConvertedView::new(image.clone())))
}

/// Normalize a source image to the canonical floating-point kind.
///
/// Never copies samples: `f32` images are shared, other real kinds are
/// wrapped in a [`ConvertedView`].
pub fn prepare_image(source: &SourceImage) -> PreparedImage {
    match source {
        SourceImage::F32(image) => PreparedImage::Real(Arc::new(image.clone())),
        SourceImage::Rgb(image) => PreparedImage::Rgb(image.clone()),
        SourceImage::Bool(image) => converted(image),
        SourceImage::U8(image) => converted(image),
        SourceImage::I8(image) => converted(image),
        SourceImage::U16(image) => converted(image),
        SourceImage::I16(image) => converted(image),
        SourceImage::U32(image) => converted(image),
        SourceImage::I32(image) => converted(image),
        SourceImage::F64(image) => converted(image),
    }
}
